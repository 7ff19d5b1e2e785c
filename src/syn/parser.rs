// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The nuts and bolts of the pattern parser.

#![allow(clippy::upper_case_acronyms)]

use std::fmt;
use std::path::Path;

use pest::error::ErrorVariant;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::iterators::Pairs;

use pest_derive::Parser;

use crate::syn;
use crate::syn::ClassItem;
use crate::syn::Span;

/// A `ParseError` represents a parse failure at some `Span`.
#[derive(Clone, Debug)]
pub struct ParseError<'i> {
  /// The `Span` at which the error occured.
  pub span: Span<'i>,
  /// An error message.
  pub message: String,
}

impl fmt::Display for ParseError<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "error: {}: {}", self.span, self.message)
  }
}

/// Parse `input` into a `Pattern`, returning an error on failure.
pub fn parse<'i>(
  file_name: &'i Path,
  input: &'i str,
  arena: &'i syn::Arena,
) -> Result<&'i syn::Pattern<'i>, ParseError<'i>> {
  use pest::Parser as _;
  let ctx = Context {
    file_name,
    input,
    arena,
  };

  let mut pairs = match PegParser::parse(Rule::Pattern, input) {
    Ok(pairs) => pairs,
    Err(err) => {
      let span = match err.location {
        InputLocation::Pos(pos) => (pos, pos),
        InputLocation::Span(span) => span,
      };

      let message = match err.variant {
        ErrorVariant::ParsingError { positives, .. }
          if !positives.is_empty() =>
        {
          let expected = positives
            .iter()
            .map(|r| format!("{:?}", r))
            .collect::<Vec<_>>();
          format!("expected one of: {}", expected.join(", "))
        }
        ErrorVariant::ParsingError { .. } => "unexpected character".to_string(),
        ErrorVariant::CustomError { message } => message,
      };

      return Err(syn::ParseError {
        span: Span::new_from_parts(file_name, input, span),
        message,
      });
    }
  };

  let pattern = ctx.parse_pattern(next(&mut pairs))?;
  Ok(ctx.arena.alloc(pattern))
}

#[derive(Parser)]
#[grammar = "syn/pattern.pest"]
struct PegParser;

/// Returns the next pair, which the grammar guarantees is there.
fn next<'i>(pairs: &mut Pairs<'i, Rule>) -> Pair<'i, Rule> {
  match pairs.next() {
    Some(pair) => pair,
    None => bug!("grammar produced fewer pairs than expected"),
  }
}

/// What a single escape, or a single character in a class, stands for.
enum Atom {
  Char(char),
  Shorthand(ClassItem, bool),
}

struct Context<'i> {
  file_name: &'i Path,
  input: &'i str,
  arena: &'i toolshed::Arena,
}

impl<'i> Context<'i> {
  fn span(&self, span: pest::Span<'i>) -> Span<'i> {
    Span::new_from_parts(self.file_name, self.input, (span.start(), span.end()))
  }

  fn error(
    &self,
    pair: &Pair<'i, Rule>,
    message: impl Into<String>,
  ) -> ParseError<'i> {
    ParseError {
      span: self.span(pair.as_span()),
      message: message.into(),
    }
  }

  fn parse_pattern(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Pattern<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut pairs = pair.into_inner();
    let expr = self.parse_alternation(next(&mut pairs))?;
    Ok(syn::Pattern { expr, span })
  }

  fn parse_alternation(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut branches = pair
      .into_inner()
      .map(|p| self.parse_sequence(p))
      .collect::<Result<Vec<_>, _>>()?;
    if branches.len() == 1 {
      return Ok(branches.swap_remove(0));
    }
    Ok(syn::Expr::Alternation(syn::Alternation {
      branches: self.arena.alloc_vec(branches),
      span,
    }))
  }

  fn parse_sequence(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut items = pair
      .into_inner()
      .map(|p| self.parse_repeat(p))
      .collect::<Result<Vec<_>, _>>()?;
    if items.len() == 1 {
      return Ok(items.swap_remove(0));
    }
    Ok(syn::Expr::Sequence(syn::Sequence {
      items: self.arena.alloc_vec(items),
      span,
    }))
  }

  fn parse_repeat(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut pairs = pair.into_inner();
    let expr = self.parse_atom(next(&mut pairs))?;
    let quantifier = match pairs.next() {
      Some(q) => q,
      None => return Ok(expr),
    };

    let mut pairs = quantifier.into_inner();
    let kind = next(&mut pairs);
    let lazy = pairs.next().is_some();
    let (min, max) = match kind.as_rule() {
      Rule::Star => (0, None),
      Rule::Plus => (1, None),
      Rule::Question => (0, Some(1)),
      Rule::Range => self.parse_range(kind)?,
      r => bug!("unexpected quantifier rule {:?}", r),
    };

    Ok(syn::Expr::Repeat(syn::Repeat {
      expr: self.arena.alloc(expr),
      min,
      max,
      lazy,
      span,
    }))
  }

  fn parse_range(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<(u32, Option<u32>), ParseError<'i>> {
    let error = self.error(&pair, "");
    let mut pairs = pair.into_inner();
    let min = self.parse_number(next(&mut pairs))?;
    let max = match (pairs.next(), pairs.next()) {
      (None, _) => Some(min),
      (Some(_comma), None) => None,
      (Some(_comma), Some(max)) => Some(self.parse_number(max)?),
    };
    if let Some(max) = max.filter(|&max| max < min) {
      return Err(ParseError {
        message: format!("repetition range {},{} is backwards", min, max),
        ..error
      });
    }
    Ok((min, max))
  }

  fn parse_number(&self, pair: Pair<'i, Rule>) -> Result<u32, ParseError<'i>> {
    pair
      .as_str()
      .parse()
      .map_err(|_| self.error(&pair, "repetition count is too large"))
  }

  fn parse_atom(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let expr = match pair.as_rule() {
      Rule::Any => syn::Expr::Any(span),
      Rule::Start => syn::Expr::Start(span),
      Rule::End => syn::Expr::End(span),
      Rule::Char => syn::Expr::Char(syn::Char {
        value: first_char(&pair),
        span,
      }),
      Rule::Escape => match escape(&pair) {
        Atom::Char(value) => syn::Expr::Char(syn::Char { value, span }),
        Atom::Shorthand(item, negated) => syn::Expr::Class(syn::Class {
          negated,
          items: self.arena.alloc_vec(vec![item]),
          span,
        }),
      },
      Rule::Class => self.parse_class(pair)?,
      Rule::Group => self.parse_group(pair)?,
      r => bug!("unexpected atom rule {:?}", r),
    };
    Ok(expr)
  }

  fn parse_group(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut kind = syn::GroupKind::Plain;
    let mut body = None;
    for pair in pair.into_inner() {
      match pair.as_rule() {
        Rule::Atomic => kind = syn::GroupKind::Atomic,
        Rule::Ahead => kind = syn::GroupKind::Ahead,
        Rule::NotAhead => kind = syn::GroupKind::NotAhead,
        Rule::Named => {
          let name = next(&mut pair.into_inner()).as_str();
          kind = syn::GroupKind::Named(name);
        }
        Rule::Alternation => body = Some(self.parse_alternation(pair)?),
        r => bug!("unexpected group rule {:?}", r),
      }
    }
    let body = match body {
      Some(body) => body,
      None => bug!("group without a body"),
    };
    Ok(syn::Expr::Group(syn::Group {
      kind,
      expr: self.arena.alloc(body),
      span,
    }))
  }

  fn parse_class(
    &self,
    pair: Pair<'i, Rule>,
  ) -> Result<syn::Expr<'i>, ParseError<'i>> {
    let span = self.span(pair.as_span());
    let mut negated = false;
    let mut items = Vec::new();
    for pair in pair.into_inner() {
      match pair.as_rule() {
        Rule::Negate => negated = true,
        Rule::ClassRange => {
          let error = self.error(&pair, "");
          let mut pairs = pair.into_inner();
          let lo = self.class_char(next(&mut pairs))?;
          let hi = self.class_char(next(&mut pairs))?;
          match (lo, hi) {
            (Atom::Char(lo), Atom::Char(hi)) if lo <= hi => {
              items.push(ClassItem::Range(lo, hi))
            }
            (Atom::Char(lo), Atom::Char(hi)) => {
              return Err(ParseError {
                message: format!("class range {:?}-{:?} is backwards", lo, hi),
                ..error
              })
            }
            _ => {
              return Err(ParseError {
                message: "class ranges must be between characters".into(),
                ..error
              })
            }
          }
        }
        _ => match self.class_char(pair)? {
          Atom::Char(c) => items.push(ClassItem::Range(c, c)),
          Atom::Shorthand(item, _) => items.push(item),
        },
      }
    }
    Ok(syn::Expr::Class(syn::Class {
      negated,
      items: self.arena.alloc_vec(items),
      span,
    }))
  }

  fn class_char(&self, pair: Pair<'i, Rule>) -> Result<Atom, ParseError<'i>> {
    match pair.as_rule() {
      Rule::ClassLiteral => Ok(Atom::Char(first_char(&pair))),
      Rule::Escape => match escape(&pair) {
        Atom::Shorthand(_, true) => {
          Err(self.error(&pair, "negated shorthands are not allowed here"))
        }
        atom => Ok(atom),
      },
      r => bug!("unexpected class rule {:?}", r),
    }
  }
}

fn first_char(pair: &Pair<'_, Rule>) -> char {
  match pair.as_str().chars().next() {
    Some(c) => c,
    None => bug!("empty character rule"),
  }
}

/// Resolves a backslash escape. Unknown escapes stand for the escaped
/// character itself.
fn escape(pair: &Pair<'_, Rule>) -> Atom {
  let c = match pair.as_str().chars().nth(1) {
    Some(c) => c,
    None => bug!("empty escape"),
  };
  match c {
    'd' => Atom::Shorthand(ClassItem::Digit, false),
    'w' => Atom::Shorthand(ClassItem::Word, false),
    's' => Atom::Shorthand(ClassItem::Space, false),
    'D' => Atom::Shorthand(ClassItem::Digit, true),
    'W' => Atom::Shorthand(ClassItem::Word, true),
    'S' => Atom::Shorthand(ClassItem::Space, true),
    'n' => Atom::Char('\n'),
    't' => Atom::Char('\t'),
    'r' => Atom::Char('\r'),
    c => Atom::Char(c),
  }
}
