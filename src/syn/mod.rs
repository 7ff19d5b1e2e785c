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

//! Syntax tree data structures for patterns.

#![deny(missing_docs)]

use std::fmt;
use std::path::Path;

mod parser;
pub use parser::{parse, ParseError};

pub use toolshed::Arena;

/// A source span.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span<'i> {
  file_name: &'i Path,
  input: &'i str,
  start: usize,
  end: usize,
}

impl<'i> Span<'i> {
  /// Builds a new `Span` from raw parts.
  pub(crate) fn new_from_parts(
    file_name: &'i Path,
    input: &'i str,
    span: (usize, usize),
  ) -> Self {
    Self {
      file_name,
      input,
      start: span.0,
      end: span.1,
    }
  }

  /// Returns the name of the file this `Span` refers to.
  pub fn file_name(&self) -> &'i Path {
    self.file_name
  }

  /// Returns the offset at which this `Span` starts.
  pub fn start_byte(&self) -> usize {
    self.start
  }

  /// Returns the offset at which this `Span` ends.
  pub fn end_byte(&self) -> usize {
    self.end
  }

  /// Returns the line and column this `Span` starts at, both one-indexed.
  pub fn start_position(&self) -> Option<(usize, usize)> {
    pest::Position::new(self.input, self.start).map(|p| p.line_col())
  }

  /// Returns the text that this `Span` refers to.
  pub fn text(&self) -> &'i str {
    self.input.get(self.start..self.end).unwrap_or("")
  }
}

impl fmt::Debug for Span<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "<{}>[{}..{}]",
      self.file_name().display(),
      self.start_byte(),
      self.end_byte()
    )
  }
}

impl fmt::Display for Span<'_> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self.start_position() {
      Some((line, col)) => {
        write!(f, "{}:{}:{}", self.file_name().display(), line, col)
      }
      None => write!(f, "{}:?:?", self.file_name().display()),
    }
  }
}

/// Represents a type with a file span.
pub trait Spanned<'i> {
  /// Returns the associated file span.
  fn span(&self) -> Span<'i>;
}

impl<'i> Spanned<'i> for Span<'i> {
  fn span(&self) -> Span<'i> {
    *self
  }
}

impl<'i, S> Spanned<'i> for &S
where
  S: Spanned<'i>,
{
  fn span(&self) -> Span<'i> {
    S::span(*self)
  }
}

/// A complete pattern, i.e., a single line of source.
#[derive(Copy, Clone, Debug)]
pub struct Pattern<'i> {
  /// The top-level expression.
  pub expr: Expr<'i>,
  /// This node's span.
  pub span: Span<'i>,
}

impl<'i> Spanned<'i> for Pattern<'i> {
  fn span(&self) -> Span<'i> {
    self.span
  }
}

/// An expression within a pattern.
#[derive(Copy, Clone, Debug)]
pub enum Expr<'i> {
  /// A single literal character, possibly escaped.
  Char(Char<'i>),
  /// The `.` wildcard.
  Any(Span<'i>),
  /// The `^` anchor.
  Start(Span<'i>),
  /// The `$` anchor.
  End(Span<'i>),
  /// A character class, or one of the `\d \w \s` shorthands.
  Class(Class<'i>),
  /// A group, capturing or not.
  Group(Group<'i>),
  /// A quantified expression.
  Repeat(Repeat<'i>),
  /// A run of expressions to match one after the other.
  Sequence(Sequence<'i>),
  /// A choice between expressions, separated by `|`.
  Alternation(Alternation<'i>),
}

impl<'i> Spanned<'i> for Expr<'i> {
  fn span(&self) -> Span<'i> {
    match self {
      Expr::Char(e) => e.span,
      Expr::Any(s) | Expr::Start(s) | Expr::End(s) => *s,
      Expr::Class(e) => e.span,
      Expr::Group(e) => e.span,
      Expr::Repeat(e) => e.span,
      Expr::Sequence(e) => e.span,
      Expr::Alternation(e) => e.span,
    }
  }
}

/// A literal character.
#[derive(Copy, Clone, Debug)]
pub struct Char<'i> {
  /// The character, after escapes are resolved.
  pub value: char,
  /// This node's span.
  pub span: Span<'i>,
}

/// One member of a character class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassItem {
  /// An inclusive range; a single character is a range of one.
  Range(char, char),
  /// `\d`.
  Digit,
  /// `\w`.
  Word,
  /// `\s`.
  Space,
}

/// A character class.
#[derive(Copy, Clone, Debug)]
pub struct Class<'i> {
  /// Whether the class is negated, as in `[^...]` or `\D`.
  pub negated: bool,
  /// The members of the class.
  pub items: &'i [ClassItem],
  /// This node's span.
  pub span: Span<'i>,
}

/// The flavor of a group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind<'i> {
  /// `( )`, which only groups.
  Plain,
  /// `(?<name> )`.
  Named(&'i str),
  /// `(?> )`.
  Atomic,
  /// `(?= )`.
  Ahead,
  /// `(?! )`.
  NotAhead,
}

/// A parenthesized group.
#[derive(Copy, Clone, Debug)]
pub struct Group<'i> {
  /// The flavor of this group.
  pub kind: GroupKind<'i>,
  /// The grouped expression.
  pub expr: &'i Expr<'i>,
  /// This node's span.
  pub span: Span<'i>,
}

/// A quantified expression, like `a*` or `a{2,3}?`.
#[derive(Copy, Clone, Debug)]
pub struct Repeat<'i> {
  /// The repeated expression.
  pub expr: &'i Expr<'i>,
  /// The minimum number of repetitions.
  pub min: u32,
  /// The maximum number of repetitions, if bounded.
  pub max: Option<u32>,
  /// Whether the quantifier prefers fewer repetitions.
  pub lazy: bool,
  /// This node's span.
  pub span: Span<'i>,
}

/// A sequence of expressions.
#[derive(Copy, Clone, Debug)]
pub struct Sequence<'i> {
  /// The expressions, in order. May be empty.
  pub items: &'i [Expr<'i>],
  /// This node's span.
  pub span: Span<'i>,
}

/// A choice between expressions.
#[derive(Copy, Clone, Debug)]
pub struct Alternation<'i> {
  /// The alternatives, in order of preference.
  pub branches: &'i [Expr<'i>],
  /// This node's span.
  pub span: Span<'i>,
}
