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

//! Lowering from syntax trees to programs.

use std::path::Path;

use crate::nodes::Alternation;
use crate::nodes::Anchor;
use crate::nodes::Any;
use crate::nodes::Atomic;
use crate::nodes::Capture;
use crate::nodes::Class;
use crate::nodes::Lookahead;
use crate::nodes::NodeId;
use crate::nodes::Program;
use crate::nodes::ProgramBuilder;
use crate::nodes::Quantifier;
use crate::nodes::Root;
use crate::nodes::Sequence;
use crate::nodes::Text;
use crate::syn;
use crate::syn::Expr;

/// Compiles a parsed pattern.
///
/// When `search` is set, the program looks for a match starting anywhere in
/// the text; otherwise, only at its start.
pub fn compile(pattern: &syn::Pattern<'_>, search: bool) -> Program {
  let mut b = ProgramBuilder::new();
  let child = lower(&mut b, &pattern.expr);
  let root = b.add(Root { child, search }, &[(child, Root::DONE)]);
  b.finish(root)
}

/// Parses and compiles `source` in one go, rendering parse errors as text.
pub fn compile_source(source: &str, search: bool) -> Result<Program, String> {
  let arena = syn::Arena::new();
  match syn::parse(Path::new("<pattern>"), source, &arena) {
    Ok(pattern) => Ok(compile(pattern, search)),
    Err(e) => Err(e.to_string()),
  }
}

fn lower(b: &mut ProgramBuilder, expr: &Expr<'_>) -> NodeId {
  match expr {
    Expr::Char(c) => b.add(Text { chars: vec![c.value] }, &[]),
    Expr::Any(_) => b.add(Any, &[]),
    Expr::Start(_) => b.add(Anchor::Start, &[]),
    Expr::End(_) => b.add(Anchor::End, &[]),
    Expr::Class(c) => b.add(
      Class {
        negated: c.negated,
        items: c.items.to_vec(),
      },
      &[],
    ),
    Expr::Group(g) => {
      let child = lower(b, g.expr);
      match g.kind {
        syn::GroupKind::Plain => child,
        syn::GroupKind::Named(name) => b.add(
          Capture {
            name: name.into(),
            child,
          },
          &[(child, Capture::DONE)],
        ),
        syn::GroupKind::Atomic => {
          b.add(Atomic { child }, &[(child, Atomic::DONE)])
        }
        syn::GroupKind::Ahead | syn::GroupKind::NotAhead => b.add(
          Lookahead {
            child,
            negative: g.kind == syn::GroupKind::NotAhead,
          },
          &[(child, Lookahead::DONE)],
        ),
      }
    }
    Expr::Repeat(r) => {
      let child = lower(b, r.expr);
      b.add(
        Quantifier {
          child,
          min: r.min,
          max: r.max,
          lazy: r.lazy,
        },
        &[(child, Quantifier::ITERATED)],
      )
    }
    Expr::Sequence(s) => lower_sequence(b, s.items),
    Expr::Alternation(a) => {
      let children = a.branches.iter().map(|e| lower(b, e)).collect::<Vec<_>>();
      let links = children
        .iter()
        .map(|&c| (c, Alternation::DONE))
        .collect::<Vec<_>>();
      b.add(Alternation { children }, &links)
    }
  }
}

/// Lowers a sequence, merging runs of literal characters into a single
/// `Text` node.
fn lower_sequence(b: &mut ProgramBuilder, items: &[Expr<'_>]) -> NodeId {
  let mut children = Vec::new();
  let mut run = Vec::new();
  for item in items {
    if let Expr::Char(c) = item {
      run.push(c.value);
      continue;
    }
    if !run.is_empty() {
      let chars = std::mem::take(&mut run);
      children.push(b.add(Text { chars }, &[]));
    }
    children.push(lower(b, item));
  }
  if !run.is_empty() {
    children.push(b.add(Text { chars: run }, &[]));
  }

  if children.len() == 1 {
    return children[0];
  }
  let links = children
    .iter()
    .enumerate()
    .map(|(i, &c)| (c, Sequence::link(i)))
    .collect::<Vec<_>>();
  b.add(Sequence { children }, &links)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn literal_runs_become_one_node() {
    // Text("abc"), then the root.
    assert_eq!(compile_source("abc", true).unwrap().len(), 2);
    // Text("ab"), Any, Text("c"), the sequence, then the root.
    assert_eq!(compile_source("ab.c", true).unwrap().len(), 5);
  }

  #[test]
  fn every_node_but_the_root_has_a_parent() {
    let program =
      compile_source("(?<a>x|y)*(?>z)(?=w)[0-9]+?$", false).unwrap();
    let root = program.root();
    for i in 0..program.len() as u32 {
      let id = NodeId::new(i);
      assert_eq!(program.parent(id).is_none(), id == root, "node {}", id);
    }
  }

  #[test]
  fn parse_errors_are_rendered() {
    let err = compile_source("a{2,1}", true).unwrap_err();
    assert!(err.contains("<pattern>:1:2"), "{}", err);
  }
}
