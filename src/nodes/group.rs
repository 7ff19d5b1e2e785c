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

//! Sequences, alternations and captures.

use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::analyzer::CURRENT_NODE;
use crate::memory::MatchNode;
use crate::memory::Reference;
use crate::memory::Value;
use crate::nodes::CompiledNode;
use crate::nodes::NodeId;
use crate::nodes::Signal;
use crate::nodes::SIGNAL_START;

/// Runs its children one after the other.
///
/// Child `i` is linked back with signal `i + 1`, so the signal is also the
/// index of the next child to run.
#[derive(Clone, Debug)]
pub struct Sequence {
  pub children: Vec<NodeId>,
}

impl Sequence {
  pub fn link(index: usize) -> Signal {
    index as Signal + 1
  }
}

impl CompiledNode for Sequence {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match self.children.get(signal as usize) {
      Some(&child) => analyzer.enter(child),
      None => analyzer.finish(id),
    }
    Ok(())
  }
}

/// Tries each of its children in turn, leaving a checkpoint behind for the
/// ones not tried yet.
#[derive(Clone, Debug)]
pub struct Alternation {
  pub children: Vec<NodeId>,
}

impl Alternation {
  /// The signal every child is linked back with.
  pub const DONE: Signal = 1;
  const TRY: Signal = 2;

  fn try_branch(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    branch: usize,
  ) {
    let child = match self.children.get(branch) {
      Some(&child) => child,
      None => {
        analyzer.backtrack();
        return;
      }
    };
    if branch + 1 < self.children.len() {
      analyzer.freeze(id, Self::TRY + branch as Signal + 1);
    }
    analyzer.enter(child);
  }
}

impl CompiledNode for Alternation {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => self.try_branch(id, analyzer, 0),
      Self::DONE => analyzer.finish(id),
      _ => self.try_branch(id, analyzer, (signal - Self::TRY) as usize),
    }
    Ok(())
  }
}

/// Records the text its child matched as a named node of the match tree.
#[derive(Clone, Debug)]
pub struct Capture {
  pub name: Arc<str>,
  pub child: NodeId,
}

impl Capture {
  pub const DONE: Signal = 1;
}

fn current_node(
  analyzer: &Analyzer<'_>,
  id: NodeId,
) -> Result<Reference, Fatal> {
  analyzer
    .memory()
    .get(CURRENT_NODE)?
    .reference()
    .ok_or_else(|| Fatal::bookkeeping(id, "current match node is missing"))
}

impl CompiledNode for Capture {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => {
        let parent = current_node(analyzer, id)?;
        let from = analyzer.text().cursor();
        let memory = analyzer.memory_mut();
        let node = MatchNode::new(&self.name, Some(parent), from);
        let node = memory.alloc(node.into())?;
        memory
          .update(parent, |p| p.as_node_mut().map(|p| p.children.push(node)))?
          .ok_or_else(|| Fatal::bookkeeping(id, "parent is not a match node"))?;
        memory.push(CURRENT_NODE, Value::Ref(node))?;
        analyzer.enter(self.child);
      }
      Self::DONE => {
        let node = current_node(analyzer, id)?;
        let to = analyzer.text().cursor();
        let memory = analyzer.memory_mut();
        memory
          .update(node, |n| n.as_node_mut().map(|n| n.to = Some(to)))?
          .ok_or_else(|| Fatal::bookkeeping(id, "not a match node"))?;
        memory.remove(CURRENT_NODE)?;
        analyzer.finish(id);
      }
      _ => return Err(Fatal::unexpected_signal(id, signal)),
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analyzer::Budget;
  use crate::analyzer::Outcome;
  use crate::config::Config;
  use crate::nodes::ProgramBuilder;
  use crate::nodes::Root;
  use crate::nodes::Text;

  fn text(b: &mut ProgramBuilder, s: &str) -> NodeId {
    b.add(Text { chars: s.chars().collect() }, &[])
  }

  #[test]
  fn alternation_keeps_one_checkpoint_at_a_time() {
    let mut b = ProgramBuilder::new();
    let x = text(&mut b, "x");
    let y = text(&mut b, "y");
    let z = text(&mut b, "z");
    let alt = b.add(
      Alternation { children: vec![x, y, z] },
      &[(x, Alternation::DONE), (y, Alternation::DONE), (z, Alternation::DONE)],
    );
    let root = b.add(Root { child: alt, search: false }, &[(alt, Root::DONE)]);
    let program = b.finish(root);

    let mut analyzer = Analyzer::new(&program, Config::default());
    assert_eq!(
      analyzer.run(root, "x", Budget::unlimited()),
      Ok(Outcome::Matched)
    );
    // The last two branches share one checkpoint until the second is tried.
    assert_eq!(analyzer.memory().chain_len(), 2);

    assert_eq!(
      analyzer.run(root, "z", Budget::unlimited()),
      Ok(Outcome::Matched)
    );
    assert_eq!(analyzer.memory().chain_len(), 1);
  }

  #[test]
  fn sequences_and_captures() {
    let mut b = ProgramBuilder::new();
    let a = text(&mut b, "a");
    let cap = b.add(
      Capture {
        name: "a".into(),
        child: a,
      },
      &[(a, Capture::DONE)],
    );
    let bc = text(&mut b, "bc");
    let seq = b.add(
      Sequence { children: vec![cap, bc] },
      &[(cap, Sequence::link(0)), (bc, Sequence::link(1))],
    );
    let root = b.add(Root { child: seq, search: false }, &[(seq, Root::DONE)]);
    let program = b.finish(root);

    let mut analyzer = Analyzer::new(&program, Config::default());
    assert_eq!(analyzer.match_text("abc"), Ok(Outcome::Matched));
    let m = analyzer.result().unwrap().unwrap();
    assert_eq!((m.from, m.to), (0, 3));
    assert_eq!(m.children.len(), 1);
    assert_eq!((m.children[0].from, m.children[0].to), (0, 1));

    // Only the root match node is left open.
    let names = analyzer
      .memory()
      .bindings()
      .map(|(n, _)| n.to_string())
      .collect::<Vec<_>>();
    assert_eq!(names, vec!["#global", "#node"]);

    assert_eq!(analyzer.match_text("abd"), Ok(Outcome::NoMatch));
  }
}
