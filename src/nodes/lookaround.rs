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

//! Constructs that cut off backtracking into their child.
//!
//! Both freeze on entry, and once their child matches, collapse the chain
//! back into the generation that was current on entry. Every choice point
//! the child left behind is merged away, so backtracking past this node goes
//! straight to whatever came before it.

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::memory::Checkpoint;
use crate::memory::Referenced;
use crate::memory::Value;
use crate::nodes::read_frame;
use crate::nodes::CompiledNode;
use crate::nodes::NodeId;
use crate::nodes::Signal;
use crate::nodes::SIGNAL_START;

/// The stack name of the innermost atomic group's checkpoint.
pub const ATOMIC: &str = "#atomic";

/// The stack name of the innermost lookahead's frame: its checkpoint, and
/// the cursor to go back to.
pub const LOOKAHEAD: &str = "#lookahead";

/// Matches its child at most once, never backtracking into it.
#[derive(Clone, Debug)]
pub struct Atomic {
  pub child: NodeId,
}

impl Atomic {
  pub const DONE: Signal = 1;
  const FAILED: Signal = 2;
}

impl CompiledNode for Atomic {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => {
        let checkpoint = analyzer.freeze(id, Self::FAILED);
        analyzer
          .memory_mut()
          .push(ATOMIC, Value::Checkpoint(checkpoint))?;
        analyzer.enter(self.child);
      }
      Self::DONE => {
        let memory = analyzer.memory_mut();
        let checkpoint = match memory.get(ATOMIC)?.as_checkpoint() {
          Some(cp) => cp,
          None => {
            return Err(Fatal::bookkeeping(id, "atomic checkpoint missing"))
          }
        };
        memory.remove(ATOMIC)?;
        memory.collapse_chain_to(checkpoint)?;
        analyzer.finish(id);
      }
      Self::FAILED => analyzer.backtrack(),
      _ => return Err(Fatal::unexpected_signal(id, signal)),
    }
    Ok(())
  }
}

/// Succeeds if its child matches (or, when `negative`, fails to match) at
/// the cursor, without consuming anything.
#[derive(Clone, Debug)]
pub struct Lookahead {
  pub child: NodeId,
  pub negative: bool,
}

impl Lookahead {
  pub const DONE: Signal = 1;
  const FAILED: Signal = 2;

  fn frame(
    analyzer: &mut Analyzer<'_>,
    id: NodeId,
  ) -> Result<(Checkpoint, usize), Fatal> {
    let (_, frame) = read_frame(analyzer, id, LOOKAHEAD)?;
    match frame.as_slice() {
      [Value::Checkpoint(cp), Value::Cursor(start)] => Ok((*cp, *start)),
      _ => Err(Fatal::bookkeeping(id, "malformed lookahead frame")),
    }
  }
}

impl CompiledNode for Lookahead {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => {
        let start = analyzer.text().cursor();
        let checkpoint = analyzer.freeze(id, Self::FAILED);
        let memory = analyzer.memory_mut();
        let frame = memory.alloc(Referenced::List(vec![
          Value::Checkpoint(checkpoint),
          Value::Cursor(start),
        ]))?;
        memory.push(LOOKAHEAD, Value::Ref(frame))?;
        analyzer.enter(self.child);
      }
      Self::DONE => {
        let (checkpoint, start) = Self::frame(analyzer, id)?;
        let memory = analyzer.memory_mut();
        memory.remove(LOOKAHEAD)?;
        memory.collapse_chain_to(checkpoint)?;
        if self.negative {
          analyzer.backtrack();
        } else {
          analyzer.text_mut().restore_cursor(start);
          analyzer.finish(id);
        }
      }
      // The rollback that got us here already put the cursor back.
      Self::FAILED if self.negative => analyzer.finish(id),
      Self::FAILED => analyzer.backtrack(),
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
  use crate::nodes::compile_source;

  fn outcome(pattern: &str, text: &str) -> (Outcome, usize) {
    let program = compile_source(pattern, false).unwrap();
    let mut analyzer = Analyzer::new(&program, Config::default());
    let outcome = analyzer
      .run(program.root(), text, Budget::unlimited())
      .unwrap();
    (outcome, analyzer.memory().chain_len())
  }

  #[test]
  fn atomic_groups_leave_no_choice_points() {
    // Without the group, the alternation would leave a checkpoint behind.
    assert_eq!(outcome("(a|b)", "a"), (Outcome::Matched, 2));
    assert_eq!(outcome("(?>a|b)", "a"), (Outcome::Matched, 1));
    assert_eq!(outcome("(?>a*)a", "aa"), (Outcome::NoMatch, 1));
  }

  #[test]
  fn lookaheads() {
    assert_eq!(outcome("(?=a|b)a", "a"), (Outcome::Matched, 1));
    assert_eq!(outcome("(?!a)b", "b"), (Outcome::Matched, 1));
    assert_eq!(outcome("(?!a)", "a"), (Outcome::NoMatch, 1));
    assert_eq!(outcome("(?=(?=a)a)$", "a"), (Outcome::NoMatch, 1));
  }

  #[test]
  fn lookahead_captures_survive_positive_lookaheads_only() {
    let program = compile_source("(?=(?<x>a))(?!(?<y>b))", false).unwrap();
    let mut analyzer = Analyzer::new(&program, Config::default());
    assert_eq!(analyzer.match_text("a"), Ok(Outcome::Matched));
    let m = analyzer.result().unwrap().unwrap();
    assert_eq!((m.from, m.to), (0, 0));
    let names = m.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["x"]);
  }
}
