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

//! The outermost node of every compiled pattern.

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::nodes::CompiledNode;
use crate::nodes::NodeId;
use crate::nodes::Signal;
use crate::nodes::SIGNAL_START;

/// Runs the whole pattern, and closes the root match node once it matched.
///
/// When `search` is set, a failure at one position retries at the next one,
/// until the end of the text.
#[derive(Clone, Debug)]
pub struct Root {
  pub child: NodeId,
  pub search: bool,
}

impl Root {
  pub const DONE: Signal = 1;
  const RETRY: Signal = 2;

  fn set_bounds(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    from: Option<usize>,
    to: Option<usize>,
  ) -> Result<(), Fatal> {
    let root = analyzer.root_match(id)?;
    analyzer
      .memory_mut()
      .update(root, |r| {
        r.as_node_mut().map(|n| {
          if let Some(from) = from {
            n.from = from;
          }
          n.to = to;
        })
      })?
      .ok_or_else(|| Fatal::bookkeeping(id, "root match is not a match node"))
  }
}

impl CompiledNode for Root {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => {
        let from = analyzer.text().cursor();
        self.set_bounds(id, analyzer, Some(from), None)?;
        if self.search {
          analyzer.freeze(id, Self::RETRY);
        }
        analyzer.enter(self.child);
      }
      Self::DONE => {
        let to = analyzer.text().cursor();
        self.set_bounds(id, analyzer, None, Some(to))?;
        analyzer.finish(id);
      }
      Self::RETRY => {
        if analyzer.text().is_at_end() {
          analyzer.backtrack();
          return Ok(());
        }
        analyzer.text_mut().advance();
        let from = analyzer.text().cursor();
        self.set_bounds(id, analyzer, Some(from), None)?;
        analyzer.freeze(id, Self::RETRY);
        analyzer.enter(self.child);
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
  use crate::nodes::compile_source;

  #[test]
  fn anchored_and_searching_roots() {
    let anchored = compile_source("b", false).unwrap();
    let mut analyzer = Analyzer::new(&anchored, Config::default());
    assert_eq!(analyzer.match_text("ab"), Ok(Outcome::NoMatch));

    let searching = compile_source("b", true).unwrap();
    let mut analyzer = Analyzer::new(&searching, Config::default());
    assert_eq!(
      analyzer.run(searching.root(), "ab", Budget::unlimited()),
      Ok(Outcome::Matched)
    );
    let m = analyzer.result().unwrap().unwrap();
    assert_eq!((m.from, m.to, m.text.as_str()), (1, 2, "b"));
  }
}
