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

//! Bounded and unbounded repetition.

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::memory::Reference;
use crate::memory::Referenced;
use crate::memory::Value;
use crate::nodes::read_frame;
use crate::nodes::CompiledNode;
use crate::nodes::NodeId;
use crate::nodes::Signal;
use crate::nodes::SIGNAL_START;

/// The stack name of the innermost quantifier's frame.
///
/// A frame is a two-element list: the number of iterations done so far, and
/// the cursor at which the current iteration started.
pub const FRAME: &str = "#quantifier";

/// Repeats its child between `min` and `max` times.
///
/// Each time another iteration is possible, the quantifier freezes, so that
/// the other choice (stopping, or going on when lazy) can be taken later.
/// An iteration that consumes nothing ends the loop once `min` is reached.
#[derive(Clone, Debug)]
pub struct Quantifier {
  pub child: NodeId,
  pub min: u32,
  pub max: Option<u32>,
  pub lazy: bool,
}

impl Quantifier {
  /// The signal the child is linked back with.
  pub const ITERATED: Signal = 1;
  const EXIT: Signal = 2;
  const ENTER: Signal = 3;

  fn frame(
    analyzer: &mut Analyzer<'_>,
    id: NodeId,
  ) -> Result<(Reference, u32, usize), Fatal> {
    let (reference, frame) = read_frame(analyzer, id, FRAME)?;
    match frame.as_slice() {
      [Value::Int(count), Value::Cursor(start)] => {
        Ok((reference, *count as u32, *start))
      }
      _ => Err(Fatal::bookkeeping(id, "malformed quantifier frame")),
    }
  }

  fn decide(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    frame: Reference,
    count: u32,
  ) -> Result<(), Fatal> {
    if count < self.min {
      return self.iterate(analyzer, frame);
    }
    if self.max.map_or(false, |max| count >= max) {
      return self.exit(id, analyzer);
    }

    if self.lazy {
      analyzer.freeze(id, Self::ENTER);
      self.exit(id, analyzer)
    } else {
      analyzer.freeze(id, Self::EXIT);
      self.iterate(analyzer, frame)
    }
  }

  fn iterate(
    &self,
    analyzer: &mut Analyzer<'_>,
    frame: Reference,
  ) -> Result<(), Fatal> {
    let cursor = analyzer.text().cursor();
    analyzer.memory_mut().update(frame, |f| {
      if let Some(f) = f.as_list_mut() {
        f[1] = Value::Cursor(cursor);
      }
    })?;
    analyzer.enter(self.child);
    Ok(())
  }

  fn exit(&self, id: NodeId, analyzer: &mut Analyzer<'_>) -> Result<(), Fatal> {
    analyzer.memory_mut().remove(FRAME)?;
    analyzer.finish(id);
    Ok(())
  }
}

impl CompiledNode for Quantifier {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal> {
    match signal {
      SIGNAL_START => {
        let cursor = analyzer.text().cursor();
        let memory = analyzer.memory_mut();
        let frame = memory.alloc(Referenced::List(vec![
          Value::Int(0),
          Value::Cursor(cursor),
        ]))?;
        memory.push(FRAME, Value::Ref(frame))?;
        self.decide(id, analyzer, frame, 0)
      }
      Self::ITERATED => {
        let (frame, count, start) = Self::frame(analyzer, id)?;
        let count = count + 1;
        analyzer.memory_mut().update(frame, |f| {
          if let Some(f) = f.as_list_mut() {
            f[0] = Value::Int(count as i64);
          }
        })?;
        if count >= self.min && analyzer.text().cursor() == start {
          return self.exit(id, analyzer);
        }
        self.decide(id, analyzer, frame, count)
      }
      Self::EXIT => self.exit(id, analyzer),
      Self::ENTER => {
        let (frame, _, _) = Self::frame(analyzer, id)?;
        self.iterate(analyzer, frame)
      }
      _ => Err(Fatal::unexpected_signal(id, signal)),
    }
  }
}
