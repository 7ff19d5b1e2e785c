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

//! The tracing garbage collector.
//!
//! Reference counting, done by [`Memory`] itself, frees almost everything;
//! what it cannot free are cycles, such as a capture node and its parent.
//! Those are reclaimed by a tracing sweep of the current generation:
//! - Every cell reachable from a live stack binding is marked, following
//!   references with an explicit worklist. The global context is itself a
//!   stack binding, so it needs no special treatment. Marks are kept on the
//!   side, so marking neither writes nor shifts cells.
//! - Every cell of the heap that is neither marked nor already free is then
//!   freed, in sweep mode: freeing a referenced cell is allowed, and so is
//!   freeing a cell twice, since cascading frees race with the scan.
//!
//! Sweeps are requested by the memory whenever the heap grows up to its
//! threshold, through a single-slot channel. They are run by a [`Collector`]
//! that the execution loop polls between steps, so a sweep never overlaps
//! with a mutation.

use std::time::Duration;
use std::time::Instant;

use crossbeam::channel::Receiver;

use crate::memory::Memory;
use crate::memory::MemoryError;

/// The result of a sweep that actually ran.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepReport {
  /// Number of cells freed, including the ones freed by cascading.
  pub freed: usize,
  pub heap_size: usize,
  pub threshold_before: usize,
  pub threshold_after: usize,
  pub elapsed: Duration,
}

impl Memory {
  /// Runs a tracing sweep over the current generation.
  ///
  /// Unless `forced`, the sweep is skipped, and `None` returned, when free
  /// space is already above the configured minimum.
  pub fn sweep(
    &mut self,
    forced: bool,
  ) -> Result<Option<SweepReport>, MemoryError> {
    let minimum = self.config().minimum_free_space;
    if !forced && self.tail().free_space() >= minimum {
      return Ok(None);
    }

    let start = Instant::now();
    let used_before = self.tail().used_cells();
    let marks = self.mark();

    self.in_sweep = true;
    let result = self.sweep_unmarked(&marks);
    self.in_sweep = false;
    result?;

    let growth = self.config().threshold_growth;
    let threshold_before = self.tail().gc_threshold();
    let mut threshold_after = threshold_before;
    if self.tail().free_space() < minimum {
      let grown = (threshold_before as f64 * growth).ceil() as usize;
      threshold_after = grown.max(threshold_before + 1);
      let (tail, _, _) = self.split();
      tail.set_gc_threshold(threshold_after);
    }

    let report = SweepReport {
      freed: used_before - self.tail().used_cells(),
      heap_size: self.tail().heap_size(),
      threshold_before,
      threshold_after,
      elapsed: start.elapsed(),
    };
    log::debug!(
      "sweep: freed {} of {} cells in {:?}; threshold {} -> {}",
      report.freed,
      report.heap_size,
      report.elapsed,
      report.threshold_before,
      report.threshold_after,
    );
    Ok(Some(report))
  }

  /// Marks every cell reachable from the stack.
  fn mark(&self) -> Vec<bool> {
    let (tail, preds) = self.view();
    let mut marks = vec![false; tail.heap_size()];
    let mut pending = tail
      .bindings(preds)
      .filter_map(|(_, value)| value.reference())
      .collect::<Vec<_>>();

    while let Some(reference) = pending.pop() {
      let position = reference.position();
      if marks.get(position) != Some(&false) {
        continue;
      }
      let value = match tail.peek_cell(preds, position).map(|c| c.value()) {
        Ok(Ok(value)) => value,
        _ => continue,
      };
      marks[position] = true;
      pending.extend(value.references());
    }
    marks
  }

  fn sweep_unmarked(&mut self, marks: &[bool]) -> Result<(), MemoryError> {
    for (position, &marked) in marks.iter().enumerate() {
      if marked {
        continue;
      }
      let free = {
        let (tail, preds) = self.view();
        tail.peek_cell(preds, position)?.is_free()
      };
      if !free {
        self.release(position)?;
      }
    }
    Ok(())
  }
}

/// The cooperatively scheduled sweep task.
///
/// A `Collector` listens to a memory's sweep requests and runs the sweep
/// when polled. Any number of requests made between two polls result in a
/// single sweep.
#[derive(Debug)]
pub struct Collector {
  pending: Receiver<()>,
  sweeps: usize,
  freed: usize,
  elapsed: Duration,
  last: Option<SweepReport>,
}

impl Collector {
  /// Creates a collector for `memory`.
  pub fn new(memory: &Memory) -> Self {
    Collector {
      pending: memory.gc_receiver(),
      sweeps: 0,
      freed: 0,
      elapsed: Duration::default(),
      last: None,
    }
  }

  /// Returns whether a sweep has been requested since the last poll.
  pub fn is_pending(&self) -> bool {
    !self.pending.is_empty()
  }

  /// Runs a sweep if one has been requested.
  pub fn poll(
    &mut self,
    memory: &mut Memory,
  ) -> Result<Option<SweepReport>, MemoryError> {
    if self.pending.try_recv().is_err() {
      return Ok(None);
    }

    let report = memory.sweep(false)?;
    if let Some(report) = &report {
      self.sweeps += 1;
      self.freed += report.freed;
      self.elapsed += report.elapsed;
      self.last = Some(report.clone());
    }
    Ok(report)
  }

  /// Returns the number of sweeps that actually ran.
  pub fn sweeps(&self) -> usize {
    self.sweeps
  }

  /// Returns the total number of cells freed by sweeps.
  pub fn freed(&self) -> usize {
    self.freed
  }

  /// Returns the total time spent sweeping.
  pub fn elapsed(&self) -> Duration {
    self.elapsed
  }

  pub fn last_report(&self) -> Option<&SweepReport> {
    self.last.as_ref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::MemoryConfig;
  use crate::memory::MatchNode;
  use crate::memory::Reference;
  use crate::memory::Referenced;
  use crate::memory::ResumeDescriptor;
  use crate::memory::Value;
  use crate::nodes::NodeId;
  use proptest::prelude::*;

  fn list(values: Vec<Value>) -> Referenced {
    Referenced::List(values)
  }

  /// Builds a parent/child pair of match nodes, which reference each other.
  fn cycle(memory: &mut Memory) -> (Reference, Reference) {
    let parent = memory.alloc(MatchNode::new("p", None, 0).into()).unwrap();
    let child = memory
      .alloc(MatchNode::new("c", Some(parent), 0).into())
      .unwrap();
    memory
      .update(parent, |p| p.as_node_mut().unwrap().children.push(child))
      .unwrap();
    (parent, child)
  }

  #[test]
  fn cycles_need_a_sweep() {
    let mut memory = Memory::default();
    let (parent, child) = cycle(&mut memory);
    memory.push("root", Value::Ref(parent)).unwrap();
    memory.remove("root").unwrap();

    // Counting alone cannot free them.
    assert_eq!(memory.is_freed(parent), Ok(false));
    assert_eq!(memory.is_freed(child), Ok(false));

    let report = memory.sweep(true).unwrap().unwrap();
    assert_eq!(report.freed, 2);
    assert_eq!(memory.is_freed(parent), Ok(true));
    assert_eq!(memory.is_freed(child), Ok(true));
    assert_eq!(memory.stats().used_cells, 0);
  }

  #[test]
  fn reachable_cells_survive() {
    let mut memory = Memory::default();
    let (parent, child) = cycle(&mut memory);
    let leaf = memory.alloc(list(vec![Value::Int(7)])).unwrap();
    let holder = memory.alloc(list(vec![Value::Ref(leaf)])).unwrap();
    memory.push("tree", Value::Ref(parent)).unwrap();
    memory.push("holder", Value::Ref(holder)).unwrap();
    let garbage = memory.alloc(list(vec![])).unwrap();

    let report = memory.sweep(true).unwrap().unwrap();
    assert_eq!(report.freed, 1);
    assert_eq!(memory.is_freed(garbage), Ok(true));
    for r in [parent, child, leaf, holder].iter() {
      assert_eq!(memory.is_freed(*r), Ok(false));
    }
    assert_eq!(
      memory.peek(leaf).unwrap(),
      &list(vec![Value::Int(7)])
    );
  }

  #[test]
  fn unforced_sweeps_respect_free_space() {
    let mut memory = Memory::new(MemoryConfig {
      initial_gc_threshold: 100,
      ..Default::default()
    });
    memory.alloc(list(vec![])).unwrap();
    assert_eq!(memory.sweep(false), Ok(None));
    assert!(memory.sweep(true).unwrap().is_some());
  }

  #[test]
  fn threshold_grows_when_full() {
    let mut memory = Memory::new(MemoryConfig {
      initial_gc_threshold: 4,
      threshold_growth: 2.0,
      minimum_free_space: 20.0,
      ..Default::default()
    });
    for i in 0..4 {
      let r = memory.alloc(list(vec![Value::Int(i)])).unwrap();
      memory.push(&format!("v{}", i), Value::Ref(r)).unwrap();
    }

    let report = memory.sweep(false).unwrap().unwrap();
    assert_eq!(report.freed, 0);
    assert_eq!((report.threshold_before, report.threshold_after), (4, 8));
    assert_eq!(memory.stats().gc_threshold, 8);
  }

  #[test]
  fn sweeps_do_not_leak_into_older_generations() {
    let mut memory = Memory::default();
    let (parent, _) = cycle(&mut memory);
    memory.push("tree", Value::Ref(parent)).unwrap();
    memory.freeze(ResumeDescriptor {
      node: NodeId::new(0),
      signal: 0,
      cursor: 0,
    });
    memory.remove("tree").unwrap();

    assert_eq!(memory.sweep(true).unwrap().unwrap().freed, 2);
    memory.rollback().unwrap();
    assert_eq!(memory.is_freed(parent), Ok(false));
    assert_eq!(memory.get("tree"), Ok(Value::Ref(parent)));
  }

  #[test]
  fn collector_coalesces_requests() {
    let mut memory = Memory::new(MemoryConfig {
      initial_gc_threshold: 2,
      ..Default::default()
    });
    let mut collector = Collector::new(&memory);
    assert_eq!(collector.poll(&mut memory), Ok(None));

    for _ in 0..6 {
      cycle(&mut memory);
    }
    assert!(collector.is_pending());
    let report = collector.poll(&mut memory).unwrap().unwrap();
    assert_eq!(report.freed, 12);
    assert!(!collector.is_pending());
    assert_eq!(collector.poll(&mut memory), Ok(None));
    assert_eq!((collector.sweeps(), collector.freed()), (1, 12));
    assert_eq!(collector.last_report(), Some(&report));
  }

  proptest! {
    #[test]
    fn sweeps_are_sound(
      edges in prop::collection::vec((0..12usize, 0..12usize), 0..30),
      roots in prop::collection::vec(0..12usize, 0..4),
    ) {
      let mut memory = Memory::default();
      let cells = (0..12)
        .map(|_| memory.alloc(list(vec![])).unwrap())
        .collect::<Vec<_>>();
      for &(from, to) in &edges {
        memory
          .update(cells[from], |v| {
            v.as_list_mut().unwrap().push(Value::Ref(cells[to]))
          })
          .unwrap();
      }
      for (i, &root) in roots.iter().enumerate() {
        memory.push(&format!("r{}", i), Value::Ref(cells[root])).unwrap();
      }

      // Reachability, computed independently of the collector.
      let mut reachable = vec![false; cells.len()];
      let mut pending = roots.clone();
      while let Some(i) = pending.pop() {
        if reachable[i] {
          continue;
        }
        reachable[i] = true;
        pending.extend(edges.iter().filter(|e| e.0 == i).map(|e| e.1));
      }
      let before = cells
        .iter()
        .map(|&r| memory.peek(r).ok().cloned())
        .collect::<Vec<_>>();

      memory.sweep(true).unwrap();
      for (i, &r) in cells.iter().enumerate() {
        prop_assert_eq!(memory.is_freed(r).unwrap(), !reachable[i]);
        if reachable[i] {
          prop_assert_eq!(memory.peek(r).ok().cloned(), before[i].clone());
        }
      }
    }
  }
}
