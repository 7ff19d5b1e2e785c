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

//! The versioned memory engine.
//!
//! All of the state of a running match lives in a [`Memory`]: a heap of
//! reference-counted cells and a stack of named bindings. The memory is
//! versioned as a chain of [`Generation`]s, where only the last one, the
//! tail, is ever written to. Calling [`Memory::freeze()`] starts a new
//! generation and returns a [`Checkpoint`]; calling [`Memory::rollback()`]
//! throws the newest generation away, restoring the state as it was at the
//! matching freeze.
//!
//! Reference counting is done here: every store of a [`Value::Ref`] into a
//! cell or a stack binding increments the count of the cell it points to,
//! and every overwrite or removal decrements it. Cycles are never freed by
//! counting; that is the job of the tracing sweep in [`gc`].

use std::fmt;

use crossbeam::channel;
use crossbeam::channel::Receiver;
use crossbeam::channel::Sender;

use crate::config::MemoryConfig;
use crate::nodes::NodeId;
use crate::nodes::Signal;

pub mod cell;
pub mod gc;
pub mod generation;
pub mod pool;
pub mod stack;

mod error;
mod value;

pub use error::MemoryError;
pub use generation::Generation;
pub use value::MatchNode;
pub use value::Object;
pub use value::Reference;
pub use value::Referenced;
pub use value::Value;

use pool::Pools;

/// The well-known stack name used to hand intermediate results from one
/// compiled node to the next.
pub const LAST: &str = "#last";

/// Where to continue execution after a rollback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResumeDescriptor {
  pub node: NodeId,
  pub signal: Signal,
  pub cursor: usize,
}

/// A rollback point, as returned by [`Memory::freeze()`].
///
/// A checkpoint names the generation that was the tail when it was taken.
/// It goes stale once that generation is discarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint {
  id: u64,
  depth: usize,
  // The generation the freeze started.
  successor: u64,
}

impl Checkpoint {
  /// Returns the id of the generation this checkpoint names.
  pub fn id(self) -> u64 {
    self.id
  }

  /// Returns the position of that generation in the chain.
  pub fn depth(self) -> usize {
    self.depth
  }
}

/// Diagnostic counters; see [`Memory::stats()`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MemoryStats {
  pub heap_size: usize,
  pub used_cells: usize,
  pub free_cells: usize,
  /// Percentage of free cells, relative to the sweep threshold.
  pub free_space: f64,
  pub stack_size: usize,
  pub stack_levels: usize,
  pub chain_len: usize,
  pub gc_threshold: usize,
  /// The id of the current generation.
  pub generation: u64,
}

impl fmt::Display for MemoryStats {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "heap: {} cells ({} used, {} free, {:.1}% free space), \
       stack: {} bindings in {} levels, \
       chain: {} generations (current #{}), gc threshold: {}",
      self.heap_size,
      self.used_cells,
      self.free_cells,
      self.free_space,
      self.stack_size,
      self.stack_levels,
      self.chain_len,
      self.generation,
      self.gc_threshold,
    )
  }
}

/// The generation chain, plus everything needed to maintain it.
#[derive(Debug)]
pub struct Memory {
  chain: Vec<Generation>,
  pools: Pools,
  next_id: u64,
  config: MemoryConfig,
  in_sweep: bool,

  // Single-slot sweep notifications; see `gc::Collector`.
  gc_tx: Sender<()>,
  gc_rx: Receiver<()>,
}

impl Default for Memory {
  fn default() -> Self {
    Memory::new(MemoryConfig::default())
  }
}

impl Memory {
  /// Creates a memory holding a single, empty generation.
  pub fn new(config: MemoryConfig) -> Self {
    let (gc_tx, gc_rx) = channel::bounded(1);
    Memory {
      chain: vec![Generation::root(0, config.initial_gc_threshold)],
      pools: Pools::new(config.max_pool_size),
      next_id: 1,
      config,
      in_sweep: false,
      gc_tx,
      gc_rx,
    }
  }

  pub fn config(&self) -> &MemoryConfig {
    &self.config
  }

  /// Returns a receiver that is notified whenever the heap grows past the
  /// sweep threshold. Notifications coalesce: at most one is ever pending.
  pub fn gc_receiver(&self) -> Receiver<()> {
    self.gc_rx.clone()
  }

  /// Returns the current generation.
  pub fn tail(&self) -> &Generation {
    self.view().0
  }

  /// Returns the number of generations in the chain.
  pub fn chain_len(&self) -> usize {
    self.chain.len()
  }

  /// Returns whether a tracing sweep is in progress.
  pub fn in_sweep(&self) -> bool {
    self.in_sweep
  }

  fn view(&self) -> (&Generation, &[Generation]) {
    match self.chain.split_last() {
      Some(split) => split,
      None => bug!("the generation chain is empty"),
    }
  }

  fn split(&mut self) -> (&mut Generation, &[Generation], &mut Pools) {
    match self.chain.split_last_mut() {
      Some((tail, preds)) => (tail, &*preds, &mut self.pools),
      None => bug!("the generation chain is empty"),
    }
  }

  /// Starts a new generation, returning a checkpoint for the previous one.
  ///
  /// Rolling back to the checkpoint yields `resume`.
  pub fn freeze(&mut self, resume: ResumeDescriptor) -> Checkpoint {
    let depth = self.chain.len() - 1;
    let tail = self.tail();
    let checkpoint = Checkpoint {
      id: tail.id(),
      depth,
      successor: self.next_id,
    };
    let next = tail.successor(self.next_id, resume);
    self.next_id += 1;
    self.chain.push(next);

    log::trace!(
      "freeze: generation {} on top of {} (depth {})",
      self.next_id - 1,
      checkpoint.id,
      depth
    );
    checkpoint
  }

  /// Discards the current generation, returning to the most recent
  /// checkpoint.
  ///
  /// Returns `None` if there is nothing left to roll back to.
  pub fn rollback(&mut self) -> Option<ResumeDescriptor> {
    if self.chain.len() <= 1 {
      log::debug!("rollback: no checkpoints left");
      return None;
    }
    let tail = self.chain.pop()?;
    let resume = tail.resume();
    log::trace!("rollback: discarding generation {}", tail.id());
    tail.destroy(&mut self.pools);
    resume
  }

  fn check(&self, checkpoint: Checkpoint) -> bool {
    self
      .chain
      .get(checkpoint.depth)
      .map_or(false, |g| g.id() == checkpoint.id)
  }

  /// Rolls back to a specific checkpoint, discarding every generation that
  /// was created after it.
  pub fn restore(
    &mut self,
    checkpoint: Checkpoint,
  ) -> Result<ResumeDescriptor, MemoryError> {
    let started = self
      .chain
      .get(checkpoint.depth + 1)
      .map_or(false, |g| g.id() == checkpoint.successor);
    if !self.check(checkpoint) || !started {
      return Err(MemoryError::NothingToRollbackTo);
    }

    let resume = match self.chain[checkpoint.depth + 1].resume() {
      Some(resume) => resume,
      None => bug!("generation after a checkpoint has no resume point"),
    };
    let discarded = self.chain.split_off(checkpoint.depth + 1);
    log::trace!(
      "restore: discarding {} generation(s) down to {}",
      discarded.len(),
      checkpoint.id
    );
    for g in discarded {
      g.destroy(&mut self.pools);
    }
    Ok(resume)
  }

  /// Merges every generation created after `checkpoint` into the generation
  /// it names, which becomes the tail.
  ///
  /// Every checkpoint taken after `checkpoint` becomes unreachable.
  pub fn collapse_chain_to(
    &mut self,
    checkpoint: Checkpoint,
  ) -> Result<(), MemoryError> {
    if !self.check(checkpoint) {
      return Err(MemoryError::StaleCheckpoint);
    }

    let newer = self.chain.split_off(checkpoint.depth + 1);
    let count = newer.len();
    let dest = &mut self.chain[checkpoint.depth];
    for g in newer {
      g.collapse_into(dest, &mut self.pools);
    }

    if count > 0 {
      log::debug!(
        "collapse: merged {} generation(s) into {}",
        count,
        checkpoint.id
      );
    }
    Ok(())
  }

  /// Destroys the whole chain and starts over from an empty generation.
  ///
  /// Any pending sweep request is dropped too.
  pub fn clear(&mut self) {
    for g in self.chain.drain(..) {
      g.destroy(&mut self.pools);
    }
    self
      .chain
      .push(Generation::root(self.next_id, self.config.initial_gc_threshold));
    self.next_id += 1;
    while self.gc_rx.try_recv().is_ok() {}
  }

  /// Returns diagnostic counters for the current generation.
  pub fn stats(&self) -> MemoryStats {
    let tail = self.tail();
    MemoryStats {
      heap_size: tail.heap_size(),
      used_cells: tail.used_cells(),
      free_cells: tail.free_cells(),
      free_space: tail.free_space(),
      stack_size: tail.stack_size(),
      stack_levels: tail.level_count(),
      chain_len: self.chain.len(),
      gc_threshold: tail.gc_threshold(),
      generation: tail.id(),
    }
  }

  /// Allocates a new cell holding `value`.
  ///
  /// The references held by `value` count as stored.
  pub fn alloc(&mut self, value: Referenced) -> Result<Reference, MemoryError> {
    for r in value.references() {
      self.increase_refs(r)?;
    }

    let (tail, preds, pools) = self.split();
    let (reference, over_threshold) = tail.alloc(preds, pools, value)?;
    if over_threshold {
      // A full channel means a sweep is already pending.
      let _ = self.gc_tx.try_send(());
    }
    Ok(reference)
  }

  /// Returns the value of the cell `reference` points to.
  ///
  /// Cells found far back in the chain are shifted into the current
  /// generation, which is why this needs `&mut self`.
  pub fn deref(
    &mut self,
    reference: Reference,
  ) -> Result<&Referenced, MemoryError> {
    let promotion = self.config.promotion_distance;
    let (tail, preds, pools) = self.split();
    tail
      .get_cell(preds, pools, promotion, reference.position())?
      .value()
  }

  /// Like `deref()`, but never shifts anything.
  pub fn peek(&self, reference: Reference) -> Result<&Referenced, MemoryError> {
    let (tail, preds) = self.view();
    tail.peek_cell(preds, reference.position())?.value()
  }

  /// Returns the reference count of the cell `reference` points to.
  pub fn refs(&self, reference: Reference) -> Result<usize, MemoryError> {
    let (tail, preds) = self.view();
    Ok(tail.peek_cell(preds, reference.position())?.refs())
  }

  /// Returns whether the cell at `reference` has been freed.
  pub fn is_freed(&self, reference: Reference) -> Result<bool, MemoryError> {
    let (tail, preds) = self.view();
    Ok(tail.peek_cell(preds, reference.position())?.is_free())
  }

  /// Replaces the value of a cell.
  pub fn set(
    &mut self,
    reference: Reference,
    value: Referenced,
  ) -> Result<(), MemoryError> {
    for r in value.references() {
      self.increase_refs(r)?;
    }

    let old = {
      let position = reference.position();
      let (tail, preds, pools) = self.split();
      tail.get_cell_for_write(preds, pools, position)?;
      tail.set_cell(position, value)?
    };
    self.decrease_all(old.references().collect())
  }

  /// Applies `f` to a copy of a cell's value and stores the result back.
  pub fn update<T>(
    &mut self,
    reference: Reference,
    f: impl FnOnce(&mut Referenced) -> T,
  ) -> Result<T, MemoryError> {
    let mut value = self.deref(reference)?.clone();
    let result = f(&mut value);
    self.set(reference, value)?;
    Ok(result)
  }

  /// Explicitly frees an unreferenced cell.
  pub fn free(&mut self, reference: Reference) -> Result<(), MemoryError> {
    self.release(reference.position())
  }

  fn release(&mut self, position: usize) -> Result<(), MemoryError> {
    let in_sweep = self.in_sweep;
    let (tail, preds, pools) = self.split();
    match tail.free(preds, pools, position, in_sweep)? {
      Some(value) => self.decrease_all(value.references().collect()),
      None => Ok(()),
    }
  }

  pub fn increase_refs(
    &mut self,
    reference: Reference,
  ) -> Result<(), MemoryError> {
    let (tail, preds, pools) = self.split();
    tail
      .get_cell_for_write(preds, pools, reference.position())?
      .increase()?;
    Ok(())
  }

  /// Decrements a reference count, freeing the cell if it reaches zero.
  ///
  /// Freeing cascades to whatever the freed value referenced.
  pub fn decrease_refs(
    &mut self,
    reference: Reference,
  ) -> Result<(), MemoryError> {
    self.decrease_all(vec![reference])
  }

  fn decrease_all(
    &mut self,
    mut pending: Vec<Reference>,
  ) -> Result<(), MemoryError> {
    let in_sweep = self.in_sweep;
    while let Some(reference) = pending.pop() {
      let position = reference.position();
      let (tail, preds, pools) = self.split();
      if in_sweep && tail.peek_cell(preds, position)?.is_free() {
        continue;
      }
      if tail.get_cell_for_write(preds, pools, position)?.decrease()? > 0 {
        continue;
      }
      if let Some(value) = tail.free(preds, pools, position, in_sweep)? {
        pending.extend(value.references());
      }
    }
    Ok(())
  }

  fn retain(&mut self, value: &Value) -> Result<(), MemoryError> {
    match value.reference() {
      Some(r) => self.increase_refs(r),
      None => Ok(()),
    }
  }

  fn forget(&mut self, value: &Value) -> Result<(), MemoryError> {
    match value.reference() {
      Some(r) => self.decrease_refs(r),
      None => Ok(()),
    }
  }

  /// Binds `name` on top of the stack.
  pub fn push(&mut self, name: &str, value: Value) -> Result<(), MemoryError> {
    self.retain(&value)?;
    let (tail, preds, pools) = self.split();
    tail.push(preds, pools, name, value);
    Ok(())
  }

  /// Returns the innermost binding of `name`.
  pub fn get(&self, name: &str) -> Result<Value, MemoryError> {
    let (tail, preds) = self.view();
    tail
      .get(preds, name)
      .cloned()
      .ok_or_else(|| MemoryError::StackNameNotFound {
        name: name.to_string(),
      })
  }

  pub fn contains(&self, name: &str) -> bool {
    let (tail, preds) = self.view();
    tail.get(preds, name).is_some()
  }

  /// Removes the innermost binding of `name`.
  pub fn remove(&mut self, name: &str) -> Result<(), MemoryError> {
    let (tail, preds, pools) = self.split();
    let value = tail.remove(preds, pools, name)?;
    self.forget(&value)
  }

  /// Overwrites the innermost binding of `name`.
  pub fn replace(
    &mut self,
    name: &str,
    value: Value,
  ) -> Result<(), MemoryError> {
    self.retain(&value)?;
    let (tail, preds, pools) = self.split();
    let old = tail.replace(preds, pools, name, value)?;
    self.forget(&old)
  }

  /// Moves the innermost binding of `old` to the top of the stack under the
  /// name `new`. Reference counts are unaffected.
  pub fn rename(&mut self, old: &str, new: &str) -> Result<(), MemoryError> {
    let (tail, preds, pools) = self.split();
    let value = tail.remove(preds, pools, old)?;
    tail.push(preds, pools, new, value);
    Ok(())
  }

  /// Binds [`LAST`].
  pub fn push_last(&mut self, value: Value) -> Result<(), MemoryError> {
    self.push(LAST, value)
  }

  pub fn get_last(&self) -> Result<Value, MemoryError> {
    self.get(LAST)
  }

  pub fn remove_last(&mut self) -> Result<(), MemoryError> {
    self.remove(LAST)
  }

  /// Gives the innermost [`LAST`] binding a proper name.
  pub fn rename_last(&mut self, name: &str) -> Result<(), MemoryError> {
    self.rename(LAST, name)
  }

  /// Moves the innermost [`LAST`] binding to the top of the stack.
  pub fn promote_last_to_end(&mut self) -> Result<(), MemoryError> {
    self.rename(LAST, LAST)
  }

  /// Iterates over every binding visible from the current generation, from
  /// the bottom of the stack up.
  pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
    let (tail, preds) = self.view();
    tail.bindings(preds)
  }
}
