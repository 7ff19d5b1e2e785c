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

//! Generations: differential snapshots of the heap and the stack.
//!
//! A generation only owns the cells and stack levels that were created or
//! written while it was the tail of the chain; everything else is found by
//! walking back through its predecessors. Every operation that may need to
//! walk back takes the predecessors explicitly, as a slice ordered from the
//! oldest generation to the immediate predecessor.
//!
//! The counters of a generation (heap size, used cells, free list head, and
//! so on) are not deltas: they describe the whole chain as seen from that
//! generation, so they are copied forward on creation and copied backward on
//! collapse.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::memory::cell::Cell;
use crate::memory::pool::Pools;
use crate::memory::stack::StackLevel;
use crate::memory::MemoryError;
use crate::memory::Reference;
use crate::memory::Referenced;
use crate::memory::ResumeDescriptor;
use crate::memory::Value;

/// One differential snapshot of the process state.
#[derive(Debug)]
pub struct Generation {
  id: u64,
  heap: HashMap<usize, Box<Cell>>,
  levels: HashMap<usize, Box<StackLevel>>,

  heap_size: usize,
  used_cells: usize,
  free_head: Option<usize>,
  gc_threshold: usize,
  level_count: usize,
  stack_size: usize,

  // Set on every generation but the root: where to continue if execution
  // rolls back past this generation.
  resume: Option<ResumeDescriptor>,
}

/// Finds the newest copy of a cell in `preds`, along with the number of
/// generations that had to be walked to find it.
fn find_in(preds: &[Generation], position: usize) -> Option<(&Cell, usize)> {
  preds
    .iter()
    .rev()
    .enumerate()
    .find_map(|(hops, g)| g.heap.get(&position).map(|c| (&**c, hops + 1)))
}

impl Generation {
  /// Creates the first generation of a chain.
  pub fn root(id: u64, gc_threshold: usize) -> Self {
    Generation {
      id,
      heap: HashMap::new(),
      levels: HashMap::new(),
      heap_size: 0,
      used_cells: 0,
      free_head: None,
      gc_threshold,
      level_count: 0,
      stack_size: 0,
      resume: None,
    }
  }

  /// Creates an empty generation that follows `self`.
  pub fn successor(&self, id: u64, resume: ResumeDescriptor) -> Self {
    Generation {
      id,
      heap: HashMap::new(),
      levels: HashMap::new(),
      heap_size: self.heap_size,
      used_cells: self.used_cells,
      free_head: self.free_head,
      gc_threshold: self.gc_threshold,
      level_count: self.level_count,
      stack_size: self.stack_size,
      resume: Some(resume),
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn resume(&self) -> Option<ResumeDescriptor> {
    self.resume
  }

  pub fn heap_size(&self) -> usize {
    self.heap_size
  }

  pub fn used_cells(&self) -> usize {
    self.used_cells
  }

  pub fn free_cells(&self) -> usize {
    self.heap_size - self.used_cells
  }

  pub fn gc_threshold(&self) -> usize {
    self.gc_threshold
  }

  pub fn set_gc_threshold(&mut self, threshold: usize) {
    self.gc_threshold = threshold;
  }

  pub fn level_count(&self) -> usize {
    self.level_count
  }

  pub fn stack_size(&self) -> usize {
    self.stack_size
  }

  /// Returns the percentage of the heap that is free, where the heap is
  /// considered to be at least as large as the sweep threshold.
  pub fn free_space(&self) -> f64 {
    let capacity = self.heap_size.max(self.gc_threshold).max(1);
    100.0 - (self.used_cells as f64 * 100.0 / capacity as f64)
  }

  /// Returns whether this generation owns a copy of the cell at `position`.
  pub fn owns_cell(&self, position: usize) -> bool {
    self.heap.contains_key(&position)
  }

  /// Returns the number of cells this generation owns.
  pub fn local_cells(&self) -> usize {
    self.heap.len()
  }

  fn check_bounds(&self, position: usize) -> Result<(), MemoryError> {
    if position >= self.heap_size {
      return Err(MemoryError::SegmentationFault { position });
    }
    Ok(())
  }

  /// Looks up a cell without ever copying it.
  pub fn peek_cell<'a>(
    &'a self,
    preds: &'a [Generation],
    position: usize,
  ) -> Result<&'a Cell, MemoryError> {
    self.check_bounds(position)?;
    match self.heap.get(&position) {
      Some(cell) => Ok(&**cell),
      None => find_in(preds, position)
        .map(|(cell, _)| cell)
        .ok_or(MemoryError::SegmentationFault { position }),
    }
  }

  /// Looks up a cell for reading.
  ///
  /// If the cell is more than `promotion_distance` generations away, it is
  /// shifted into `self` so that later lookups are shorter.
  pub fn get_cell<'a>(
    &'a mut self,
    preds: &'a [Generation],
    pools: &mut Pools,
    promotion_distance: usize,
    position: usize,
  ) -> Result<&'a Cell, MemoryError> {
    self.check_bounds(position)?;
    if !self.heap.contains_key(&position) {
      let (cell, hops) = find_in(preds, position)
        .ok_or(MemoryError::SegmentationFault { position })?;
      if hops <= promotion_distance {
        return Ok(cell);
      }
      let copy = pools.cells.shift(cell);
      self.heap.insert(position, copy);
    }
    let cell: &Cell = &self.heap[&position];
    Ok(cell)
  }

  /// Looks up a cell for writing, shifting it into `self` first if needed.
  pub fn get_cell_for_write(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    position: usize,
  ) -> Result<&mut Cell, MemoryError> {
    self.check_bounds(position)?;
    let cell = match self.heap.entry(position) {
      Entry::Occupied(e) => e.into_mut(),
      Entry::Vacant(e) => {
        let (cell, _) = find_in(preds, position)
          .ok_or(MemoryError::SegmentationFault { position })?;
        e.insert(pools.cells.shift(cell))
      }
    };
    Ok(&mut **cell)
  }

  /// Overwrites the value of a cell `self` already owns, returning the old
  /// value.
  pub fn set_cell(
    &mut self,
    position: usize,
    value: Referenced,
  ) -> Result<Referenced, MemoryError> {
    self.check_bounds(position)?;
    let cell = match self.heap.get_mut(&position) {
      Some(cell) => cell,
      None => bug!("cell {} was written without being shifted", position),
    };
    Ok(std::mem::replace(cell.value_mut()?, value))
  }

  /// Allocates a cell holding `value`, reusing a free one if possible.
  ///
  /// Also returns whether the heap has grown up to the sweep threshold.
  pub fn alloc(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    value: Referenced,
  ) -> Result<(Reference, bool), MemoryError> {
    let position = match self.free_head {
      Some(position) => position,
      None => {
        let position = self.heap_size;
        let cell = pools.cells.acquire(position, value);
        if let Some(stale) = self.heap.insert(position, cell) {
          pools.cells.release(stale);
        }
        self.heap_size += 1;
        self.used_cells += 1;
        let over = self.heap_size >= self.gc_threshold;
        return Ok((Reference::new(position), over));
      }
    };

    let cell = self.get_cell_for_write(preds, pools, position)?;
    let next = match cell.next_free() {
      Some(next) => next,
      None => bug!("free list points at used cell {}", position),
    };
    cell.occupy(value);
    self.free_head = next;
    self.used_cells += 1;
    Ok((Reference::new(position), false))
  }

  /// Frees the cell at `position`, returning the value it held so that the
  /// caller can release the references inside it.
  ///
  /// Outside of a sweep, freeing a free cell or a referenced cell is an
  /// error. During a sweep both are allowed; the former is a no-op.
  pub fn free(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    position: usize,
    in_sweep: bool,
  ) -> Result<Option<Referenced>, MemoryError> {
    let (is_free, refs) = {
      let cell = self.peek_cell(preds, position)?;
      (cell.is_free(), cell.refs())
    };
    if is_free {
      if in_sweep {
        return Ok(None);
      }
      return Err(MemoryError::DoubleFree { position });
    }
    if refs > 0 && !in_sweep {
      return Err(MemoryError::ReferencedCellFreed { position, refs });
    }

    let next = self.free_head;
    let value = self
      .get_cell_for_write(preds, pools, position)?
      .release(next);
    self.free_head = Some(position);
    self.used_cells -= 1;
    Ok(value)
  }

  fn find_level<'a>(
    &'a self,
    preds: &'a [Generation],
    index: usize,
  ) -> Option<&'a StackLevel> {
    if index >= self.level_count {
      return None;
    }
    match self.levels.get(&index) {
      Some(level) => Some(&**level),
      None => preds
        .iter()
        .rev()
        .find_map(|g| g.levels.get(&index))
        .map(|l| &**l),
    }
  }

  fn level_for_write(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    index: usize,
  ) -> &mut StackLevel {
    let level = match self.levels.entry(index) {
      Entry::Occupied(e) => e.into_mut(),
      Entry::Vacant(e) => {
        match preds.iter().rev().find_map(|g| g.levels.get(&index)) {
          Some(level) => e.insert(pools.levels.shift(level)),
          None => bug!("stack level {} is missing from the chain", index),
        }
      }
    };
    &mut **level
  }

  /// Returns the index of the topmost level binding `name`.
  fn level_of(&self, preds: &[Generation], name: &str) -> Option<usize> {
    (0..self.level_count).rev().find(|&i| {
      self
        .find_level(preds, i)
        .map_or(false, |level| level.contains(name))
    })
  }

  /// Binds `name` on top of the stack.
  ///
  /// If the top level already binds `name`, a new level is opened so that
  /// the old binding survives underneath.
  pub fn push(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    name: &str,
    value: Value,
  ) {
    let needs_level = match self.level_count.checked_sub(1) {
      None => true,
      Some(top) => self
        .find_level(preds, top)
        .map_or(true, |level| level.contains(name)),
    };
    if needs_level {
      let index = self.level_count;
      let level = pools.levels.acquire(index);
      if let Some(stale) = self.levels.insert(index, level) {
        pools.levels.release(stale);
      }
      self.level_count += 1;
    }

    let top = self.level_count - 1;
    self
      .level_for_write(preds, pools, top)
      .insert(name.to_string(), value);
    self.stack_size += 1;
  }

  /// Returns the innermost binding of `name`.
  pub fn get<'a>(
    &'a self,
    preds: &'a [Generation],
    name: &str,
  ) -> Option<&'a Value> {
    (0..self.level_count)
      .rev()
      .filter_map(|i| self.find_level(preds, i))
      .find_map(|level| level.get(name))
  }

  /// Removes the innermost binding of `name`, returning its value.
  ///
  /// Empty levels left on top of the stack are dropped.
  pub fn remove(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    name: &str,
  ) -> Result<Value, MemoryError> {
    let index = self.level_of(preds, name).ok_or_else(|| {
      MemoryError::StackNameNotFound {
        name: name.to_string(),
      }
    })?;
    let value = match self.level_for_write(preds, pools, index).remove(name) {
      Some(value) => value,
      None => bug!("binding {} vanished from level {}", name, index),
    };
    self.stack_size -= 1;

    while let Some(top) = self.level_count.checked_sub(1) {
      let empty = self
        .find_level(preds, top)
        .map_or(true, |level| level.is_empty());
      if !empty {
        break;
      }
      if let Some(level) = self.levels.remove(&top) {
        pools.levels.release(level);
      }
      self.level_count -= 1;
    }
    Ok(value)
  }

  /// Overwrites the innermost binding of `name`, returning the old value.
  pub fn replace(
    &mut self,
    preds: &[Generation],
    pools: &mut Pools,
    name: &str,
    value: Value,
  ) -> Result<Value, MemoryError> {
    let index = self.level_of(preds, name).ok_or_else(|| {
      MemoryError::StackNameNotFound {
        name: name.to_string(),
      }
    })?;
    match self.level_for_write(preds, pools, index).set(name, value) {
      Some(old) => Ok(old),
      None => bug!("binding {} vanished from level {}", name, index),
    }
  }

  /// Iterates over every visible binding, from the bottom of the stack up.
  pub fn bindings<'a>(
    &'a self,
    preds: &'a [Generation],
  ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
    (0..self.level_count)
      .filter_map(move |i| self.find_level(preds, i))
      .flat_map(|level| level.iter())
  }

  /// Merges everything `self` owns into `dest`, an older generation, and
  /// destroys `self`.
  ///
  /// Collapsing a run of generations must be done oldest first, so that
  /// newer copies override older ones.
  pub fn collapse_into(mut self, dest: &mut Generation, pools: &mut Pools) {
    for (position, cell) in self.heap.drain() {
      if let Some(old) = dest.heap.insert(position, cell) {
        pools.cells.release(old);
      }
    }
    for (index, level) in self.levels.drain() {
      if let Some(old) = dest.levels.insert(index, level) {
        pools.levels.release(old);
      }
    }

    let level_count = self.level_count;
    let stale = dest
      .levels
      .keys()
      .copied()
      .filter(|&i| i >= level_count)
      .collect::<Vec<_>>();
    for index in stale {
      if let Some(level) = dest.levels.remove(&index) {
        pools.levels.release(level);
      }
    }

    dest.heap_size = self.heap_size;
    dest.used_cells = self.used_cells;
    dest.free_head = self.free_head;
    dest.gc_threshold = self.gc_threshold;
    dest.level_count = self.level_count;
    dest.stack_size = self.stack_size;
  }

  /// Returns every cell and level `self` owns to the pools.
  pub fn destroy(mut self, pools: &mut Pools) {
    for (_, cell) in self.heap.drain() {
      pools.cells.release(cell);
    }
    for (_, level) in self.levels.drain() {
      pools.levels.release(level);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::nodes::NodeId;

  fn resume() -> ResumeDescriptor {
    ResumeDescriptor {
      node: NodeId::new(0),
      signal: 0,
      cursor: 0,
    }
  }

  fn list(i: i64) -> Referenced {
    Referenced::List(vec![Value::Int(i)])
  }

  #[test]
  fn alloc_grows_then_reuses() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    let (a, _) = root.alloc(&[], &mut pools, list(1)).unwrap();
    let (b, _) = root.alloc(&[], &mut pools, list(2)).unwrap();
    assert_eq!((a.position(), b.position()), (0, 1));
    assert_eq!(root.heap_size(), 2);

    root.free(&[], &mut pools, 0, false).unwrap();
    assert_eq!(root.used_cells(), 1);

    let (c, _) = root.alloc(&[], &mut pools, list(3)).unwrap();
    assert_eq!(c.position(), 0);
    assert_eq!(root.heap_size(), 2);
    let (d, _) = root.alloc(&[], &mut pools, list(4)).unwrap();
    assert_eq!(d.position(), 2);
  }

  #[test]
  fn free_list_survives_growth() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.alloc(&[], &mut pools, list(0)).unwrap();
    root.alloc(&[], &mut pools, list(1)).unwrap();
    root.free(&[], &mut pools, 1, false).unwrap();
    root.free(&[], &mut pools, 0, false).unwrap();

    let positions = (0..4)
      .map(|i| root.alloc(&[], &mut pools, list(i)).unwrap().0.position())
      .collect::<Vec<_>>();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    assert_eq!(root.used_cells(), 4);
  }

  #[test]
  fn alloc_reports_threshold() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 2);
    assert!(!root.alloc(&[], &mut pools, list(0)).unwrap().1);
    assert!(root.alloc(&[], &mut pools, list(1)).unwrap().1);
  }

  #[test]
  fn free_errors() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.alloc(&[], &mut pools, list(0)).unwrap();
    root.get_cell_for_write(&[], &mut pools, 0).unwrap().increase().unwrap();

    assert_eq!(
      root.free(&[], &mut pools, 0, false),
      Err(MemoryError::ReferencedCellFreed {
        position: 0,
        refs: 1
      })
    );
    assert_eq!(root.free(&[], &mut pools, 0, true), Ok(Some(list(0))));
    assert_eq!(
      root.free(&[], &mut pools, 0, false),
      Err(MemoryError::DoubleFree { position: 0 })
    );
    assert_eq!(root.free(&[], &mut pools, 0, true), Ok(None));
    assert_eq!(
      root.free(&[], &mut pools, 9, true),
      Err(MemoryError::SegmentationFault { position: 9 })
    );
  }

  #[test]
  fn writes_are_copy_on_write() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.alloc(&[], &mut pools, list(10)).unwrap();

    let mut next = root.successor(1, resume());
    let preds = std::slice::from_ref(&root);
    assert!(!next.owns_cell(0));
    next.get_cell_for_write(preds, &mut pools, 0).unwrap();
    next.set_cell(0, list(20)).unwrap();

    assert!(next.owns_cell(0));
    assert_eq!(next.peek_cell(preds, 0).unwrap().value(), Ok(&list(20)));
    assert_eq!(root.peek_cell(&[], 0).unwrap().value(), Ok(&list(10)));
  }

  #[test]
  fn distant_reads_are_promoted() {
    let mut pools = Pools::new(8);
    let mut chain = vec![Generation::root(0, 100)];
    chain[0].alloc(&[], &mut pools, list(1)).unwrap();
    for id in 1..4 {
      let next = chain[id as usize - 1].successor(id, resume());
      chain.push(next);
    }

    // Three hops away from the tail.
    let (tail, preds) = chain.split_last_mut().unwrap();
    tail.get_cell(preds, &mut pools, 3, 0).unwrap();
    assert!(!tail.owns_cell(0));
    tail.get_cell(preds, &mut pools, 2, 0).unwrap();
    assert!(tail.owns_cell(0));
    assert_eq!(tail.peek_cell(preds, 0).unwrap().value(), Ok(&list(1)));
  }

  #[test]
  fn push_shadows_in_new_level() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.push(&[], &mut pools, "x", Value::Int(1));
    root.push(&[], &mut pools, "y", Value::Int(2));
    assert_eq!(root.level_count(), 1);

    root.push(&[], &mut pools, "x", Value::Int(3));
    assert_eq!(root.level_count(), 2);
    assert_eq!(root.stack_size(), 3);
    assert_eq!(root.get(&[], "x"), Some(&Value::Int(3)));

    root.remove(&[], &mut pools, "x").unwrap();
    assert_eq!(root.level_count(), 1);
    assert_eq!(root.get(&[], "x"), Some(&Value::Int(1)));
    assert_eq!(
      root.remove(&[], &mut pools, "z"),
      Err(MemoryError::StackNameNotFound { name: "z".into() })
    );
  }

  #[test]
  fn removing_drops_empty_levels_in_cascade() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.push(&[], &mut pools, "x", Value::Int(1));
    root.push(&[], &mut pools, "x", Value::Int(2));
    root.push(&[], &mut pools, "x", Value::Int(3));
    root.remove(&[], &mut pools, "x").unwrap();
    root.remove(&[], &mut pools, "x").unwrap();
    root.remove(&[], &mut pools, "x").unwrap();
    assert_eq!(root.level_count(), 0);
    assert_eq!(root.stack_size(), 0);
  }

  #[test]
  fn stack_writes_shift_levels() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.push(&[], &mut pools, "x", Value::Int(1));

    let mut next = root.successor(1, resume());
    let preds = std::slice::from_ref(&root);
    next.replace(preds, &mut pools, "x", Value::Int(2)).unwrap();
    assert_eq!(next.get(preds, "x"), Some(&Value::Int(2)));
    assert_eq!(root.get(&[], "x"), Some(&Value::Int(1)));
  }

  #[test]
  fn reopened_levels_start_empty() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.push(&[], &mut pools, "a", Value::Int(1));
    root.push(&[], &mut pools, "a", Value::Int(2));
    root.push(&[], &mut pools, "b", Value::Int(3));

    let mut next = root.successor(1, resume());
    let preds = std::slice::from_ref(&root);
    next.remove(preds, &mut pools, "b").unwrap();
    next.remove(preds, &mut pools, "a").unwrap();
    assert_eq!(next.level_count(), 1);

    next.push(preds, &mut pools, "a", Value::Int(4));
    assert_eq!(next.level_count(), 2);
    assert_eq!(next.get(preds, "b"), None);
    let visible = next.bindings(preds).collect::<Vec<_>>();
    assert_eq!(visible, vec![("a", &Value::Int(1)), ("a", &Value::Int(4))]);
  }

  #[test]
  fn collapse_keeps_the_newest_view() {
    let mut pools = Pools::new(8);
    let mut root = Generation::root(0, 100);
    root.alloc(&[], &mut pools, list(1)).unwrap();
    root.push(&[], &mut pools, "x", Value::Int(1));
    root.push(&[], &mut pools, "x", Value::Int(2));

    let mut next = root.successor(1, resume());
    {
      let preds = std::slice::from_ref(&root);
      next.get_cell_for_write(preds, &mut pools, 0).unwrap();
      next.set_cell(0, list(5)).unwrap();
      next.alloc(preds, &mut pools, list(6)).unwrap();
      next.remove(preds, &mut pools, "x").unwrap();
    }

    next.collapse_into(&mut root, &mut pools);
    assert_eq!(root.heap_size(), 2);
    assert_eq!(root.level_count(), 1);
    assert_eq!(root.peek_cell(&[], 0).unwrap().value(), Ok(&list(5)));
    assert_eq!(root.peek_cell(&[], 1).unwrap().value(), Ok(&list(6)));
    assert_eq!(root.get(&[], "x"), Some(&Value::Int(1)));
    assert_eq!(root.resume(), None);
  }
}
