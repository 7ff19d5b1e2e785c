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

//! Heap cells.

use std::fmt;
use std::mem;

use crate::memory::pool::Pool;
use crate::memory::pool::Recycle;
use crate::memory::MemoryError;
use crate::memory::Referenced;

/// The contents of a [`Cell`].
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
  /// A live value together with its reference count.
  Used { value: Referenced, refs: usize },
  /// A freed cell; `next` threads the free list through the heap.
  Free { next: Option<usize> },
}

/// One addressable heap slot.
///
/// A free cell always has a reference count of zero; it is not possible to
/// represent anything else.
#[derive(Clone, PartialEq)]
pub struct Cell {
  position: usize,
  slot: Slot,
}

impl Cell {
  /// Returns this cell's position in the heap.
  pub fn position(&self) -> usize {
    self.position
  }

  pub fn slot(&self) -> &Slot {
    &self.slot
  }

  pub fn is_free(&self) -> bool {
    match self.slot {
      Slot::Free { .. } => true,
      Slot::Used { .. } => false,
    }
  }

  /// Returns the current reference count; free cells have none.
  pub fn refs(&self) -> usize {
    match self.slot {
      Slot::Used { refs, .. } => refs,
      Slot::Free { .. } => 0,
    }
  }

  /// Returns the next link of the free list, or `None` if this cell is not
  /// free.
  pub fn next_free(&self) -> Option<Option<usize>> {
    match self.slot {
      Slot::Free { next } => Some(next),
      Slot::Used { .. } => None,
    }
  }

  pub fn value(&self) -> Result<&Referenced, MemoryError> {
    match &self.slot {
      Slot::Used { value, .. } => Ok(value),
      Slot::Free { .. } => Err(MemoryError::FreedCell {
        position: self.position,
      }),
    }
  }

  pub fn value_mut(&mut self) -> Result<&mut Referenced, MemoryError> {
    match &mut self.slot {
      Slot::Used { value, .. } => Ok(value),
      Slot::Free { .. } => Err(MemoryError::FreedCell {
        position: self.position,
      }),
    }
  }

  /// Increments the reference count, returning the new count.
  pub fn increase(&mut self) -> Result<usize, MemoryError> {
    match &mut self.slot {
      Slot::Used { refs, .. } => {
        *refs += 1;
        Ok(*refs)
      }
      Slot::Free { .. } => Err(MemoryError::FreedCell {
        position: self.position,
      }),
    }
  }

  /// Decrements the reference count, returning the new count.
  pub fn decrease(&mut self) -> Result<usize, MemoryError> {
    let position = self.position;
    match &mut self.slot {
      Slot::Used { refs: 0, .. } => {
        Err(MemoryError::ReferenceCountUnderflow { position })
      }
      Slot::Used { refs, .. } => {
        *refs -= 1;
        Ok(*refs)
      }
      Slot::Free { .. } => Err(MemoryError::FreedCell { position }),
    }
  }

  /// Turns this cell into a free cell linked to `next`, handing back the
  /// value it held.
  ///
  /// Returns `None` if the cell was already free, in which case it is left
  /// untouched.
  pub fn release(&mut self, next: Option<usize>) -> Option<Referenced> {
    if self.is_free() {
      return None;
    }
    match mem::replace(&mut self.slot, Slot::Free { next }) {
      Slot::Used { value, .. } => Some(value),
      Slot::Free { .. } => None,
    }
  }

  /// Fills a free cell with `value`, with no references to it yet.
  pub fn occupy(&mut self, value: Referenced) {
    self.slot = Slot::Used { value, refs: 0 };
  }
}

impl fmt::Debug for Cell {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.slot {
      Slot::Free { next: Some(next) } => {
        write!(f, "[{}] free -> {}", self.position, next)
      }
      Slot::Free { next: None } => write!(f, "[{}] free", self.position),
      Slot::Used { value, refs } => {
        write!(f, "[{}] refs<{}> = {:?}", self.position, refs, value)
      }
    }
  }
}

impl Recycle for Cell {
  fn recycle(&mut self) {
    self.position = 0;
    self.slot = Slot::Free { next: None };
  }
}

impl Pool<Cell> {
  /// Returns a cell at `position` holding `value`, with a reference count of
  /// zero.
  pub fn acquire(&mut self, position: usize, value: Referenced) -> Box<Cell> {
    self.with_slot(position, Slot::Used { value, refs: 0 })
  }

  /// Copies `cell` into a pooled box, so that it can be owned by a newer
  /// generation.
  ///
  /// The copy is shallow: references held by the value are copied as
  /// positions and keep pointing at the same cells.
  pub fn shift(&mut self, cell: &Cell) -> Box<Cell> {
    self.with_slot(cell.position, cell.slot.clone())
  }

  fn with_slot(&mut self, position: usize, slot: Slot) -> Box<Cell> {
    match self.take() {
      Some(mut cell) => {
        cell.position = position;
        cell.slot = slot;
        cell
      }
      None => Box::new(Cell { position, slot }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::Value;

  #[test]
  fn acquired_cells_start_unreferenced() {
    let mut pool = Pool::<Cell>::new(4);
    let cell = pool.acquire(3, Referenced::List(vec![Value::Int(1)]));
    assert_eq!(cell.position(), 3);
    assert_eq!(cell.refs(), 0);
    assert!(!cell.is_free());
  }

  #[test]
  fn reference_counts() {
    let mut pool = Pool::<Cell>::new(4);
    let mut cell = pool.acquire(0, Referenced::List(vec![]));
    assert_eq!(cell.increase(), Ok(1));
    assert_eq!(cell.increase(), Ok(2));
    assert_eq!(cell.decrease(), Ok(1));
    assert_eq!(cell.decrease(), Ok(0));
    assert_eq!(
      cell.decrease(),
      Err(MemoryError::ReferenceCountUnderflow { position: 0 })
    );
  }

  #[test]
  fn released_cells_reject_access() {
    let mut pool = Pool::<Cell>::new(4);
    let mut cell = pool.acquire(5, Referenced::List(vec![]));
    assert_eq!(cell.release(Some(2)), Some(Referenced::List(vec![])));
    assert!(cell.is_free());
    assert_eq!(cell.next_free(), Some(Some(2)));
    assert_eq!(cell.release(None), None);
    assert_eq!(cell.increase(), Err(MemoryError::FreedCell { position: 5 }));
    assert!(cell.value().is_err());
  }

  #[test]
  fn pooled_cells_are_reused() {
    let mut pool = Pool::<Cell>::new(4);
    let cell = pool.acquire(9, Referenced::List(vec![Value::Int(1)]));
    pool.release(cell);
    assert_eq!(pool.len(), 1);

    let cell = pool.acquire(1, Referenced::List(vec![]));
    assert_eq!(pool.len(), 0);
    assert_eq!(cell.position(), 1);
    assert_eq!(cell.value(), Ok(&Referenced::List(vec![])));
  }

  #[test]
  fn shift_is_a_value_copy() {
    let mut pool = Pool::<Cell>::new(4);
    let mut cell = pool.acquire(2, Referenced::List(vec![Value::Int(7)]));
    cell.increase().unwrap();

    let mut copy = pool.shift(&cell);
    assert_eq!(*copy, *cell);

    copy.value_mut().unwrap().as_list_mut().unwrap().push(Value::Nil);
    assert_ne!(*copy, *cell);
  }
}
