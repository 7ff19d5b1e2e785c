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

//! Bounded free pools for cells and stack levels.
//!
//! Generations are created and thrown away at a very high rate while
//! backtracking, and each of them owns a handful of boxed cells and levels.
//! Pools keep the boxes around so that most of that churn never reaches the
//! allocator.

use crate::memory::cell::Cell;
use crate::memory::stack::StackLevel;

/// Something that can be wiped clean and handed out again.
pub trait Recycle {
  /// Resets `self` to a blank state, dropping any payload it holds.
  fn recycle(&mut self);
}

/// A bounded pool of boxed, recyclable items.
#[derive(Debug)]
pub struct Pool<T> {
  items: Vec<Box<T>>,
  capacity: usize,
}

impl<T: Recycle> Pool<T> {
  /// Creates an empty pool that keeps at most `capacity` items.
  pub fn new(capacity: usize) -> Self {
    Pool {
      items: Vec::with_capacity(capacity),
      capacity,
    }
  }

  /// Takes a recycled item out of the pool, if there is one.
  pub fn take(&mut self) -> Option<Box<T>> {
    self.items.pop()
  }

  /// Returns `item` to the pool. Items over capacity are simply dropped.
  ///
  /// The pool does not look inside `item`: whoever releases a cell is
  /// responsible for having already dealt with the references it held.
  pub fn release(&mut self, mut item: Box<T>) {
    if self.items.len() < self.capacity {
      item.recycle();
      self.items.push(item);
    }
  }

  /// Returns the number of pooled items.
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// The pools shared by every generation of a chain.
#[derive(Debug)]
pub struct Pools {
  pub cells: Pool<Cell>,
  pub levels: Pool<StackLevel>,
}

impl Pools {
  pub fn new(capacity: usize) -> Self {
    Pools {
      cells: Pool::new(capacity),
      levels: Pool::new(capacity),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Scratch(Vec<u32>);

  impl Recycle for Scratch {
    fn recycle(&mut self) {
      self.0.clear();
    }
  }

  #[test]
  fn released_items_come_back_clean() {
    let mut pool = Pool::new(2);
    pool.release(Box::new(Scratch(vec![1, 2, 3])));
    assert_eq!(pool.len(), 1);

    let item = pool.take().unwrap();
    assert!(item.0.is_empty());
    assert!(pool.take().is_none());
  }

  #[test]
  fn pool_is_bounded() {
    let mut pool = Pool::new(2);
    for _ in 0..5 {
      pool.release(Box::new(Scratch::default()));
    }
    assert_eq!(pool.len(), 2);
  }
}
