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

//! Stack levels.

use crate::memory::pool::Pool;
use crate::memory::pool::Recycle;
use crate::memory::Value;

/// One scope layer of the stack.
///
/// A level never holds the same name twice; shadowing is done by opening a
/// new level on top. Bindings keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackLevel {
  index: usize,
  bindings: Vec<(String, Value)>,
}

impl StackLevel {
  /// Returns this level's index, counting from the bottom of the stack.
  pub fn index(&self) -> usize {
    self.index
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.bindings.iter().find(|(n, _)| n == name).map(|(_, v)| v)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.get(name).is_some()
  }

  /// Adds a new binding. The name must not already be bound in this level.
  pub fn insert(&mut self, name: String, value: Value) {
    debug_assert!(!self.contains(&name));
    self.bindings.push((name, value));
  }

  /// Overwrites an existing binding, returning the old value.
  pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
    self
      .bindings
      .iter_mut()
      .find(|(n, _)| n == name)
      .map(|(_, v)| std::mem::replace(v, value))
  }

  pub fn remove(&mut self, name: &str) -> Option<Value> {
    let idx = self.bindings.iter().position(|(n, _)| n == name)?;
    Some(self.bindings.remove(idx).1)
  }

  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.bindings.iter().map(|(n, v)| (n.as_str(), v))
  }
}

impl Recycle for StackLevel {
  fn recycle(&mut self) {
    self.index = 0;
    self.bindings.clear();
  }
}

impl Pool<StackLevel> {
  /// Returns an empty level with the given index.
  pub fn acquire(&mut self, index: usize) -> Box<StackLevel> {
    match self.take() {
      Some(mut level) => {
        level.index = index;
        level
      }
      None => Box::new(StackLevel {
        index,
        bindings: Vec::new(),
      }),
    }
  }

  /// Copies `level` so that a newer generation can mutate it.
  pub fn shift(&mut self, level: &StackLevel) -> Box<StackLevel> {
    let mut copy = self.acquire(level.index);
    copy.bindings.extend(level.bindings.iter().cloned());
    copy
  }
}
