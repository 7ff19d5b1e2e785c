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

//! Values that live in the stack and in heap cells.
//!
//! There are two families:
//! - [`Value`]s are primitives. They are stored by value in stack bindings and
//!   inside of referenced payloads. The only primitive that points somewhere
//!   else is [`Value::Ref`].
//! - [`Referenced`] payloads are what heap cells hold. They are only ever
//!   reached through a [`Reference`].
//!
//! Copying a payload is always shallow: nested references are copied as
//! positions, so the cells they point to stay shared until they are written.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::memory::Checkpoint;

/// An opaque handle to a heap cell.
///
/// A `Reference` is just a position; it is only meaningful relative to the
/// current generation of the chain it was allocated in.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference(usize);

impl Reference {
  /// Creates a reference to the cell at `position`.
  pub fn new(position: usize) -> Self {
    Reference(position)
  }

  /// Returns the position of the cell this reference points to.
  pub fn position(self) -> usize {
    self.0
  }
}

impl fmt::Debug for Reference {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Ref(#{})", self.0)
  }
}

/// A primitive value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Nil,
  Bool(bool),
  Int(i64),
  Str(Arc<str>),
  /// A position in the input text.
  Cursor(usize),
  /// A rollback point, kept around so that a construct can later collapse
  /// the chain back to it.
  Checkpoint(Checkpoint),
  Ref(Reference),
}

impl Value {
  /// Returns the reference held by this value, if any.
  pub fn reference(&self) -> Option<Reference> {
    match self {
      Value::Ref(r) => Some(*r),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_cursor(&self) -> Option<usize> {
    match self {
      Value::Cursor(c) => Some(*c),
      _ => None,
    }
  }

  pub fn as_checkpoint(&self) -> Option<Checkpoint> {
    match self {
      Value::Checkpoint(c) => Some(*c),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(&**s),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Int(i)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.into())
  }
}

impl From<Reference> for Value {
  fn from(r: Reference) -> Self {
    Value::Ref(r)
  }
}

impl From<Checkpoint> for Value {
  fn from(c: Checkpoint) -> Self {
    Value::Checkpoint(c)
  }
}

/// A string-keyed bag of values.
///
/// Keys are kept sorted so that iteration, and therefore tracing, is
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Object {
  props: BTreeMap<String, Value>,
}

impl Object {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.props.get(name)
  }

  /// Sets `name` to `value`, returning the old value, if any.
  pub fn set(
    &mut self,
    name: impl Into<String>,
    value: Value,
  ) -> Option<Value> {
    self.props.insert(name.into(), value)
  }

  pub fn remove(&mut self, name: &str) -> Option<Value> {
    self.props.remove(name)
  }

  pub fn len(&self) -> usize {
    self.props.len()
  }

  pub fn is_empty(&self) -> bool {
    self.props.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.props.iter().map(|(k, v)| (k.as_str(), v))
  }
}

/// A node of the match tree built by captures.
///
/// Nodes point at their parent and their parent points back at them through
/// `children`, so a match tree is a reference cycle by construction.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchNode {
  pub name: Arc<str>,
  pub parent: Option<Reference>,
  pub children: Vec<Reference>,
  pub from: usize,
  pub to: Option<usize>,
}

impl MatchNode {
  pub fn new(name: &str, parent: Option<Reference>, from: usize) -> Self {
    MatchNode {
      name: name.into(),
      parent,
      children: Vec::new(),
      from,
      to: None,
    }
  }
}

/// A heap payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Referenced {
  Object(Object),
  List(Vec<Value>),
  Node(MatchNode),
}

impl Referenced {
  /// Returns every reference held directly by this payload.
  ///
  /// A reference appearing twice is yielded twice: it accounts for two
  /// reference counts.
  pub fn references(&self) -> Box<dyn Iterator<Item = Reference> + '_> {
    match self {
      Referenced::Object(o) => {
        Box::new(o.props.values().filter_map(Value::reference))
      }
      Referenced::List(l) => Box::new(l.iter().filter_map(Value::reference)),
      Referenced::Node(n) => {
        Box::new(n.parent.into_iter().chain(n.children.iter().copied()))
      }
    }
  }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Referenced::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn as_object_mut(&mut self) -> Option<&mut Object> {
    match self {
      Referenced::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Referenced::List(l) => Some(l.as_slice()),
      _ => None,
    }
  }

  pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
    match self {
      Referenced::List(l) => Some(l),
      _ => None,
    }
  }

  pub fn as_node(&self) -> Option<&MatchNode> {
    match self {
      Referenced::Node(n) => Some(n),
      _ => None,
    }
  }

  pub fn as_node_mut(&mut self) -> Option<&mut MatchNode> {
    match self {
      Referenced::Node(n) => Some(n),
      _ => None,
    }
  }
}

impl From<Object> for Referenced {
  fn from(o: Object) -> Self {
    Referenced::Object(o)
  }
}

impl From<Vec<Value>> for Referenced {
  fn from(l: Vec<Value>) -> Self {
    Referenced::List(l)
  }
}

impl From<MatchNode> for Referenced {
  fn from(n: MatchNode) -> Self {
    Referenced::Node(n)
  }
}
