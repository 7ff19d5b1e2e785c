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

//! Compiled nodes, and the programs made out of them.
//!
//! A compiled node is a small state machine. The analyzer calls
//! [`CompiledNode::resume()`] with a signal: [`SIGNAL_START`] when the node is
//! entered, or whatever signal the node chose for "one of my children just
//! finished" or "execution rolled back to a point I froze". The node then
//! tells the analyzer where to go next, by entering a child, finishing
//! (returning to its parent), or backtracking.
//!
//! Nodes keep no state of their own: anything they need to remember between
//! two signals is stored in the analyzer's memory, under a well-known stack
//! name, so that it is rolled back along with everything else.

use std::fmt;

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::memory::Reference;
use crate::memory::Value;

mod compile;
mod group;
mod lookaround;
mod quantifier;
mod root;
mod text;

pub use compile::compile;
pub use compile::compile_source;
pub use group::Alternation;
pub use group::Capture;
pub use group::Sequence;
pub use lookaround::Atomic;
pub use lookaround::Lookahead;
pub use quantifier::Quantifier;
pub use root::Root;
pub use text::Anchor;
pub use text::Any;
pub use text::Class;
pub use text::Text;

/// A step number within a compiled node's state machine.
pub type Signal = u32;

/// The signal a node is entered with.
pub const SIGNAL_START: Signal = 0;

/// The index of a node within a [`Program`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
  pub fn new(index: u32) -> Self {
    NodeId(index)
  }

  pub fn index(self) -> usize {
    self.0 as usize
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A node of a compiled program.
pub trait CompiledNode: fmt::Debug + Send + Sync {
  /// Advances this node's state machine.
  ///
  /// `id` is this node's own id, since nodes do not know where they live.
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    signal: Signal,
  ) -> Result<(), Fatal>;
}

/// Where control goes when a node finishes: a parent, and the signal it is
/// resumed with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
  pub node: NodeId,
  pub signal: Signal,
}

#[derive(Debug)]
struct Slot {
  node: Box<dyn CompiledNode>,
  parent: Option<ParentLink>,
}

/// An immutable arena of compiled nodes.
#[derive(Debug)]
pub struct Program {
  nodes: Vec<Slot>,
  root: NodeId,
}

impl Program {
  /// Returns the node execution starts from.
  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn get(&self, id: NodeId) -> Option<&dyn CompiledNode> {
    self.nodes.get(id.index()).map(|slot| &*slot.node)
  }

  /// Returns where control goes after `id` finishes; `None` means that the
  /// whole program has matched.
  pub fn parent(&self, id: NodeId) -> Option<ParentLink> {
    self.nodes.get(id.index()).and_then(|slot| slot.parent)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Builds a [`Program`] bottom-up: children are added before their parent.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
  nodes: Vec<Slot>,
}

impl ProgramBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `node`, linking each of `children` to it with the given signal.
  pub fn add(
    &mut self,
    node: impl CompiledNode + 'static,
    children: &[(NodeId, Signal)],
  ) -> NodeId {
    let id = NodeId(self.nodes.len() as u32);
    for &(child, signal) in children {
      match self.nodes.get_mut(child.index()) {
        Some(slot) if slot.parent.is_none() => {
          slot.parent = Some(ParentLink { node: id, signal })
        }
        Some(_) => bug!("node {} was given two parents", child),
        None => bug!("node {} was linked before being added", child),
      }
    }
    self.nodes.push(Slot {
      node: Box::new(node),
      parent: None,
    });
    id
  }

  /// Finishes the program, starting execution at `root`.
  pub fn finish(self, root: NodeId) -> Program {
    Program {
      nodes: self.nodes,
      root,
    }
  }
}

/// Reads a list stored in the heap under the stack name `name`, as used by
/// nodes that keep a small frame of hidden state.
pub(crate) fn read_frame(
  analyzer: &mut Analyzer<'_>,
  id: NodeId,
  name: &str,
) -> Result<(Reference, Vec<Value>), Fatal> {
  let reference = match analyzer.memory().get(name)?.reference() {
    Some(r) => r,
    None => {
      return Err(Fatal::bookkeeping(id, format!("{} is not a frame", name)))
    }
  };
  match analyzer.memory_mut().deref(reference)?.as_list() {
    Some(list) => Ok((reference, list.to_vec())),
    None => Err(Fatal::bookkeeping(id, format!("{} is not a list", name))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug)]
  struct Nop;

  impl CompiledNode for Nop {
    fn resume(
      &self,
      id: NodeId,
      analyzer: &mut Analyzer<'_>,
      _: Signal,
    ) -> Result<(), Fatal> {
      analyzer.finish(id);
      Ok(())
    }
  }

  #[test]
  fn builder_links_parents() {
    let mut b = ProgramBuilder::new();
    let a = b.add(Nop, &[]);
    let c = b.add(Nop, &[]);
    let parent = b.add(Nop, &[(a, 1), (c, 2)]);
    let program = b.finish(parent);

    assert_eq!(program.len(), 3);
    assert_eq!(program.root(), parent);
    assert_eq!(
      program.parent(c),
      Some(ParentLink {
        node: parent,
        signal: 2
      })
    );
    assert_eq!(program.parent(parent), None);
    assert!(program.get(NodeId::new(3)).is_none());
  }

  #[test]
  #[should_panic]
  fn builder_rejects_two_parents() {
    let mut b = ProgramBuilder::new();
    let a = b.add(Nop, &[]);
    b.add(Nop, &[(a, 1)]);
    b.add(Nop, &[(a, 1)]);
  }
}
