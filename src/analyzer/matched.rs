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

//! Owned match trees.

use std::fmt;

use crate::analyzer::Fatal;
use crate::analyzer::Reader;
use crate::memory::Memory;
use crate::memory::Reference;
use crate::nodes::NodeId;

/// A successful match, or one of its named captures.
///
/// This is a copy of the match tree that lives in the analyzer's heap, so it
/// outlives the run that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
  pub name: String,
  pub from: usize,
  pub to: usize,
  pub text: String,
  pub children: Vec<Match>,
}

impl Match {
  /// Copies the match tree rooted at `node` out of `memory`.
  ///
  /// Captures that never finished are left out. `owner` is blamed if the
  /// tree turns out not to be made of match nodes.
  pub(crate) fn extract(
    memory: &Memory,
    text: &Reader,
    node: Reference,
    owner: NodeId,
  ) -> Result<Option<Match>, Fatal> {
    let node = match memory.peek(node)?.as_node() {
      Some(node) => node,
      None => {
        return Err(Fatal::bookkeeping(owner, "match tree holds a non-node"))
      }
    };
    let to = match node.to {
      Some(to) => to,
      None => return Ok(None),
    };

    let mut children = Vec::with_capacity(node.children.len());
    for &child in &node.children {
      if let Some(child) = Match::extract(memory, text, child, owner)? {
        children.push(child);
      }
    }
    Ok(Some(Match {
      name: node.name.to_string(),
      from: node.from,
      to,
      text: text.slice(node.from, to),
      children,
    }))
  }

  /// Looks up the first capture called `name`, depth first.
  pub fn find(&self, name: &str) -> Option<&Match> {
    self.children.iter().find_map(|c| {
      if c.name == name {
        Some(c)
      } else {
        c.find(name)
      }
    })
  }

  fn fmt_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
    writeln!(
      f,
      "{:indent$}{} {}..{} {:?}",
      "",
      self.name,
      self.from,
      self.to,
      self.text,
      indent = depth * 2
    )?;
    for child in &self.children {
      child.fmt_indented(f, depth + 1)?;
    }
    Ok(())
  }
}

impl fmt::Display for Match {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    self.fmt_indented(f, 0)
  }
}
