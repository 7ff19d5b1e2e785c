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

//! Errors that abort a run.

use thiserror::Error;

use crate::memory::MemoryError;
use crate::nodes::NodeId;
use crate::nodes::Signal;

/// A `Fatal` error ends a run for good.
///
/// Failing to match is not an error, and neither is running out of time;
/// see [`super::Outcome`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Fatal {
  #[error(transparent)]
  Memory(#[from] MemoryError),

  /// Control was handed to a node that is not part of the program.
  #[error("unknown compiled node {0}")]
  UnknownNode(NodeId),

  #[error("the analyzer is not paused")]
  NotPaused,

  /// A new run was started over a paused one.
  #[error("the analyzer is paused; resume it or free its resources first")]
  AlreadyRunning,

  /// A node found its hidden state in an unexpected shape.
  #[error("node {node}: {message}")]
  Bookkeeping { node: NodeId, message: String },
}

impl Fatal {
  pub fn bookkeeping(node: NodeId, message: impl Into<String>) -> Self {
    Fatal::Bookkeeping {
      node,
      message: message.into(),
    }
  }

  pub(crate) fn unexpected_signal(node: NodeId, signal: Signal) -> Self {
    Fatal::bookkeeping(node, format!("unexpected signal {}", signal))
  }
}
