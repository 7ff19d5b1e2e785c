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

//! Invariant violations raised by the memory engine.

use thiserror::Error;

/// A `MemoryError` is a broken invariant of the generation chain.
///
/// None of these are recoverable: they mean that whoever drove the memory
/// engine (usually a compiled node) did its bookkeeping wrong.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MemoryError {
  /// A cell outside of the current heap was accessed.
  #[error("segmentation fault: cell {position} is outside of the heap")]
  SegmentationFault { position: usize },

  /// A freed cell was read or had its reference count changed.
  #[error("cell {position} has already been freed")]
  FreedCell { position: usize },

  /// A free cell was freed again outside of a sweep.
  #[error("double free of cell {position}")]
  DoubleFree { position: usize },

  /// A cell that is still referenced was explicitly freed.
  #[error("cell {position} is still referenced {refs} time(s)")]
  ReferencedCellFreed { position: usize, refs: usize },

  /// A reference count was decreased below zero.
  #[error("reference count underflow in cell {position}")]
  ReferenceCountUnderflow { position: usize },

  /// A stack binding was expected but does not exist.
  #[error("no element called '{name}' in the stack")]
  StackNameNotFound { name: String },

  /// A specific checkpoint was restored after it had been discarded.
  #[error("nothing to roll back to")]
  NothingToRollbackTo,

  /// The chain was collapsed into a generation that is no longer part of it.
  #[error("checkpoint refers to a generation that is no longer in the chain")]
  StaleCheckpoint,
}
