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


//! A backtracking pattern matcher, built on a generational memory that can
//! freeze, roll back, and collapse its state in constant time per cell.
//!
//! Patterns are parsed by [`syn`], lowered into a [`nodes::Program`], and run
//! by an [`analyzer::Analyzer`] on top of [`memory::Memory`].

/// Reports an internal inconsistency and panics.
///
/// Only for states that the crate's own invariants rule out; anything a
/// caller can cause is reported through a `Result` instead.
macro_rules! bug {
  ($($tt:tt)*) => {{
    eprintln!("error: internal matcher error; this is a bug\nerror: ");
    eprintln!($($tt)*);
    panic!()
  }}
}

pub mod analyzer;
pub mod config;
pub mod exec;
pub mod memory;
pub mod nodes;
pub mod syn;
