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

//! Tuning parameters for the memory engine and the analyzer.
//!
//! None of these affect what a pattern matches; they only trade memory for
//! time.
//!
//! ```
//! use retrace::config::{Config, MemoryConfig};
//!
//! let config = Config {
//!   memory: MemoryConfig {
//!     initial_gc_threshold: 64,
//!     ..Default::default()
//!   },
//!   ..Default::default()
//! };
//! assert_eq!(config.memory.promotion_distance, 5);
//! ```

use std::time::Duration;

/// All of the knobs, grouped by the component that reads them.
#[derive(Clone, Debug, Default)]
pub struct Config {
  pub memory: MemoryConfig,
  pub analyzer: AnalyzerConfig,
}

/// Configuration for the generation chain and its garbage collector.
#[derive(Clone, Debug)]
pub struct MemoryConfig {
  /// Heap size, in cells, at which the first tracing sweep is requested.
  ///
  /// Default: 4096
  pub initial_gc_threshold: usize,

  /// Factor the sweep threshold is multiplied by when a sweep leaves less
  /// than `minimum_free_space` percent of the heap free.
  ///
  /// Default: 2.0
  pub threshold_growth: f64,

  /// Percentage of free cells under which an unforced sweep actually runs.
  ///
  /// Default: 20.0
  pub minimum_free_space: f64,

  /// Number of generations a read may walk back before the cell it finds is
  /// copied into the current generation.
  ///
  /// Default: 5
  pub promotion_distance: usize,

  /// Number of recycled cells, and separately of recycled stack levels, kept
  /// around for reuse.
  ///
  /// Default: 50
  pub max_pool_size: usize,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    MemoryConfig {
      initial_gc_threshold: 4096,
      threshold_growth: 2.0,
      minimum_free_space: 20.0,
      promotion_distance: 5,
      max_pool_size: 50,
    }
  }
}

/// Configuration for the execution loop.
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
  /// Wall-clock time a single `run` or `resume` may take before pausing.
  ///
  /// Default: 20 seconds
  pub timeout: Duration,

  /// Number of steps a single `run` or `resume` may take before pausing.
  ///
  /// Default: unlimited
  pub max_ticks: Option<u64>,

  /// Number of steps between two trace-level statistics lines.
  ///
  /// Default: 100000
  pub stats_interval: u64,
}

impl Default for AnalyzerConfig {
  fn default() -> Self {
    AnalyzerConfig {
      timeout: Duration::from_secs(20),
      max_ticks: None,
      stats_interval: 100_000,
    }
  }
}
