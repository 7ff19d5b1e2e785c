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

//! Execution environment for matching one pattern against many files at
//! once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use chashmap::CHashMap;

use thread_local::ThreadLocal;

use crate::analyzer::Analyzer;
use crate::analyzer::Match;
use crate::analyzer::Outcome;
use crate::config::Config;
use crate::exec::fs::FileSys;
use crate::memory::MemoryStats;
use crate::nodes::Program;

/// What matching a single file produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
  pub outcome: Outcome,
  /// The match tree, if the file matched.
  pub matched: Option<Match>,
  pub ticks: u64,
  /// Memory usage when the run ended.
  pub stats: MemoryStats,
}

/// A parallel executor, which matches a single program against a large set
/// of files simultaneously.
///
/// Every worker thread keeps its own [`Analyzer`], reused from one file to
/// the next.
pub struct Executor<'i, Fs> {
  // `None` while a file is being matched, or if matching it failed.
  reports: CHashMap<&'i Path, Option<Report>>,
  fs: &'i Fs,
  program: &'i Program,
  analyzers: ThreadLocal<RefCell<Analyzer<'i>>>,
  config: Config,
  log_output: Mutex<Box<dyn io::Write + Send + 'i>>,
  errors: AtomicUsize,
}

impl<'i, Fs> Executor<'i, Fs>
where
  Fs: FileSys,
{
  /// Constructs a new `Executor`, using the given file system, program, and
  /// log sink.
  pub fn new(
    fs: &'i Fs,
    program: &'i Program,
    config: Config,
    log_output: impl io::Write + Send + 'i,
  ) -> Self {
    Executor {
      reports: CHashMap::new(),
      fs,
      program,
      analyzers: ThreadLocal::new(),
      config,
      log_output: Mutex::new(Box::new(log_output)),
      errors: AtomicUsize::new(0),
    }
  }

  /// Matches the given set of files with the given level of parallelism.
  ///
  /// Returns the number of failures if any file could not be read, or
  /// aborted its run.
  pub fn exec_files(
    &self,
    file_names: impl IntoIterator<Item = &'i Path>,
    parallelism: usize,
  ) -> Result<HashMap<&'i Path, Report>, usize> {
    let file_names = file_names.into_iter().collect::<Vec<_>>();
    let next_work_item = AtomicUsize::new(0);
    let scope = crossbeam::scope(|s| {
      for i in 0..parallelism.max(1) {
        let spawned = s
          .builder()
          .name(format!("retrace-matcher-{}", i))
          .spawn(|_| loop {
            let idx = next_work_item.fetch_add(1, Ordering::SeqCst);
            match file_names.get(idx) {
              Some(&file_name) => self.claim_and_match(file_name),
              None => return,
            }
          });
        if let Err(e) = spawned {
          self.fail(format_args!("cannot spawn matcher thread: {}", e));
        }
      }
    });
    if scope.is_err() {
      self.fail(format_args!("a matcher thread panicked"));
    }

    let errors = self.errors.load(Ordering::SeqCst);
    if errors > 0 {
      return Err(errors);
    }

    let mut reports = HashMap::new();
    for file_name in &file_names {
      if let Some(guard) = self.reports.get(file_name) {
        if let Some(report) = &*guard {
          reports.insert(*file_name, report.clone());
        }
      }
    }
    Ok(reports)
  }

  /// Matches `file_name`, unless some other worker already did.
  fn claim_and_match(&self, file_name: &'i Path) {
    let mut claimed = false;
    self.reports.upsert(
      file_name,
      || {
        claimed = true;
        None
      },
      |_| {},
    );
    if !claimed {
      return;
    }

    if let Some(report) = self.match_file(file_name) {
      self.reports.insert(file_name, Some(report));
    }
  }

  /// Actually runs the analyzer.
  fn match_file(&self, file_name: &'i Path) -> Option<Report> {
    self.log(format_args!("info: matching {}...", file_name.display()));

    let text = match self.fs.read_file(file_name) {
      Ok(s) => s,
      Err(e) => {
        self.fail(format_args!(
          "cannot read file {}: {}",
          file_name.display(),
          e
        ));
        return None;
      }
    };

    let analyzer = self.analyzers.get_or(|| {
      RefCell::new(Analyzer::new(self.program, self.config.clone()))
    });
    let mut analyzer = analyzer.borrow_mut();
    let report = analyzer.match_text(text).and_then(|outcome| {
      Ok(Report {
        outcome,
        matched: analyzer.result()?,
        ticks: analyzer.ticks(),
        stats: analyzer.memory().stats(),
      })
    });
    analyzer.free_resources();

    match report {
      Ok(report) => {
        self.log(format_args!(
          "info: finished {} in {} ticks",
          file_name.display(),
          report.ticks
        ));
        Some(report)
      }
      Err(e) => {
        self.fail(format_args!("{}: {}", file_name.display(), e));
        None
      }
    }
  }

  fn log(&self, line: fmt::Arguments) {
    if let Ok(mut out) = self.log_output.lock() {
      // Logging is best-effort.
      let _ = writeln!(out, "{}", line);
    }
  }

  fn fail(&self, line: fmt::Arguments) {
    self.errors.fetch_add(1, Ordering::SeqCst);
    self.log(format_args!("error: {}", line));
  }
}
