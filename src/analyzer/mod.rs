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

//! The execution core.
//!
//! An [`Analyzer`] runs a compiled [`Program`] over a piece of text as a
//! trampoline: at every step it hands the current signal to the current
//! node, and the node picks the next `(node, signal)` pair. Nothing recurses,
//! so the native stack stays flat no matter how deep the pattern is.
//!
//! Execution is either going forward, or going backward. Going backward
//! means rolling the memory back to the most recent checkpoint, and picking
//! up from the resume point stored there; once the chain is exhausted, the
//! run is over and nothing matched.
//!
//! A run may also be paused, when it exceeds its [`Budget`]. Pausing takes
//! no snapshot: the `(node, signal)` pair plus the current generation is
//! everything needed to carry on, which is what [`Analyzer::resume()`] does.

use std::time::Duration;
use std::time::Instant;

use crate::config::AnalyzerConfig;
use crate::config::Config;
use crate::memory::gc::Collector;
use crate::memory::Checkpoint;
use crate::memory::MatchNode;
use crate::memory::Memory;
use crate::memory::Object;
use crate::memory::Reference;
use crate::memory::ResumeDescriptor;
use crate::memory::Value;
use crate::nodes::NodeId;
use crate::nodes::Program;
use crate::nodes::Signal;
use crate::nodes::SIGNAL_START;

mod error;
mod matched;
mod reader;

pub use error::Fatal;
pub use matched::Match;
pub use reader::Reader;

/// The stack name of the global context object.
pub const GLOBAL: &str = "#global";

/// The stack name of the innermost open match node.
pub const CURRENT_NODE: &str = "#node";

/// The name of the match node a run starts with.
pub const ROOT_MATCH: &str = "root";

/// The direction execution is going in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Process {
  Forward,
  Backward,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
  Ready,
  Executing,
  Paused,
  Ended,
}

/// How a call to `run()` or `resume()` ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  Matched,
  /// The budget ran out; call `resume()` to carry on.
  Paused,
  NoMatch,
}

/// Limits on a single call to `run()` or `resume()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Budget {
  pub timeout: Duration,
  pub max_ticks: Option<u64>,
}

impl Budget {
  /// A budget that never runs out, in practice.
  pub fn unlimited() -> Self {
    Budget {
      timeout: Duration::from_secs(u64::MAX),
      max_ticks: None,
    }
  }

  pub fn ticks(max_ticks: u64) -> Self {
    Budget {
      max_ticks: Some(max_ticks),
      ..Budget::unlimited()
    }
  }

  fn is_exhausted(&self, start: Instant, ticks: u64) -> bool {
    if self.max_ticks.map_or(false, |max| ticks >= max) {
      return true;
    }
    start.elapsed() >= self.timeout
  }
}

impl From<&AnalyzerConfig> for Budget {
  fn from(config: &AnalyzerConfig) -> Self {
    Budget {
      timeout: config.timeout,
      max_ticks: config.max_ticks,
    }
  }
}

/// The execution loop, and all of the state of a run.
#[derive(Debug)]
pub struct Analyzer<'p> {
  program: &'p Program,
  memory: Memory,
  collector: Collector,
  config: AnalyzerConfig,
  text: Reader,

  node: Option<NodeId>,
  signal: Signal,
  process: Process,
  status: Status,
  outcome: Option<Outcome>,
  ticks: u64,
}

impl<'p> Analyzer<'p> {
  pub fn new(program: &'p Program, config: Config) -> Self {
    let memory = Memory::new(config.memory);
    let collector = Collector::new(&memory);
    Analyzer {
      program,
      memory,
      collector,
      config: config.analyzer,
      text: Reader::default(),
      node: None,
      signal: SIGNAL_START,
      process: Process::Forward,
      status: Status::Ready,
      outcome: None,
      ticks: 0,
    }
  }

  /// Matches the program against `text`, within the configured budget.
  pub fn match_text(&mut self, text: &str) -> Result<Outcome, Fatal> {
    let budget = Budget::from(&self.config);
    self.run(self.program.root(), text, budget)
  }

  /// Starts a new run at `entry`.
  ///
  /// Whatever a previous run left in memory is thrown away first.
  pub fn run(
    &mut self,
    entry: NodeId,
    text: &str,
    budget: Budget,
  ) -> Result<Outcome, Fatal> {
    if self.status == Status::Paused {
      return Err(Fatal::AlreadyRunning);
    }
    if self.program.get(entry).is_none() {
      return Err(Fatal::UnknownNode(entry));
    }

    self.memory.clear();
    self.text = Reader::new(text);
    self.ticks = 0;
    self.outcome = None;

    let root = self.memory.alloc(MatchNode::new(ROOT_MATCH, None, 0).into())?;
    let mut global = Object::new();
    global.set(ROOT_MATCH, Value::Ref(root));
    let global = self.memory.alloc(global.into())?;
    self.memory.push(GLOBAL, Value::Ref(global))?;
    self.memory.push(CURRENT_NODE, Value::Ref(root))?;

    log::trace!("run: {} chars from node {}", self.text.len(), entry);
    self.goto(entry, SIGNAL_START);
    self.process = Process::Forward;
    self.execute(budget)
  }

  /// Continues a paused run.
  pub fn resume(&mut self, budget: Budget) -> Result<Outcome, Fatal> {
    if self.status != Status::Paused {
      return Err(Fatal::NotPaused);
    }
    self.execute(budget)
  }

  fn execute(&mut self, budget: Budget) -> Result<Outcome, Fatal> {
    self.status = Status::Executing;
    let result = self.trampoline(budget);
    self.status = match result {
      Ok(Outcome::Paused) => Status::Paused,
      _ => Status::Ended,
    };
    match &result {
      Ok(outcome) => self.outcome = Some(*outcome),
      Err(e) => log::debug!("run aborted after {} ticks: {}", self.ticks, e),
    }
    result
  }

  fn trampoline(&mut self, budget: Budget) -> Result<Outcome, Fatal> {
    let program = self.program;
    let start = Instant::now();
    let mut steps = 0;
    loop {
      if self.process == Process::Forward && self.node.is_none() {
        return Ok(Outcome::Matched);
      }
      if budget.is_exhausted(start, steps) {
        log::debug!("paused after {} ticks", self.ticks);
        return Ok(Outcome::Paused);
      }

      match self.process {
        Process::Forward => {
          let node = match self.node {
            Some(node) => node,
            None => bug!("forward step without a node"),
          };
          let compiled = program.get(node).ok_or(Fatal::UnknownNode(node))?;
          let signal = self.signal;
          compiled.resume(node, self, signal)?;

          // Sweeps only ever run between two forward steps.
          if self.process == Process::Forward {
            self.collector.poll(&mut self.memory)?;
          }
        }
        Process::Backward => match self.memory.rollback() {
          Some(resume) => {
            self.goto(resume.node, resume.signal);
            self.text.restore_cursor(resume.cursor);
            self.process = Process::Forward;
          }
          None => return Ok(Outcome::NoMatch),
        },
      }

      steps += 1;
      self.ticks += 1;
      if self.config.stats_interval > 0
        && self.ticks % self.config.stats_interval == 0
      {
        self.log_stats();
      }
    }
  }

  fn log_stats(&self) {
    let stats = self.memory.stats();
    log::trace!(
      "tick {}: cursor {}/{}, heap {} ({} free), chain {}",
      self.ticks,
      self.text.cursor(),
      self.text.len(),
      stats.heap_size,
      stats.free_cells,
      stats.chain_len,
    );
  }

  /// Returns the match tree of a run that ended with a match.
  pub fn result(&self) -> Result<Option<Match>, Fatal> {
    if self.status != Status::Ended || self.outcome != Some(Outcome::Matched) {
      return Ok(None);
    }
    let root = self.root_match(self.program.root())?;
    Match::extract(&self.memory, &self.text, root, self.program.root())
  }

  /// Destroys everything the last run left behind.
  pub fn free_resources(&mut self) {
    self.memory.clear();
    self.node = None;
    self.signal = SIGNAL_START;
    self.process = Process::Forward;
    self.status = Status::Ready;
    self.outcome = None;
  }

  pub fn status(&self) -> Status {
    self.status
  }

  pub fn outcome(&self) -> Option<Outcome> {
    self.outcome
  }

  pub fn process(&self) -> Process {
    self.process
  }

  /// Returns the number of steps taken since the run started, including
  /// rollbacks.
  pub fn ticks(&self) -> u64 {
    self.ticks
  }

  pub fn program(&self) -> &'p Program {
    self.program
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  pub fn collector(&self) -> &Collector {
    &self.collector
  }

  pub fn text(&self) -> &Reader {
    &self.text
  }

  pub fn text_mut(&mut self) -> &mut Reader {
    &mut self.text
  }

  /// Continues at `node` with `signal`.
  pub fn goto(&mut self, node: NodeId, signal: Signal) {
    self.node = Some(node);
    self.signal = signal;
  }

  pub fn enter(&mut self, child: NodeId) {
    self.goto(child, SIGNAL_START);
  }

  /// Returns control from `id` to its parent. Finishing the outermost node
  /// ends the run with a match.
  pub fn finish(&mut self, id: NodeId) {
    match self.program.parent(id) {
      Some(link) => self.goto(link.node, link.signal),
      None => self.node = None,
    }
  }

  /// Starts a new generation; rolling back to it resumes `node` with
  /// `signal`, at the current cursor.
  pub fn freeze(&mut self, node: NodeId, signal: Signal) -> Checkpoint {
    let cursor = self.text.cursor();
    self.memory.freeze(ResumeDescriptor {
      node,
      signal,
      cursor,
    })
  }

  /// Gives up on the current path.
  pub fn backtrack(&mut self) {
    self.process = Process::Backward;
  }

  /// Returns the root match node, as recorded in the global context.
  pub fn root_match(&self, owner: NodeId) -> Result<Reference, Fatal> {
    let global = match self.memory.get(GLOBAL)?.reference() {
      Some(r) => r,
      None => return Err(Fatal::bookkeeping(owner, "no global context")),
    };
    self
      .memory
      .peek(global)?
      .as_object()
      .and_then(|o| o.get(ROOT_MATCH))
      .and_then(Value::reference)
      .ok_or_else(|| Fatal::bookkeeping(owner, "no root match node"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::MemoryConfig;
  use crate::nodes::compile_source;
  use proptest::prelude::*;

  fn program(pattern: &str) -> Program {
    compile_source(pattern, true).unwrap()
  }

  fn find(pattern: &str, text: &str) -> Option<Match> {
    let program = program(pattern);
    let mut analyzer = Analyzer::new(&program, Config::default());
    analyzer.run(program.root(), text, Budget::unlimited()).unwrap();
    analyzer.result().unwrap()
  }

  fn span(pattern: &str, text: &str) -> Option<(usize, usize)> {
    find(pattern, text).map(|m| (m.from, m.to))
  }

  #[test]
  fn literals_and_search() {
    assert_eq!(span("abc", "xxabcxx"), Some((2, 5)));
    assert_eq!(span("abc", "ab"), None);
    assert_eq!(span("", "xyz"), Some((0, 0)));
    assert_eq!(span("^b", "ab"), None);
    assert_eq!(span("b$", "abb"), Some((2, 3)));
  }

  #[test]
  fn alternation_backtracks() {
    assert_eq!(span("ab|ac", "ac"), Some((0, 2)));
    assert_eq!(span("(a|ab)c", "abc"), Some((0, 3)));
    assert_eq!(span("x(a|b|c)y", "xcy"), Some((0, 3)));
  }

  #[test]
  fn quantifiers() {
    assert_eq!(span("a*", "aaab"), Some((0, 3)));
    assert_eq!(span("a*?", "aaab"), Some((0, 0)));
    assert_eq!(span("a+?b", "aaab"), Some((0, 4)));
    assert_eq!(span("a{2,3}", "aaaa"), Some((0, 3)));
    assert_eq!(span("a{2}", "a"), None);
    assert_eq!(span("a.*c", "abcbc"), Some((0, 5)));
    assert_eq!(span("[0-9]+", "ab123c"), Some((2, 5)));
    assert_eq!(span("(a?)*b", "b"), Some((0, 1)));
  }

  #[test]
  fn atomic_groups_do_not_give_back() {
    assert_eq!(span("(?>a*)a", "aaa"), None);
    assert_eq!(span("(?>a*)b", "aab"), Some((0, 3)));
    assert_eq!(span("(?>ab|a)c", "ac"), Some((0, 2)));
  }

  #[test]
  fn lookaheads_consume_nothing() {
    assert_eq!(span("a(?=b)", "acab"), Some((2, 3)));
    assert_eq!(span("a(?!b)", "abac"), Some((2, 3)));
    assert_eq!(span("(?=x)", "abc"), None);
  }

  #[test]
  fn captures_build_a_tree() {
    let m = find(r"(?<key>\w+)=(?<value>(?<digit>\d)+)", "  k=42;").unwrap();
    assert_eq!((m.name.as_str(), m.from, m.to), ("root", 2, 6));
    let names = m.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["key", "value"]);
    assert_eq!(m.find("key").unwrap().text, "k");
    let value = m.find("value").unwrap();
    assert_eq!(value.text, "42");
    assert_eq!(value.children.len(), 2);
    assert_eq!(value.children[1].text, "2");
  }

  #[test]
  fn failed_captures_are_rolled_back() {
    let m = find("(?<a>x)y|(?<b>x)z", "xz").unwrap();
    assert_eq!(m.children.len(), 1);
    assert_eq!(m.children[0].name, "b");
  }

  #[test]
  fn pauses_and_resumes() {
    let program = program("(a|b)*c");
    let text = "ab".repeat(50) + "c";
    let mut analyzer = Analyzer::new(&program, Config::default());

    let mut outcome = analyzer
      .run(program.root(), &text, Budget::ticks(7))
      .unwrap();
    let mut pauses = 0;
    while outcome == Outcome::Paused {
      assert_eq!(analyzer.status(), Status::Paused);
      assert_eq!(
        analyzer.run(program.root(), "c", Budget::unlimited()),
        Err(Fatal::AlreadyRunning)
      );
      pauses += 1;
      outcome = analyzer.resume(Budget::ticks(7)).unwrap();
    }
    assert!(pauses > 10);
    assert_eq!(outcome, Outcome::Matched);
    assert_eq!(analyzer.status(), Status::Ended);
    assert_eq!(analyzer.resume(Budget::unlimited()), Err(Fatal::NotPaused));

    let m = analyzer.result().unwrap().unwrap();
    assert_eq!((m.from, m.to), (0, text.chars().count()));
  }

  #[test]
  fn no_match_ends_the_run() {
    let program = program("a+b");
    let mut analyzer = Analyzer::new(&program, Config::default());
    assert_eq!(analyzer.match_text("aaaa"), Ok(Outcome::NoMatch));
    assert_eq!(analyzer.status(), Status::Ended);
    assert_eq!(analyzer.result(), Ok(None));
    assert_eq!(analyzer.memory().chain_len(), 1);

    analyzer.free_resources();
    assert_eq!(analyzer.status(), Status::Ready);
    assert_eq!(analyzer.memory().stats().heap_size, 0);
  }

  #[test]
  fn unknown_entry_points_are_fatal() {
    let program = program("a");
    let mut analyzer = Analyzer::new(&program, Config::default());
    let entry = NodeId::new(program.len() as u32);
    assert_eq!(
      analyzer.run(entry, "a", Budget::unlimited()),
      Err(Fatal::UnknownNode(entry))
    );
  }

  #[test]
  fn sweeps_run_during_long_matches() {
    let program = program(r"((?<w>\w)\s?)*!");
    let config = Config {
      memory: MemoryConfig {
        initial_gc_threshold: 16,
        ..Default::default()
      },
      ..Default::default()
    };
    let text = "a b c d e f g h i j k l m n o p q r s t u v w x y z ".repeat(2);
    let mut analyzer = Analyzer::new(&program, config);
    assert_eq!(
      analyzer.run(program.root(), &text, Budget::unlimited()),
      Ok(Outcome::NoMatch)
    );
    assert!(analyzer.collector().sweeps() > 0);
  }

  proptest! {
    #[test]
    fn execution_is_deterministic(text in "[ab]{0,12}") {
      let program = program("(?<x>a|ab)(?<y>b*)(?=a)|(?>b+)a");
      let runs = (0..2)
        .map(|_| {
          let mut analyzer = Analyzer::new(&program, Config::default());
          let outcome = analyzer
            .run(program.root(), &text, Budget::unlimited())
            .unwrap();
          let bindings = analyzer
            .memory()
            .bindings()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect::<Vec<_>>();
          (outcome, analyzer.result().unwrap(), bindings, analyzer.ticks())
        })
        .collect::<Vec<_>>();
      prop_assert_eq!(&runs[0], &runs[1]);
    }
  }
}
