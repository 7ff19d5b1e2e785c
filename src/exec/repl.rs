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

//! Execution environment for the interactive matcher.
//!
//! Set a pattern with `:pattern`, then type lines of text to match against
//! it.

use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use rustyline::error::ReadlineError;
use rustyline::Editor;

use crate::analyzer::Analyzer;
use crate::analyzer::Outcome;
use crate::config::Config;
use crate::nodes;
use crate::nodes::Program;
use crate::syn;

const DOUBLE_CTRL_C_THRESHOLD: Duration = Duration::from_millis(300);

const HELP: &str = "\
available commands:
:pattern <p> - sets the pattern to match lines against
:search      - toggles between searching and anchored matching
:stats       - shows statistics about the last match
:clear       - clears the terminal
:help        - shows this message
:quit        - exits the REPL";

/// All state for the REPL.
pub struct Executor<'i> {
  arena: &'i syn::Arena,
  config: Config,
  program: Option<Program>,
  search: bool,
  last_stats: Option<String>,
  editor: Editor<()>,
  last_ctrl_c: Instant,
}

impl<'i> Executor<'i> {
  /// Creates a new REPL; call `execute_loop()` to run it.
  pub fn new(arena: &'i syn::Arena, config: Config) -> Self {
    Executor {
      arena,
      config,
      program: None,
      search: true,
      last_stats: None,
      editor: Editor::new(),
      last_ctrl_c: Instant::now(),
    }
  }

  /// Execs into the REPL; does not return except in the case of errors.
  pub fn execute_loop(&mut self) -> io::Result<Infallible> {
    eprintln!(
      "Welcome to retrace v{version} (rustc v{rustc}, {arch} {os})",
      version = env!("CARGO_PKG_VERSION"),
      os = std::env::consts::OS,
      arch = std::env::consts::ARCH,
      rustc = rustc_version::version().unwrap_or((0, 0, 0).into()),
    );
    eprintln!("Set a pattern with :pattern, then enter lines to match.");
    eprintln!("Run :quit, or double-press ^C, to escape.");
    eprintln!("Run :help for more information.");
    eprintln!();
    loop {
      let buf = self.read_line()?;
      if buf.is_empty() {
        continue;
      }

      if buf.starts_with(':') {
        match buf.split_ascii_whitespace().next() {
          Some(":quit") | Some(":q") => std::process::exit(0),
          Some(":clear") | Some(":c") => {
            print!("{}{}", termion::clear::All, termion::cursor::Goto(1, 1))
          }
          _ => match self.execute_command(&buf) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("error: {}", e),
          },
        }
        continue;
      }

      match self.match_line(&buf) {
        Ok(out) => print!("{}", out),
        Err(e) => eprintln!("error: {}", e),
      }
    }
  }

  fn read_line(&mut self) -> io::Result<String> {
    let prompt = if self.program.is_some() { "match> " } else { "retrace> " };
    match self.editor.readline(prompt) {
      Ok(s) => {
        self.editor.add_history_entry(s.as_str());
        Ok(s)
      }
      Err(ReadlineError::Io(e)) => Err(e),
      Err(ReadlineError::Interrupted) => {
        if self.last_ctrl_c.elapsed() < DOUBLE_CTRL_C_THRESHOLD {
          std::process::exit(0)
        }
        self.last_ctrl_c = Instant::now();
        Ok(String::new())
      }
      Err(ReadlineError::Eof) => std::process::exit(0),
      Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
    }
  }

  /// Runs a `:` command other than `:quit` and `:clear`, returning what to
  /// print.
  fn execute_command(&mut self, command: &str) -> Result<String, String> {
    let (name, rest) = match command.find(char::is_whitespace) {
      Some(i) => (&command[..i], &command[i + 1..]),
      None => (command, ""),
    };
    match name {
      ":help" | ":h" => Ok(HELP.to_string()),
      ":pattern" | ":p" => {
        let source = self.arena.alloc_string(rest.to_string());
        let pattern = syn::parse(Path::new("<stdin>"), source, self.arena)
          .map_err(|e| e.to_string())?;
        let program = nodes::compile(pattern, self.search);
        let out = format!("compiled into {} nodes", program.len());
        self.program = Some(program);
        Ok(out)
      }
      ":search" | ":s" => {
        self.search = !self.search;
        // Recompiling is cheaper than keeping the syntax tree around.
        self.program = None;
        Ok(format!(
          "{} mode; set the pattern again",
          if self.search { "search" } else { "anchored" }
        ))
      }
      ":stats" => self
        .last_stats
        .clone()
        .ok_or_else(|| "nothing has been matched yet".to_string()),
      command => Err(format!("unknown command: {}", command)),
    }
  }

  /// Matches `line` against the current pattern, returning what to print.
  fn match_line(&mut self, line: &str) -> Result<String, String> {
    let program = match &self.program {
      Some(program) => program,
      None => return Err("no pattern; set one with :pattern".to_string()),
    };

    let mut analyzer = Analyzer::new(program, self.config.clone());
    let outcome = analyzer.match_text(line).map_err(|e| e.to_string())?;
    self.last_stats = Some(format!(
      "{} ticks, {} sweeps\n{}",
      analyzer.ticks(),
      analyzer.collector().sweeps(),
      analyzer.memory().stats()
    ));

    match outcome {
      Outcome::Matched => match analyzer.result().map_err(|e| e.to_string())? {
        Some(m) => Ok(m.to_string()),
        None => Ok("no match\n".to_string()),
      },
      Outcome::NoMatch => Ok("no match\n".to_string()),
      Outcome::Paused => Ok("timed out\n".to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn patterns_and_matches() {
    let arena = syn::Arena::new();
    let mut repl = Executor::new(&arena, Config::default());
    assert!(repl.match_line("abc").is_err());
    assert!(repl.execute_command(":stats").is_err());

    assert!(repl.execute_command(":pattern b(?<c>c)").is_ok());
    assert_eq!(
      repl.match_line("abc").unwrap(),
      "root 1..3 \"bc\"\n  c 2..3 \"c\"\n"
    );
    assert!(repl.execute_command(":stats").unwrap().contains("ticks"));

    assert!(repl.execute_command(":search").is_ok());
    assert!(repl.execute_command(":p b").is_ok());
    assert_eq!(repl.match_line("abc").unwrap(), "no match\n");

    assert!(repl.execute_command(":pattern (").is_err());
    assert!(repl.execute_command(":frobnicate").is_err());
  }
}
