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


#![deny(unused)]
#![deny(warnings)]

use std::path::Path;

use retrace::config::Config;
use retrace::exec;
use retrace::exec::fs::Local;
use retrace::exec::parallel::Executor;
use retrace::nodes;
use retrace::syn;

fn main() {
  env_logger::init();

  let mut args = std::env::args_os().skip(1);
  let pattern = match args.next() {
    Some(p) => p,
    #[allow(irrefutable_let_patterns)]
    None => {
      let arena = syn::Arena::new();
      if let Err(e) = exec::repl::Executor::new(&arena, Config::default())
        .execute_loop()
      {
        eprintln!("error: {}", e);
        std::process::exit(1)
      }
      return;
    }
  };

  let pattern = match pattern.into_string() {
    Ok(p) => p,
    Err(_) => {
      eprintln!("error: pattern is not valid UTF-8");
      std::process::exit(2)
    }
  };
  let program = match nodes::compile_source(&pattern, true) {
    Ok(p) => p,
    Err(e) => {
      eprintln!("{}", e);
      std::process::exit(2)
    }
  };

  let fs = match Local::new() {
    Ok(fs) => fs,
    Err(e) => {
      eprintln!("error: cannot open working directory: {}", e);
      std::process::exit(1)
    }
  };

  let file_names = args.collect::<Vec<_>>();
  let file_names = file_names.iter().map(Path::new).collect::<Vec<_>>();
  let exec = Executor::new(&fs, &program, Config::default(), std::io::stderr());
  let reports = match exec.exec_files(file_names.iter().copied(), 8) {
    Ok(r) => r,
    Err(n) => {
      eprintln!("error: got {} errors", n);
      std::process::exit(1)
    }
  };

  let mut any_matched = false;
  for file in &file_names {
    let report = match reports.get(file) {
      Some(r) => r,
      None => continue,
    };
    match &report.matched {
      Some(m) => {
        any_matched = true;
        print!("# {}\n{}", file.display(), m);
      }
      None if report.outcome == retrace::analyzer::Outcome::Paused => {
        println!("# {}\ntimed out", file.display())
      }
      None => println!("# {}\nno match", file.display()),
    }
  }
  if !any_matched {
    std::process::exit(1)
  }
}
