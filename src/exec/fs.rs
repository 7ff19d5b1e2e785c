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

//! Virtual file systems for looking up the texts to match.

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use toolshed::Arena;

/// A virtual file system, which the executor reads its inputs from.
///
/// For example, this could be a collection of in-memory texts, or it could
/// be a thin wrapper around the local file system (or a subset of it).
pub trait FileSys: Send + Sync {
  /// Looks up the file with the given name.
  fn read_file(&self, file_name: &Path) -> io::Result<&str>;
}

/// The local file system.
///
/// A `Local` resolves relative paths against a working directory, and may
/// refuse to read anything outside of a required prefix. Files are read at
/// most once, and kept alive for as long as the `Local` is.
pub struct Local {
  inner: Mutex<LocalInner>,
}

struct LocalInner {
  arena: Arena,
  // NOTE: the pointers in `files` live for as long as `arena` does.
  files: RefCell<HashMap<PathBuf, *const str>>,

  cwd: PathBuf,
  prefix: Option<PathBuf>,
}

// The raw pointers only ever point into `arena`, which moves with us.
unsafe impl Send for LocalInner {}

impl Local {
  /// Creates a new `Local` rooted at the process's working directory, with
  /// no prefix restriction.
  pub fn new() -> io::Result<Self> {
    Ok(Self::with_options(env::current_dir()?, None))
  }

  /// Creates a new `Local` with the given working directory and prefix.
  pub fn with_options(cwd: PathBuf, prefix: Option<PathBuf>) -> Self {
    Self {
      inner: Mutex::new(LocalInner {
        arena: Arena::new(),
        files: RefCell::new(HashMap::new()),
        cwd,
        prefix,
      }),
    }
  }
}

impl FileSys for Local {
  fn read_file(&self, file_name: &Path) -> io::Result<&str> {
    let inner = self.inner.lock().map_err(|_| {
      io::Error::new(io::ErrorKind::Other, "file cache lock was poisoned")
    })?;

    let mut files = inner.files.borrow_mut();
    if let Some(ptr) = files.get(file_name) {
      // SAFETY: only arena pointers go into the map, and the arena lives as
      // long as `self`.
      unsafe { return Ok(&**ptr) }
    }

    let mut full_path = inner.cwd.join(file_name);
    if let Some(prefix) = &inner.prefix {
      full_path = fs::canonicalize(&full_path)?;
      if !full_path.starts_with(prefix) {
        return Err(io::Error::new(
          io::ErrorKind::PermissionDenied,
          "attempted to escape local filesystem prefix",
        ));
      }
    }

    let text =
      inner.arena.alloc_string(fs::read_to_string(full_path)?) as *const str;
    files.insert(file_name.to_path_buf(), text);
    // SAFETY: the text is owned by the arena, not by the lock guard.
    Ok(unsafe { &*text })
  }
}

/// A file system made of in-memory texts, mostly for tests.
#[derive(Debug, Default)]
pub struct InMemory {
  files: HashMap<PathBuf, String>,
}

impl InMemory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a file, replacing any file of the same name.
  pub fn insert(
    &mut self,
    file_name: impl Into<PathBuf>,
    text: impl Into<String>,
  ) {
    self.files.insert(file_name.into(), text.into());
  }
}

impl FileSys for InMemory {
  fn read_file(&self, file_name: &Path) -> io::Result<&str> {
    self
      .files
      .get(file_name)
      .map(String::as_str)
      .ok_or_else(|| {
        io::Error::new(
          io::ErrorKind::NotFound,
          format!("no such file: {}", file_name.display()),
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn in_memory_lookups() {
    let mut fs = InMemory::new();
    fs.insert("a.txt", "hello");
    assert_eq!(fs.read_file(Path::new("a.txt")).unwrap(), "hello");
    assert_eq!(
      fs.read_file(Path::new("b.txt")).unwrap_err().kind(),
      io::ErrorKind::NotFound
    );
  }

  #[test]
  fn local_files_are_read_once() {
    let dir = env::temp_dir()
      .join(format!("retrace-fs-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("input.txt"), "first").unwrap();

    let local = Local::with_options(dir.clone(), None);
    let name = Path::new("input.txt");
    assert_eq!(local.read_file(name).unwrap(), "first");
    fs::write(dir.join("input.txt"), "second").unwrap();
    assert_eq!(local.read_file(name).unwrap(), "first");

    let fenced = Local::with_options(dir.clone(), Some(dir.join("sub")));
    assert_eq!(
      fenced.read_file(name).unwrap_err().kind(),
      io::ErrorKind::PermissionDenied
    );
    fs::remove_dir_all(&dir).unwrap();
  }
}
