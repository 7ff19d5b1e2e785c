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

//! The input text, as seen by compiled nodes.

/// A cursor over a piece of text, indexed by `char`.
///
/// The cursor is part of every resume point, so that a rollback also moves
/// the input back to where it was.
#[derive(Clone, Debug, Default)]
pub struct Reader {
  chars: Vec<char>,
  cursor: usize,
}

impl Reader {
  pub fn new(text: &str) -> Self {
    Reader {
      chars: text.chars().collect(),
      cursor: 0,
    }
  }

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  /// Returns the cursor, for a later [`Reader::restore_cursor()`].
  pub fn save_cursor(&self) -> usize {
    self.cursor
  }

  /// Moves the cursor back (or forward) to `cursor`, clamped to the end of
  /// the text.
  pub fn restore_cursor(&mut self, cursor: usize) {
    self.cursor = cursor.min(self.chars.len());
  }

  pub fn peek(&self) -> Option<char> {
    self.chars.get(self.cursor).copied()
  }

  /// Consumes one character.
  pub fn advance(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.cursor += 1;
    Some(c)
  }

  pub fn is_at_start(&self) -> bool {
    self.cursor == 0
  }

  pub fn is_at_end(&self) -> bool {
    self.cursor >= self.chars.len()
  }

  pub fn len(&self) -> usize {
    self.chars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chars.is_empty()
  }

  /// Returns whether the text continues with `prefix` at the cursor.
  pub fn starts_with(&self, prefix: &[char]) -> bool {
    self.chars[self.cursor..].starts_with(prefix)
  }

  /// Returns the text between two cursors.
  pub fn slice(&self, from: usize, to: usize) -> String {
    let to = to.min(self.chars.len());
    let from = from.min(to);
    self.chars[from..to].iter().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_chars_not_bytes() {
    let mut r = Reader::new("héllo");
    assert_eq!(r.len(), 5);
    assert!(r.is_at_start());
    assert_eq!(r.advance(), Some('h'));
    assert_eq!(r.peek(), Some('é'));
    assert!(r.starts_with(&['é', 'l']));

    let saved = r.save_cursor();
    r.advance();
    r.advance();
    assert_eq!(r.slice(saved, r.cursor()), "él");
    r.restore_cursor(saved);
    assert_eq!(r.cursor(), 1);
  }

  #[test]
  fn end_of_text() {
    let mut r = Reader::new("a");
    r.restore_cursor(10);
    assert!(r.is_at_end());
    assert_eq!(r.advance(), None);
    assert!(r.starts_with(&[]));
    assert_eq!(r.slice(0, 10), "a");
  }
}
