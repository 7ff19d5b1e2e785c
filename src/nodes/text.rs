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

//! Leaf nodes, which consume text.
//!
//! None of these ever freeze: they either match at the cursor, and finish,
//! or they backtrack.

use crate::analyzer::Analyzer;
use crate::analyzer::Fatal;
use crate::nodes::CompiledNode;
use crate::nodes::NodeId;
use crate::nodes::Signal;
use crate::syn::ClassItem;

/// Matches a literal run of characters.
#[derive(Clone, Debug)]
pub struct Text {
  pub chars: Vec<char>,
}

impl CompiledNode for Text {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    _: Signal,
  ) -> Result<(), Fatal> {
    let text = analyzer.text_mut();
    if text.starts_with(&self.chars) {
      let cursor = text.cursor();
      text.restore_cursor(cursor + self.chars.len());
      analyzer.finish(id);
    } else {
      analyzer.backtrack();
    }
    Ok(())
  }
}

/// Matches any character but a newline.
#[derive(Copy, Clone, Debug)]
pub struct Any;

impl CompiledNode for Any {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    _: Signal,
  ) -> Result<(), Fatal> {
    match analyzer.text().peek() {
      Some(c) if c != '\n' => {
        analyzer.text_mut().advance();
        analyzer.finish(id);
      }
      _ => analyzer.backtrack(),
    }
    Ok(())
  }
}

/// Matches one character out of a set.
#[derive(Clone, Debug)]
pub struct Class {
  pub negated: bool,
  pub items: Vec<ClassItem>,
}

impl Class {
  pub fn contains(&self, c: char) -> bool {
    let found = self.items.iter().any(|item| match *item {
      ClassItem::Range(lo, hi) => lo <= c && c <= hi,
      ClassItem::Digit => c.is_ascii_digit(),
      ClassItem::Word => c.is_alphanumeric() || c == '_',
      ClassItem::Space => c.is_whitespace(),
    });
    found != self.negated
  }
}

impl CompiledNode for Class {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    _: Signal,
  ) -> Result<(), Fatal> {
    match analyzer.text().peek() {
      Some(c) if self.contains(c) => {
        analyzer.text_mut().advance();
        analyzer.finish(id);
      }
      _ => analyzer.backtrack(),
    }
    Ok(())
  }
}

/// Matches a position rather than a character.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
  Start,
  End,
}

impl CompiledNode for Anchor {
  fn resume(
    &self,
    id: NodeId,
    analyzer: &mut Analyzer<'_>,
    _: Signal,
  ) -> Result<(), Fatal> {
    let text = analyzer.text();
    let matched = match self {
      Anchor::Start => text.is_at_start(),
      Anchor::End => text.is_at_end(),
    };
    if matched {
      analyzer.finish(id);
    } else {
      analyzer.backtrack();
    }
    Ok(())
  }
}
