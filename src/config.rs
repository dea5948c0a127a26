//! Compiler context threaded through every stage.

use std::path::PathBuf;

pub const DEFAULT_EXPANSION_LIMIT: usize = 1000;

/// Settings for a single compilation. Nothing here outlives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Directories searched, in order, for `include` targets.
  pub include_paths: Vec<PathBuf>,
  /// Deepest macro/include nesting allowed.
  pub expansion_limit: usize,
  pub type_check: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      include_paths: vec![PathBuf::from("."), PathBuf::from("./std/")],
      expansion_limit: DEFAULT_EXPANSION_LIMIT,
      type_check: true,
    }
  }
}

impl Config {
  pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.include_paths.push(path.into());
    self
  }

  pub fn with_expansion_limit(mut self, limit: usize) -> Self {
    self.expansion_limit = limit;
    self
  }

  /// Skip the type checker.
  pub fn unsafe_mode(mut self) -> Self {
    self.type_check = false;
    self
  }
}
