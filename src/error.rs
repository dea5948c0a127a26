//! Compile errors and their rendering as located diagnostics.
//!
//! Every failure is fatal: the first `CompileError` aborts the compilation.
//! Diagnostics are rendered as `file:row:col: ERROR: message`, followed by a
//! `NOTE` line for each macro call or include directive the offending token
//! was expanded from.

use std::fmt;
use std::path::PathBuf;

use snafu::Snafu;

use crate::tokenizer::{Location, Origin, Token};
use crate::ty::{DataType, TypeSeq};

pub type CompileResult<T> = Result<T, CompileError>;

/// Number of `expanded from` notes printed before the chain is elided.
pub const EXPANSION_DIAGNOSTIC_LIMIT: usize = 10;

/// The point a diagnostic refers to, with the expansion chain of the token
/// found there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
  pub loc: Location,
  pub origins: Vec<Origin>,
}

impl Site {
  /// Whether the chain was longer than what gets printed.
  pub fn truncated(&self) -> bool {
    self.origins.len() > EXPANSION_DIAGNOSTIC_LIMIT
  }
}

impl From<&Token> for Site {
  fn from(token: &Token) -> Self {
    Self {
      loc: token.loc.clone(),
      origins: token.provenance.origins.clone(),
    }
  }
}

/// What kind of substitution hit the expansion ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
  Macro,
  Include,
}

impl fmt::Display for Expansion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Macro => f.write_str("macro"),
      Self::Include => f.write_str("include"),
    }
  }
}

/// Control-flow joins whose type stacks must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
  IfWithoutElse,
  IfElse,
  WhileBody,
}

impl fmt::Display for Join {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::IfWithoutElse => f.write_str(
        "else-less if block is not allowed to alter the types of the arguments on the data stack",
      ),
      Self::IfElse => f.write_str(
        "both branches of the if-block must produce the same types of the arguments on the data stack",
      ),
      Self::WhileBody => f.write_str(
        "while-do body is not allowed to alter the types of the arguments on the data stack",
      ),
    }
  }
}

/// Broad category of a `CompileError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Lex,
  ExpansionLimit,
  UnresolvedName,
  Structural,
  Type,
  ResidualStack,
  Io,
  Internal,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("unclosed string literal"))]
  UnclosedString { loc: Location },

  #[snafu(display("unclosed character literal"))]
  UnclosedChar { loc: Location },

  #[snafu(display("unknown escape sequence `\\{escape}`"))]
  InvalidEscape { loc: Location, escape: String },

  #[snafu(display(
    "only a single byte is allowed inside of a character literal, `'{text}'` is {len} bytes"
  ))]
  CharNotSingleByte {
    loc: Location,
    text: String,
    len: usize,
  },

  #[snafu(display("the {what} exceeded the expansion limit (it expanded {depth} times)"))]
  ExpansionLimit {
    site: Site,
    what: Expansion,
    depth: usize,
  },

  #[snafu(display("unknown word `{word}`"))]
  UnknownWord { site: Site, word: String },

  #[snafu(display("`else` can only be used in `if`-blocks"))]
  UnmatchedElse { site: Site },

  #[snafu(display("`do` can only be used in `while`-blocks"))]
  UnmatchedDo { site: Site },

  #[snafu(display("`end` can only close `if`, `else` or `do` blocks"))]
  UnmatchedEnd { site: Site },

  #[snafu(display("unclosed block"))]
  UnclosedBlock { site: Site },

  #[snafu(display("redefinition of already existing macro `{name}`"))]
  MacroRedefinition {
    site: Site,
    name: String,
    first: Location,
  },

  #[snafu(display(
    "redefinition of an intrinsic word `{name}`. Please choose a different name for your macro."
  ))]
  MacroShadowsIntrinsic { site: Site, name: String },

  #[snafu(display("expected macro name to be a word but found {found}"))]
  ExpectedMacroName { site: Site, found: &'static str },

  #[snafu(display("expected `end` at the end of the macro definition of `{name}`"))]
  UnclosedMacro { site: Site, name: String },

  #[snafu(display("expected path to the include file to be a string but found {found}"))]
  ExpectedIncludePath { site: Site, found: &'static str },

  #[snafu(display("file `{path}` not found"))]
  IncludeNotFound { site: Site, path: String },

  #[snafu(display("not enough arguments for {what}"))]
  NotEnoughArguments { site: Site, what: String },

  #[snafu(display("invalid argument types for {what}: {found}"))]
  InvalidArguments {
    site: Site,
    what: String,
    found: TypeSeq,
  },

  #[snafu(display("invalid argument for the {what} condition. Expected BOOL but found {found}"))]
  InvalidCondition {
    site: Site,
    what: &'static str,
    found: DataType,
  },

  #[snafu(display("{join}"))]
  JoinMismatch {
    site: Site,
    join: Join,
    expected: TypeSeq,
    actual: TypeSeq,
  },

  #[snafu(display("unhandled data on the stack: {types}"))]
  ResidualStack { site: Site, types: TypeSeq },

  #[snafu(display("could not read `{}`: {source}", path.display()))]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("jump target of `{text}` was never resolved"))]
  Unresolved { site: Site, text: String },

  #[snafu(display("`{text}` reached the program builder unexpanded"))]
  Unexpanded { site: Site, text: String },
}

impl CompileError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UnclosedString { .. }
      | Self::UnclosedChar { .. }
      | Self::InvalidEscape { .. }
      | Self::CharNotSingleByte { .. } => ErrorKind::Lex,
      Self::ExpansionLimit { .. } => ErrorKind::ExpansionLimit,
      Self::UnknownWord { .. } => ErrorKind::UnresolvedName,
      Self::UnmatchedElse { .. }
      | Self::UnmatchedDo { .. }
      | Self::UnmatchedEnd { .. }
      | Self::UnclosedBlock { .. }
      | Self::MacroRedefinition { .. }
      | Self::MacroShadowsIntrinsic { .. }
      | Self::ExpectedMacroName { .. }
      | Self::UnclosedMacro { .. }
      | Self::ExpectedIncludePath { .. }
      | Self::IncludeNotFound { .. } => ErrorKind::Structural,
      Self::NotEnoughArguments { .. }
      | Self::InvalidArguments { .. }
      | Self::InvalidCondition { .. }
      | Self::JoinMismatch { .. } => ErrorKind::Type,
      Self::ResidualStack { .. } => ErrorKind::ResidualStack,
      Self::Io { .. } => ErrorKind::Io,
      Self::Unresolved { .. } | Self::Unexpanded { .. } => ErrorKind::Internal,
    }
  }

  /// Expansion-aware position of the error, if it has one.
  pub fn site(&self) -> Option<&Site> {
    match self {
      Self::ExpansionLimit { site, .. }
      | Self::UnknownWord { site, .. }
      | Self::UnmatchedElse { site }
      | Self::UnmatchedDo { site }
      | Self::UnmatchedEnd { site }
      | Self::UnclosedBlock { site }
      | Self::MacroRedefinition { site, .. }
      | Self::MacroShadowsIntrinsic { site, .. }
      | Self::ExpectedMacroName { site, .. }
      | Self::UnclosedMacro { site, .. }
      | Self::ExpectedIncludePath { site, .. }
      | Self::IncludeNotFound { site, .. }
      | Self::NotEnoughArguments { site, .. }
      | Self::InvalidArguments { site, .. }
      | Self::InvalidCondition { site, .. }
      | Self::JoinMismatch { site, .. }
      | Self::ResidualStack { site, .. }
      | Self::Unresolved { site, .. }
      | Self::Unexpanded { site, .. } => Some(site),
      Self::UnclosedString { .. }
      | Self::UnclosedChar { .. }
      | Self::InvalidEscape { .. }
      | Self::CharNotSingleByte { .. }
      | Self::Io { .. } => None,
    }
  }

  pub fn location(&self) -> Option<&Location> {
    match self {
      Self::UnclosedString { loc }
      | Self::UnclosedChar { loc }
      | Self::InvalidEscape { loc, .. }
      | Self::CharNotSingleByte { loc, .. } => Some(loc),
      _ => self.site().map(|site| &site.loc),
    }
  }

  /// Render the full diagnostic: the error line, the expansion chain and any
  /// notes specific to the error.
  pub fn report(&self) -> String {
    let mut lines = Vec::new();
    lines.push(match self.location() {
      Some(loc) => format!("{loc}: ERROR: {self}"),
      None => format!("ERROR: {self}"),
    });

    if let Some(site) = self.site() {
      for origin in site.origins.iter().take(EXPANSION_DIAGNOSTIC_LIMIT) {
        lines.push(format!(
          "{}: NOTE: expanded from `{}`",
          origin.loc, origin.text
        ));
      }
      if site.truncated() {
        lines.push("...".to_string());
        lines.push("... too many expansions ...".to_string());
        lines.push("...".to_string());
      }
    }

    match self {
      Self::MacroRedefinition { first, .. } => {
        lines.push(format!(
          "{first}: NOTE: the first definition is located here"
        ));
      }
      Self::JoinMismatch {
        site,
        expected,
        actual,
        ..
      } => {
        lines.push(format!("{}: NOTE: Expected types: {expected}", site.loc));
        lines.push(format!("{}: NOTE: Actual types: {actual}", site.loc));
      }
      _ => {}
    }

    lines.join("\n")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::{Provenance, TokenKind};
  use std::sync::Arc;

  fn loc(row: usize, col: usize) -> Location {
    Location {
      file: Arc::from("main.tau"),
      row,
      col,
    }
  }

  fn word(text: &str, loc: Location) -> Token {
    Token {
      kind: TokenKind::Word,
      text: text.to_string(),
      loc,
      provenance: Provenance::default(),
    }
  }

  #[test]
  fn report_prints_location_and_tag() {
    let err = CompileError::UnknownWord {
      site: Site::from(&word("foo", loc(3, 7))),
      word: "foo".to_string(),
    };
    assert_eq!(err.report(), "main.tau:3:7: ERROR: unknown word `foo`");
    assert_eq!(err.kind(), ErrorKind::UnresolvedName);
  }

  #[test]
  fn report_walks_expansion_chain() {
    let call = word("twice", loc(5, 1));
    let inner = word("bogus", loc(1, 13)).expanded_from(&call);
    let err = CompileError::UnknownWord {
      site: Site::from(&inner),
      word: "bogus".to_string(),
    };
    let report = err.report();
    let lines: Vec<_> = report.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "main.tau:5:1: NOTE: expanded from `twice`");
  }

  #[test]
  fn long_chains_are_elided() {
    let mut token = word("loop", loc(1, 1));
    for _ in 0..25 {
      token = token.expanded_from(&token);
    }
    let err = CompileError::ExpansionLimit {
      site: Site::from(&token),
      what: Expansion::Macro,
      depth: token.provenance.depth,
    };
    let report = err.report();
    let notes = report.lines().filter(|l| l.contains("NOTE")).count();
    assert_eq!(notes, EXPANSION_DIAGNOSTIC_LIMIT);
    assert!(report.contains("... too many expansions ..."));
  }

  #[test]
  fn join_mismatch_reports_both_sequences() {
    let err = CompileError::JoinMismatch {
      site: Site::from(&word("end", loc(1, 12))),
      join: Join::IfWithoutElse,
      expected: TypeSeq(vec![]),
      actual: TypeSeq(vec![DataType::Int]),
    };
    let report = err.report();
    assert!(report.contains("NOTE: Expected types: []"));
    assert!(report.contains("NOTE: Actual types: [INT]"));
    assert_eq!(err.kind(), ErrorKind::Type);
  }
}
