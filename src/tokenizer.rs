//! Lexical analysis: turns the raw text of one file into located tokens.
//!
//! Tokens are whitespace-delimited. The only tokens that may contain
//! whitespace are string literals, which may also span lines. A token that
//! starts with `//` discards the rest of its line.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use crate::error::{CompileError, CompileResult, EXPANSION_DIAGNOSTIC_LIMIT};

/// A 1-based position inside a named source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
  pub file: Arc<str>,
  pub row: usize,
  pub col: usize,
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.row, self.col)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  If,
  Else,
  End,
  While,
  Do,
  Macro,
  Include,
}

impl Keyword {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "if" => Self::If,
      "else" => Self::Else,
      "end" => Self::End,
      "while" => Self::While,
      "do" => Self::Do,
      "macro" => Self::Macro,
      "include" => Self::Include,
      _ => return None,
    })
  }
}

/// Kinds of tokens, carrying the decoded literal value where there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
  Word,
  Int(i64),
  Str(Vec<u8>),
  Char(u8),
  Keyword(Keyword),
}

impl TokenKind {
  /// Short noun phrase naming the kind, e.g. `a string`.
  pub fn describe(&self) -> &'static str {
    match self {
      Self::Word => "a word",
      Self::Int(_) => "an integer",
      Self::Str(_) => "a string",
      Self::Char(_) => "a character",
      Self::Keyword(_) => "a keyword",
    }
  }
}

/// The token a macro call or include directive was expanded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
  pub loc: Location,
  pub text: String,
}

/// Why a token exists: how many substitutions deep it is, and the tokens
/// that caused those substitutions, innermost first.
///
/// Only the first `EXPANSION_DIAGNOSTIC_LIMIT + 1` origins are kept; that is
/// enough to print the chain and know whether it was cut short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
  pub depth: usize,
  pub origins: Vec<Origin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub loc: Location,
  pub provenance: Provenance,
}

impl Token {
  /// Copy of this token attributed to `invoker`, one expansion deeper.
  pub fn expanded_from(&self, invoker: &Token) -> Token {
    let mut origins = Vec::with_capacity(EXPANSION_DIAGNOSTIC_LIMIT + 1);
    origins.push(Origin {
      loc: invoker.loc.clone(),
      text: invoker.text.clone(),
    });
    origins.extend(
      invoker
        .provenance
        .origins
        .iter()
        .take(EXPANSION_DIAGNOSTIC_LIMIT)
        .cloned(),
    );

    Token {
      provenance: Provenance {
        depth: invoker.provenance.depth + 1,
        origins,
      },
      ..self.clone()
    }
  }
}

/// Lex one file's contents into a flat vector of tokens.
pub fn tokenize(file: &str, source: &str) -> CompileResult<Vec<Token>> {
  Lexer::new(file, source).run()
}

struct Lexer<'a> {
  file: Arc<str>,
  chars: Peekable<Chars<'a>>,
  row: usize,
  col: usize,
}

impl<'a> Lexer<'a> {
  fn new(file: &str, source: &'a str) -> Self {
    Self {
      file: Arc::from(file),
      chars: source.chars().peekable(),
      row: 1,
      col: 1,
    }
  }

  fn loc(&self) -> Location {
    Location {
      file: Arc::clone(&self.file),
      row: self.row,
      col: self.col,
    }
  }

  fn peek(&mut self) -> Option<char> {
    self.chars.peek().copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.chars.next()?;
    if c == '\n' {
      self.row += 1;
      self.col = 1;
    } else {
      self.col += 1;
    }
    Some(c)
  }

  fn run(mut self) -> CompileResult<Vec<Token>> {
    let mut tokens = Vec::new();

    loop {
      while self.peek().is_some_and(char::is_whitespace) {
        self.bump();
      }
      let Some(c) = self.peek() else {
        break;
      };
      let loc = self.loc();

      match c {
        '"' => tokens.push(self.string(loc)?),
        '\'' => tokens.push(self.character(loc)?),
        _ => {
          let mut text = String::new();
          while let Some(c) = self.peek().filter(|c| !c.is_whitespace()) {
            text.push(c);
            self.bump();
          }

          if text.starts_with("//") {
            while self.peek().is_some_and(|c| c != '\n') {
              self.bump();
            }
            continue;
          }

          let kind = if let Ok(value) = text.parse::<i64>() {
            TokenKind::Int(value)
          } else if let Some(keyword) = Keyword::from_name(&text) {
            TokenKind::Keyword(keyword)
          } else {
            TokenKind::Word
          };
          tokens.push(Token {
            kind,
            text,
            loc,
            provenance: Provenance::default(),
          });
        }
      }
    }

    Ok(tokens)
  }

  /// Raw text up to the closing `quote`, escapes left in place. `None` when
  /// the literal is cut off by end of input, or by a newline if
  /// `multiline` is false.
  fn raw_literal(&mut self, quote: char, multiline: bool) -> Option<String> {
    self.bump();
    let mut raw = String::new();
    loop {
      match self.peek()? {
        '\n' if !multiline => return None,
        c if c == quote => {
          self.bump();
          return Some(raw);
        }
        '\\' => {
          raw.push('\\');
          self.bump();
          let escaped = self.peek().filter(|&c| multiline || c != '\n')?;
          raw.push(escaped);
          self.bump();
        }
        c => {
          raw.push(c);
          self.bump();
        }
      }
    }
  }

  fn string(&mut self, loc: Location) -> CompileResult<Token> {
    let Some(text) = self.raw_literal('"', true) else {
      return Err(CompileError::UnclosedString { loc });
    };
    let value = unescape(&text, &loc)?;
    Ok(Token {
      kind: TokenKind::Str(value),
      text,
      loc,
      provenance: Provenance::default(),
    })
  }

  fn character(&mut self, loc: Location) -> CompileResult<Token> {
    let Some(text) = self.raw_literal('\'', false) else {
      return Err(CompileError::UnclosedChar { loc });
    };
    let bytes = unescape(&text, &loc)?;
    let [byte] = *bytes.as_slice() else {
      return Err(CompileError::CharNotSingleByte {
        loc,
        len: bytes.len(),
        text,
      });
    };
    Ok(Token {
      kind: TokenKind::Char(byte),
      text,
      loc,
      provenance: Provenance::default(),
    })
  }
}

/// Decode backslash escapes into raw bytes.
pub fn unescape(text: &str, loc: &Location) -> CompileResult<Vec<u8>> {
  let mut out = Vec::with_capacity(text.len());
  let mut chars = text.chars();

  while let Some(c) = chars.next() {
    if c != '\\' {
      let mut buf = [0; 4];
      out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
      continue;
    }

    let invalid = |escape: String| CompileError::InvalidEscape {
      loc: loc.clone(),
      escape,
    };
    match chars.next() {
      Some('n') => out.push(b'\n'),
      Some('t') => out.push(b'\t'),
      Some('r') => out.push(b'\r'),
      Some('0') => out.push(0),
      Some('\\') => out.push(b'\\'),
      Some('"') => out.push(b'"'),
      Some('\'') => out.push(b'\''),
      Some('x') => {
        let digits: String = chars.by_ref().take(2).collect();
        match u8::from_str_radix(&digits, 16) {
          Ok(byte) if digits.len() == 2 => out.push(byte),
          _ => return Err(invalid(format!("x{digits}"))),
        }
      }
      Some(other) => return Err(invalid(other.to_string())),
      None => return Err(invalid(String::new())),
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize("test.tau", source)
      .expect("source should lex")
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn classifies_ints_keywords_and_words() {
    assert_eq!(
      kinds("34 -7 if dup macro cast(ptr)"),
      vec![
        TokenKind::Int(34),
        TokenKind::Int(-7),
        TokenKind::Keyword(Keyword::If),
        TokenKind::Word,
        TokenKind::Keyword(Keyword::Macro),
        TokenKind::Word,
      ]
    );
  }

  #[test]
  fn tracks_rows_and_columns() {
    let tokens = tokenize("main.tau", "1 2\n  +  prn").unwrap();
    let locs: Vec<_> = tokens.iter().map(|t| (t.loc.row, t.loc.col)).collect();
    assert_eq!(locs, vec![(1, 1), (1, 3), (2, 3), (2, 6)]);
    assert_eq!(tokens[3].loc.to_string(), "main.tau:2:6");
  }

  #[test]
  fn comments_run_to_end_of_line() {
    assert_eq!(
      kinds("1 // 2 3\n4 //trailing"),
      vec![TokenKind::Int(1), TokenKind::Int(4)]
    );
  }

  #[test]
  fn strings_decode_escapes_and_span_lines() {
    let tokens = tokenize("s.tau", "\"a\\tb\\n\" \"two\nlines\" \"q\\\"q\"").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Str(b"a\tb\n".to_vec()));
    assert_eq!(tokens[0].text, "a\\tb\\n");
    assert_eq!(tokens[1].kind, TokenKind::Str(b"two\nlines".to_vec()));
    assert_eq!(tokens[2].kind, TokenKind::Str(b"q\"q".to_vec()));
    assert_eq!((tokens[2].loc.row, tokens[2].loc.col), (2, 8));
  }

  #[test]
  fn hex_escapes_produce_raw_bytes() {
    assert_eq!(kinds("\"\\xff\\x41\""), vec![TokenKind::Str(vec![0xff, b'A'])]);
  }

  #[test]
  fn unclosed_string_is_fatal() {
    let err = tokenize("s.tau", "1 \"never closed\n2 3").unwrap_err();
    assert!(matches!(err, CompileError::UnclosedString { .. }));
    assert_eq!(err.kind(), ErrorKind::Lex);
    assert_eq!(err.location().map(|l| l.col), Some(3));
  }

  #[test]
  fn character_literals() {
    assert_eq!(
      kinds("'a' '\\n' '\\''"),
      vec![
        TokenKind::Char(b'a'),
        TokenKind::Char(b'\n'),
        TokenKind::Char(b'\'')
      ]
    );

    let err = tokenize("c.tau", "'ab'").unwrap_err();
    assert!(matches!(err, CompileError::CharNotSingleByte { len: 2, .. }));

    let err = tokenize("c.tau", "'\u{e9}'").unwrap_err();
    assert!(matches!(err, CompileError::CharNotSingleByte { len: 2, .. }));

    let err = tokenize("c.tau", "'a\n'").unwrap_err();
    assert!(matches!(err, CompileError::UnclosedChar { .. }));
  }

  #[test]
  fn unknown_escape_is_fatal() {
    let err = tokenize("e.tau", "\"bad \\q\"").unwrap_err();
    assert!(matches!(err, CompileError::InvalidEscape { ref escape, .. } if escape == "q"));
  }

  #[test]
  fn expansion_copies_and_deepens() {
    let call = tokenize("m.tau", "twice").unwrap().remove(0);
    let body = tokenize("m.tau", "dup").unwrap().remove(0);
    let expanded = body.expanded_from(&call);
    assert_eq!(expanded.provenance.depth, 1);
    assert_eq!(expanded.provenance.origins[0].text, "twice");
    assert_eq!(body.provenance.depth, 0);

    let again = expanded.expanded_from(&expanded);
    assert_eq!(again.provenance.depth, 2);
    assert_eq!(again.provenance.origins.len(), 2);
  }
}
