//! Macro and include expansion.
//!
//! Pending tokens live in a double-ended queue. Expanding a macro call or an
//! include directive pushes the replacement tokens onto the front of the
//! queue, so nesting never recurses on the call stack and the depth ceiling
//! is checked per token.

use std::collections::{HashMap, VecDeque};
use std::fs;

use snafu::ResultExt;
use tracing::debug;

use crate::config::Config;
use crate::error::{CompileError, CompileResult, Expansion, IoSnafu, Site};
use crate::intrinsic::Intrinsic;
use crate::tokenizer::{Keyword, Location, Token, TokenKind, tokenize};

/// A named token sequence, captured once and replayed at every call site.
#[derive(Debug, Clone)]
pub struct Macro {
  pub loc: Location,
  pub body: Vec<Token>,
}

/// Expand every macro call and include directive in `tokens`. Macro
/// definitions are consumed and do not appear in the output.
pub fn expand(tokens: Vec<Token>, config: &Config) -> CompileResult<Vec<Token>> {
  Expander::new(config).run(tokens)
}

struct Expander<'a> {
  config: &'a Config,
  macros: HashMap<String, Macro>,
  queue: VecDeque<Token>,
}

impl<'a> Expander<'a> {
  fn new(config: &'a Config) -> Self {
    Self {
      config,
      macros: HashMap::new(),
      queue: VecDeque::new(),
    }
  }

  fn run(mut self, tokens: Vec<Token>) -> CompileResult<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len());
    self.queue = tokens.into();

    while let Some(token) = self.queue.pop_front() {
      match token.kind {
        TokenKind::Word => match self.macros.get(&token.text) {
          Some(found) => {
            let body = found.body.clone();
            self.call(token, body)?;
          }
          None => out.push(token),
        },
        TokenKind::Keyword(Keyword::Macro) => self.define(token)?,
        TokenKind::Keyword(Keyword::Include) => self.include(token)?,
        _ => out.push(token),
      }
    }

    debug!(
      tokens = out.len(),
      macros = self.macros.len(),
      "expansion finished"
    );
    Ok(out)
  }

  /// Put `tokens` in front of everything still pending, preserving order.
  fn splice(&mut self, tokens: Vec<Token>) {
    for token in tokens.into_iter().rev() {
      self.queue.push_front(token);
    }
  }

  /// Fail if tokens expanded from `token` would reach the ceiling.
  fn check_depth(&self, token: &Token, what: Expansion) -> CompileResult<()> {
    let depth = token.provenance.depth + 1;
    if depth >= self.config.expansion_limit {
      return Err(CompileError::ExpansionLimit {
        site: Site::from(token),
        what,
        depth,
      });
    }
    Ok(())
  }

  fn call(&mut self, token: Token, body: Vec<Token>) -> CompileResult<()> {
    self.check_depth(&token, Expansion::Macro)?;
    let expanded = body
      .iter()
      .map(|body| body.expanded_from(&token))
      .collect();
    self.splice(expanded);
    Ok(())
  }

  fn define(&mut self, keyword: Token) -> CompileResult<()> {
    let Some(name) = self.queue.pop_front() else {
      return Err(CompileError::ExpectedMacroName {
        site: Site::from(&keyword),
        found: "nothing",
      });
    };
    if name.kind != TokenKind::Word {
      return Err(CompileError::ExpectedMacroName {
        site: Site::from(&name),
        found: name.kind.describe(),
      });
    }
    if let Some(existing) = self.macros.get(&name.text) {
      return Err(CompileError::MacroRedefinition {
        site: Site::from(&name),
        name: name.text.clone(),
        first: existing.loc.clone(),
      });
    }
    if Intrinsic::from_name(&name.text).is_some() {
      return Err(CompileError::MacroShadowsIntrinsic {
        site: Site::from(&name),
        name: name.text,
      });
    }

    // Blocks opened inside the body need their own `end`.
    let mut depth = 0usize;
    let mut body = Vec::new();
    loop {
      let Some(token) = self.queue.pop_front() else {
        return Err(CompileError::UnclosedMacro {
          site: Site::from(&name),
          name: name.text,
        });
      };
      match token.kind {
        TokenKind::Keyword(Keyword::End) if depth == 0 => break,
        TokenKind::Keyword(Keyword::End) => depth -= 1,
        TokenKind::Keyword(Keyword::If | Keyword::While | Keyword::Macro) => depth += 1,
        _ => {}
      }
      body.push(token);
    }

    debug!(name = %name.text, tokens = body.len(), "defined macro");
    self.macros.insert(
      name.text,
      Macro {
        loc: name.loc,
        body,
      },
    );
    Ok(())
  }

  fn include(&mut self, keyword: Token) -> CompileResult<()> {
    let Some(target) = self.queue.pop_front() else {
      return Err(CompileError::ExpectedIncludePath {
        site: Site::from(&keyword),
        found: "nothing",
      });
    };
    let TokenKind::Str(bytes) = &target.kind else {
      return Err(CompileError::ExpectedIncludePath {
        site: Site::from(&target),
        found: target.kind.describe(),
      });
    };
    self.check_depth(&target, Expansion::Include)?;

    let relative = String::from_utf8_lossy(bytes).into_owned();
    let config = self.config;
    for dir in &config.include_paths {
      let candidate = dir.join(&relative);
      if !candidate.is_file() {
        continue;
      }

      let source = fs::read_to_string(&candidate).context(IoSnafu { path: &candidate })?;
      let tokens = tokenize(&candidate.display().to_string(), &source)?;
      debug!(path = %candidate.display(), tokens = tokens.len(), "included file");

      let expanded = tokens
        .iter()
        .map(|token| token.expanded_from(&target))
        .collect();
      self.splice(expanded);
      return Ok(());
    }

    Err(CompileError::IncludeNotFound {
      site: Site::from(&target),
      path: relative,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use std::path::PathBuf;

  fn expand_src(source: &str) -> CompileResult<Vec<Token>> {
    expand(tokenize("test.tau", source)?, &Config::default())
  }

  fn texts(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().map(|t| t.text.as_str()).collect()
  }

  #[test]
  fn macro_calls_are_inlined() {
    let tokens = expand_src("macro twice dup dup end 5 twice").unwrap();
    assert_eq!(texts(&tokens), vec!["5", "dup", "dup"]);
    assert_eq!(tokens[0].provenance.depth, 0);
    assert_eq!(tokens[1].provenance.depth, 1);
    assert_eq!(tokens[2].provenance.depth, 1);
    assert_eq!(tokens[1].provenance.origins[0].text, "twice");
    assert_eq!(tokens[1].provenance.origins[0].loc.col, 27);
  }

  #[test]
  fn nested_macros_deepen_by_one_per_step() {
    let tokens = expand_src("macro a 1 end macro b a a end macro c b end c").unwrap();
    assert_eq!(texts(&tokens), vec!["1", "1"]);
    for token in &tokens {
      assert_eq!(token.provenance.depth, 3);
      let chain: Vec<_> = token.provenance.origins.iter().map(|o| o.text.as_str()).collect();
      assert_eq!(chain, vec!["a", "b", "c"]);
    }
  }

  #[test]
  fn macro_body_keeps_nested_blocks() {
    let tokens = expand_src("macro m 1 if 2 else 3 end while 1 do end end m").unwrap();
    assert_eq!(
      texts(&tokens),
      vec!["1", "if", "2", "else", "3", "end", "while", "1", "do", "end"]
    );
  }

  #[test]
  fn recursive_macro_hits_the_ceiling() {
    let err = expand_src("macro loop loop end loop").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExpansionLimit);
    assert!(matches!(err, CompileError::ExpansionLimit { depth: 1000, .. }));
  }

  #[test]
  fn configured_ceiling_is_respected() {
    let config = Config::default().with_expansion_limit(2);
    let tokens = tokenize("t.tau", "macro a 1 end a").unwrap();
    let tokens = expand(tokens, &config).unwrap();
    assert_eq!(tokens[0].provenance.depth, 1);

    let tokens = tokenize("t.tau", "macro a 1 end macro b a end b").unwrap();
    let err = expand(tokens, &config).unwrap_err();
    assert!(matches!(err, CompileError::ExpansionLimit { depth: 2, .. }));
  }

  #[test]
  fn ceiling_of_one_rejects_any_expansion() {
    let config = Config::default().with_expansion_limit(1);
    let tokens = tokenize("t.tau", "macro a 1 end a").unwrap();
    let err = expand(tokens, &config).unwrap_err();
    assert!(matches!(
      err,
      CompileError::ExpansionLimit {
        what: Expansion::Macro,
        depth: 1,
        ..
      }
    ));

    let tokens = tokenize("t.tau", "include \"x.tau\"").unwrap();
    let err = expand(tokens, &config).unwrap_err();
    assert!(matches!(
      err,
      CompileError::ExpansionLimit {
        what: Expansion::Include,
        depth: 1,
        ..
      }
    ));
  }

  #[test]
  fn macro_definition_errors() {
    let err = expand_src("macro m 1 end macro m 2 end").unwrap_err();
    assert!(matches!(err, CompileError::MacroRedefinition { ref first, .. } if first.col == 7));

    let err = expand_src("macro dup 1 end").unwrap_err();
    assert!(matches!(err, CompileError::MacroShadowsIntrinsic { .. }));

    let err = expand_src("macro 12 end").unwrap_err();
    assert!(matches!(err, CompileError::ExpectedMacroName { found: "an integer", .. }));

    let err = expand_src("macro").unwrap_err();
    assert!(matches!(err, CompileError::ExpectedMacroName { found: "nothing", .. }));

    let err = expand_src("macro m 1 if 2 end").unwrap_err();
    assert!(matches!(err, CompileError::UnclosedMacro { .. }));
    assert_eq!(err.kind(), ErrorKind::Structural);
  }

  #[test]
  fn unknown_words_pass_through() {
    let tokens = expand_src("foo 1").unwrap();
    assert_eq!(texts(&tokens), vec!["foo", "1"]);
  }

  #[test]
  fn include_searches_paths_in_order() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    fs::write(second.path().join("x.tau"), "macro seven 7 end\n8\n").unwrap();

    let config = Config {
      include_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
      ..Config::default()
    };
    let tokens = tokenize("main.tau", "include \"x.tau\" seven").unwrap();
    let tokens = expand(tokens, &config).unwrap();

    assert_eq!(texts(&tokens), vec!["8", "7"]);
    assert_eq!(tokens[0].provenance.depth, 1);
    assert_eq!(tokens[0].provenance.origins[0].text, "x.tau");
    assert!(tokens[0].loc.file.ends_with("x.tau"));
    // Replayed macro bodies are attributed to the call site only.
    assert_eq!(tokens[1].provenance.depth, 1);
    assert_eq!(tokens[1].provenance.origins.len(), 1);
    assert_eq!(tokens[1].provenance.origins[0].text, "seven");
  }

  #[test]
  fn include_errors() {
    let config = Config {
      include_paths: vec![PathBuf::from("/nonexistent-include-dir")],
      ..Config::default()
    };
    let tokens = tokenize("main.tau", "include \"missing.tau\"").unwrap();
    let err = expand(tokens, &config).unwrap_err();
    assert!(matches!(err, CompileError::IncludeNotFound { ref path, .. } if path == "missing.tau"));

    let err = expand_src("include 42").unwrap_err();
    assert!(matches!(err, CompileError::ExpectedIncludePath { found: "an integer", .. }));

    let err = expand_src("include").unwrap_err();
    assert!(matches!(err, CompileError::ExpectedIncludePath { found: "nothing", .. }));
  }

  #[test]
  fn self_including_file_hits_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("self.tau"), "include \"self.tau\"\n").unwrap();
    let config = Config {
      include_paths: vec![dir.path().to_path_buf()],
      ..Config::default()
    }
    .with_expansion_limit(8);

    let tokens = tokenize("main.tau", "include \"self.tau\"").unwrap();
    let err = expand(tokens, &config).unwrap_err();
    assert!(matches!(
      err,
      CompileError::ExpansionLimit {
        what: Expansion::Include,
        depth: 8,
        ..
      }
    ));
  }
}
