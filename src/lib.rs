//! The `tauc` library: runs tau source through every compiler stage.
//!
//! Each stage fully materializes its output before the next one starts:
//! - `tokenizer` splits source text into located tokens.
//! - `expand` replays macro bodies and include files, tracking provenance.
//! - `parser` builds the flat program and resolves every jump target.
//! - `typeck` abstract-interprets the program over a stack of types.
//! - `codegen` lowers the program into NASM x86-64 assembly.
//! - `error` holds the diagnostics shared by the other modules.

pub mod codegen;
pub mod config;
pub mod error;
pub mod expand;
pub mod intrinsic;
pub mod parser;
pub mod tokenizer;
pub mod ty;
pub mod typeck;

use std::fs;
use std::path::Path;

use snafu::ResultExt;
use tracing::{debug, info_span};

pub use config::Config;
pub use error::{CompileError, CompileResult};

/// Compile a source string into NASM assembly. `file_name` is only used for
/// locations in diagnostics.
pub fn generate_assembly(file_name: &str, source: &str, config: &Config) -> CompileResult<String> {
  let tokens = {
    let _enter = info_span!("tokenize", file = file_name).entered();
    let tokens = tokenizer::tokenize(file_name, source)?;
    debug!(tokens = tokens.len(), "tokenized");
    tokens
  };

  let tokens = {
    let _enter = info_span!("expand").entered();
    expand::expand(tokens, config)?
  };

  let program = {
    let _enter = info_span!("parse").entered();
    parser::parse(tokens)?
  };

  if config.type_check {
    let _enter = info_span!("typeck").entered();
    typeck::check(&program)?;
  } else {
    debug!("type check skipped");
  }

  let _enter = info_span!("codegen").entered();
  codegen::generate(&program)
}

/// Read `path` and compile it.
pub fn compile_file(path: &Path, config: &Config) -> CompileResult<String> {
  let source = fs::read_to_string(path).context(error::IoSnafu { path })?;
  generate_assembly(&path.display().to_string(), &source, config)
}
