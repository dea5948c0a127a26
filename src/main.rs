//! `tauc`: command-line driver.
//!
//! Compiles a `.tau` file to NASM assembly, then assembles and links it with
//! `nasm` and `ld`. Compile errors are printed as plain diagnostics on stderr.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tauc::config::DEFAULT_EXPANSION_LIMIT;
use tauc::{CompileError, Config};

const TAU_EXT: &str = ".tau";

#[derive(Parser)]
#[command(name = "tauc")]
#[command(version)]
#[command(about = "Compiler for the tau stack language", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
  /// Log every compilation stage
  #[arg(long)]
  debug: bool,

  /// Add a directory to the include search list
  #[arg(short = 'I', value_name = "PATH")]
  include: Vec<PathBuf>,

  /// Macro and include expansion limit
  #[arg(short = 'E', value_name = "LIMIT", default_value_t = DEFAULT_EXPANSION_LIMIT)]
  expansion_limit: usize,

  /// Disable type checking
  #[arg(long = "unsafe")]
  unsafe_mode: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile the program
  Com {
    /// Run the program after successful compilation
    #[arg(short = 'r')]
    run: bool,

    /// Customize the output path
    #[arg(short = 'o', value_name = "FILE|DIR")]
    output: Option<PathBuf>,

    /// Don't print any info about compilation phases
    #[arg(short = 's')]
    silent: bool,

    /// Program to compile
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Arguments passed to the program under `-r`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
  },

  /// Print this help and exit
  Help,
}

/// Accept the single-dash spellings of the global flags. Only arguments in
/// front of the subcommand are rewritten.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
  let mut in_globals = true;
  args
    .into_iter()
    .enumerate()
    .map(|(i, arg)| {
      if i == 0 || !in_globals {
        return arg;
      }
      match arg.to_str() {
        Some("-debug") => OsString::from("--debug"),
        Some("-unsafe") => OsString::from("--unsafe"),
        Some("com" | "help") => {
          in_globals = false;
          arg
        }
        _ => arg,
      }
    })
    .collect()
}

fn init_logging(debug: bool, silent: bool) {
  let level = if debug {
    "debug"
  } else if silent {
    "warn"
  } else {
    "info"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .without_time()
    .with_writer(std::io::stderr)
    .init();
}

/// Path of the produced binary, without extension.
fn output_base(input: &Path, output: Option<&Path>) -> PathBuf {
  let name = input
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  let stem = name.strip_suffix(TAU_EXT).unwrap_or(&name).to_string();

  match output {
    Some(dir) if dir.is_dir() => dir.join(stem),
    Some(file) => file.to_path_buf(),
    None => parent_dir(input).join(stem),
  }
}

fn parent_dir(path: &Path) -> PathBuf {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
  let mut path = base.as_os_str().to_owned();
  path.push(ext);
  PathBuf::from(path)
}

/// Echo and run an external command, returning its exit code.
fn run_command(program: impl AsRef<Path>, args: &[OsString]) -> i32 {
  let program = program.as_ref();
  let echo: Vec<_> = args.iter().map(|arg| arg.to_string_lossy()).collect();
  info!("[CMD] {} {}", program.display(), echo.join(" "));

  match Command::new(program).args(args).status() {
    Ok(status) => status.code().unwrap_or(1),
    Err(err) => {
      eprintln!("ERROR: could not run `{}`: {err}", program.display());
      1
    }
  }
}

fn compile(cli: &Cli, file: &Path, base: &Path) -> Result<(), CompileError> {
  let mut config = Config::default().with_expansion_limit(cli.expansion_limit);
  for path in &cli.include {
    config = config.with_include_path(path);
  }
  config = config.with_include_path(parent_dir(file));
  if cli.unsafe_mode {
    config = config.unsafe_mode();
  }

  let asm_path = with_extension(base, ".asm");
  info!("Generating {}", asm_path.display());
  let asm = tauc::compile_file(file, &config)?;
  fs::write(&asm_path, asm).map_err(|source| CompileError::Io {
    path: asm_path,
    source,
  })
}

fn main() {
  let cli = match Cli::try_parse_from(normalize_args(env::args_os())) {
    Ok(cli) => cli,
    Err(err) => {
      let code = if err.use_stderr() { 1 } else { 0 };
      if err.print().is_err() {
        process::exit(1);
      }
      process::exit(code);
    }
  };

  match &cli.command {
    Commands::Help => {
      if Cli::command().print_help().is_err() {
        process::exit(1);
      }
    }
    Commands::Com {
      run,
      output,
      silent,
      file,
      args,
    } => {
      init_logging(cli.debug, *silent);
      let base = output_base(file, output.as_deref());

      if let Err(err) = compile(&cli, file, &base) {
        eprintln!("{}", err.report());
        process::exit(1);
      }

      let asm_path = with_extension(&base, ".asm");
      let obj_path = with_extension(&base, ".o");
      let code = run_command("nasm", &["-felf64".into(), asm_path.into_os_string()]);
      if code != 0 {
        process::exit(code);
      }
      let code = run_command(
        "ld",
        &["-o".into(), base.clone().into_os_string(), obj_path.into_os_string()],
      );
      if code != 0 {
        process::exit(code);
      }

      if *run {
        // A bare file name would be looked up on PATH.
        let program = if base.is_absolute() {
          base
        } else {
          Path::new(".").join(base)
        };
        process::exit(run_command(&program, args));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn os(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
  }

  #[test]
  fn single_dash_globals_are_rewritten() {
    let args = normalize_args(os(&["tauc", "-debug", "-unsafe", "com", "-debug", "x.tau"]));
    assert_eq!(args, os(&["tauc", "--debug", "--unsafe", "com", "-debug", "x.tau"]));
  }

  #[test]
  fn cli_accepts_the_documented_surface() {
    let args = normalize_args(os(&[
      "tauc", "-debug", "-I", "lib", "-E", "12", "com", "-r", "-s", "-o", "out", "main.tau", "a",
      "-b",
    ]));
    let cli = Cli::try_parse_from(args).unwrap();
    assert!(cli.debug);
    assert_eq!(cli.include, vec![PathBuf::from("lib")]);
    assert_eq!(cli.expansion_limit, 12);
    let Commands::Com {
      run,
      silent,
      output,
      file,
      args,
    } = cli.command
    else {
      panic!("expected com");
    };
    assert!(run && silent);
    assert_eq!(output, Some(PathBuf::from("out")));
    assert_eq!(file, PathBuf::from("main.tau"));
    assert_eq!(args, os(&["a", "-b"]));
  }

  #[test]
  fn output_path_derivation() {
    assert_eq!(
      output_base(Path::new("demos/hello.tau"), None),
      PathBuf::from("demos/hello")
    );
    assert_eq!(output_base(Path::new("hello.tau"), None), PathBuf::from("./hello"));
    assert_eq!(output_base(Path::new("prog"), None), PathBuf::from("./prog"));

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
      output_base(Path::new("src/hello.tau"), Some(dir.path())),
      dir.path().join("hello")
    );
    let file = dir.path().join("bin");
    assert_eq!(output_base(Path::new("hello.tau"), Some(file.as_path())), file);
  }

  #[test]
  fn extensions_are_appended() {
    assert_eq!(with_extension(Path::new("out/a.b"), ".asm"), PathBuf::from("out/a.b.asm"));
  }
}
