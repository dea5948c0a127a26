//! The closed table of built-in words.
//!
//! Every consumer (parser, type checker, code generator) matches on
//! `Intrinsic` exhaustively, so a new entry must be handled everywhere.

use std::fmt;

/// Highest arity accepted by `syscallN`.
pub const MAX_SYSCALL_ARITY: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
  Plus,
  Minus,
  Mul,
  DivMod,
  Print,
  Eq,
  Gt,
  Lt,
  Ge,
  Le,
  Ne,
  Shr,
  Shl,
  Or,
  And,
  Not,
  Dup,
  Swap,
  Drop,
  Over,
  Rot,
  Mem,
  Load,
  Store,
  Load64,
  Store64,
  CastPtr,
  Argc,
  Argv,
  Here,
  /// Number of arguments, not counting the syscall number.
  Syscall(u8),
}

impl Intrinsic {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "+" => Self::Plus,
      "-" => Self::Minus,
      "*" => Self::Mul,
      "divmod" => Self::DivMod,
      "prn" => Self::Print,
      "=" => Self::Eq,
      ">" => Self::Gt,
      "<" => Self::Lt,
      ">=" => Self::Ge,
      "<=" => Self::Le,
      "!=" => Self::Ne,
      ">>" => Self::Shr,
      "<<" => Self::Shl,
      "or" => Self::Or,
      "and" => Self::And,
      "not" => Self::Not,
      "dup" => Self::Dup,
      "swap" => Self::Swap,
      "drop" => Self::Drop,
      "over" => Self::Over,
      "rot" => Self::Rot,
      "bit" => Self::Mem,
      "." => Self::Store,
      "," => Self::Load,
      ".64" => Self::Store64,
      ",64" => Self::Load64,
      "cast(ptr)" => Self::CastPtr,
      "argc" => Self::Argc,
      "argv" => Self::Argv,
      "here" => Self::Here,
      _ => {
        let arity = name.strip_prefix("syscall")?;
        // Reject spellings like `syscall+3` or `syscall03`.
        if arity.len() != 1 {
          return None;
        }
        let arity = arity.parse::<u8>().ok()?;
        if arity > MAX_SYSCALL_ARITY {
          return None;
        }
        Self::Syscall(arity)
      }
    })
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::Plus => "+",
      Self::Minus => "-",
      Self::Mul => "*",
      Self::DivMod => "divmod",
      Self::Print => "prn",
      Self::Eq => "=",
      Self::Gt => ">",
      Self::Lt => "<",
      Self::Ge => ">=",
      Self::Le => "<=",
      Self::Ne => "!=",
      Self::Shr => ">>",
      Self::Shl => "<<",
      Self::Or => "or",
      Self::And => "and",
      Self::Not => "not",
      Self::Dup => "dup",
      Self::Swap => "swap",
      Self::Drop => "drop",
      Self::Over => "over",
      Self::Rot => "rot",
      Self::Mem => "bit",
      Self::Store => ".",
      Self::Load => ",",
      Self::Store64 => ".64",
      Self::Load64 => ",64",
      Self::CastPtr => "cast(ptr)",
      Self::Argc => "argc",
      Self::Argv => "argv",
      Self::Here => "here",
      Self::Syscall(0) => "syscall0",
      Self::Syscall(1) => "syscall1",
      Self::Syscall(2) => "syscall2",
      Self::Syscall(3) => "syscall3",
      Self::Syscall(4) => "syscall4",
      Self::Syscall(5) => "syscall5",
      Self::Syscall(_) => "syscall6",
    }
  }
}

impl fmt::Display for Intrinsic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
