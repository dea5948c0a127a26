//! Program builder: turns the expanded token stream into a flat list of ops.
//!
//! Blocks are resolved in the same pass. Openers push their own address onto
//! a stack and the matching `else`/`end` backpatches the jump target once the
//! destination is known. The index of an op in the program is its address.

use std::ops::Index;

use tracing::debug;

use crate::error::{CompileError, CompileResult, Site};
use crate::intrinsic::Intrinsic;
use crate::tokenizer::{Keyword, Token, TokenKind};

/// Index of an op inside its `Program`.
pub type Addr = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
  PushInt(i64),
  PushStr(Vec<u8>),
  Intrinsic(Intrinsic),
  /// Jumps to `target` when the condition is false.
  If { target: Option<Addr> },
  /// Skips the else-branch once the then-branch is done.
  Else { target: Option<Addr> },
  While,
  /// `cond` is the address of the matching `while`, `target` the loop exit.
  Do { cond: Addr, target: Option<Addr> },
  /// Either the fallthrough address or the `while` to loop back to.
  End { target: Addr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
  pub kind: OpKind,
  /// Token the op was built from, kept for diagnostics.
  pub token: Token,
}

impl Op {
  /// Jump destination, for ops that have one.
  pub fn target(&self) -> Option<Addr> {
    match &self.kind {
      OpKind::If { target } | OpKind::Else { target } | OpKind::Do { target, .. } => *target,
      OpKind::End { target } => Some(*target),
      OpKind::PushInt(_) | OpKind::PushStr(_) | OpKind::Intrinsic(_) | OpKind::While => None,
    }
  }
}

/// A fully resolved sequence of ops. Every jump target is an address in
/// `0..=len()`, where `len()` is the exit of the program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  ops: Vec<Op>,
}

impl Program {
  pub fn len(&self) -> usize {
    self.ops.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Op> {
    self.ops.iter()
  }
}

impl Index<Addr> for Program {
  type Output = Op;

  fn index(&self, addr: Addr) -> &Op {
    &self.ops[addr]
  }
}

impl<'a> IntoIterator for &'a Program {
  type Item = &'a Op;
  type IntoIter = std::slice::Iter<'a, Op>;

  fn into_iter(self) -> Self::IntoIter {
    self.ops.iter()
  }
}

/// Build the program from an expanded token stream.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut ops: Vec<Op> = Vec::with_capacity(tokens.len());
  // Addresses of blocks still waiting for their `else`, `do` or `end`.
  let mut blocks: Vec<Addr> = Vec::new();

  for token in tokens {
    let ip = ops.len();
    let kind = match &token.kind {
      TokenKind::Int(value) => OpKind::PushInt(*value),
      TokenKind::Char(byte) => OpKind::PushInt(i64::from(*byte)),
      TokenKind::Str(bytes) => OpKind::PushStr(bytes.clone()),
      TokenKind::Word => match Intrinsic::from_name(&token.text) {
        Some(intrinsic) => OpKind::Intrinsic(intrinsic),
        None => {
          return Err(CompileError::UnknownWord {
            site: Site::from(&token),
            word: token.text,
          });
        }
      },
      TokenKind::Keyword(Keyword::If) => {
        blocks.push(ip);
        OpKind::If { target: None }
      }
      TokenKind::Keyword(Keyword::Else) => {
        let Some(OpKind::If { target }) = opener(&mut ops, &mut blocks) else {
          return Err(CompileError::UnmatchedElse {
            site: Site::from(&token),
          });
        };
        patch(target, ip + 1);
        blocks.push(ip);
        OpKind::Else { target: None }
      }
      TokenKind::Keyword(Keyword::While) => {
        blocks.push(ip);
        OpKind::While
      }
      TokenKind::Keyword(Keyword::Do) => {
        let Some(cond) = blocks
          .pop()
          .filter(|&addr| ops[addr].kind == OpKind::While)
        else {
          return Err(CompileError::UnmatchedDo {
            site: Site::from(&token),
          });
        };
        blocks.push(ip);
        OpKind::Do { cond, target: None }
      }
      TokenKind::Keyword(Keyword::End) => {
        match opener(&mut ops, &mut blocks) {
          Some(OpKind::If { target } | OpKind::Else { target }) => {
            patch(target, ip);
            OpKind::End { target: ip + 1 }
          }
          Some(OpKind::Do { cond, target }) => {
            patch(target, ip + 1);
            OpKind::End { target: *cond }
          }
          _ => {
            return Err(CompileError::UnmatchedEnd {
              site: Site::from(&token),
            });
          }
        }
      }
      TokenKind::Keyword(Keyword::Macro | Keyword::Include) => {
        return Err(CompileError::Unexpanded {
          site: Site::from(&token),
          text: token.text,
        });
      }
    };
    ops.push(Op { kind, token });
  }

  if let Some(addr) = blocks.pop() {
    return Err(CompileError::UnclosedBlock {
      site: Site::from(&ops[addr].token),
    });
  }

  debug!(ops = ops.len(), "program built");
  Ok(Program { ops })
}

/// Pop the innermost pending block and return its op for patching.
fn opener<'a>(ops: &'a mut [Op], blocks: &mut Vec<Addr>) -> Option<&'a mut OpKind> {
  let addr = blocks.pop()?;
  Some(&mut ops[addr].kind)
}

fn patch(slot: &mut Option<Addr>, addr: Addr) {
  debug_assert!(slot.is_none(), "jump target patched twice");
  *slot = Some(addr);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::error::ErrorKind;
  use crate::expand::expand;
  use crate::tokenizer::tokenize;

  fn build(source: &str) -> CompileResult<Program> {
    parse(expand(tokenize("test.tau", source)?, &Config::default())?)
  }

  fn targets(program: &Program) -> Vec<Option<Addr>> {
    program.iter().map(Op::target).collect()
  }

  #[test]
  fn literals_and_intrinsics() {
    let program = build("34 'a' \"hi\" + prn").unwrap();
    let kinds: Vec<_> = program.iter().map(|op| op.kind.clone()).collect();
    assert_eq!(
      kinds,
      vec![
        OpKind::PushInt(34),
        OpKind::PushInt(97),
        OpKind::PushStr(b"hi".to_vec()),
        OpKind::Intrinsic(Intrinsic::Plus),
        OpKind::Intrinsic(Intrinsic::Print),
      ]
    );
  }

  #[test]
  fn if_else_end_targets() {
    // 0:1 1:2 2:= 3:if 4:10 5:else 6:20 7:end
    let program = build("1 2 = if 10 else 20 end").unwrap();
    assert_eq!(program[3].target(), Some(6));
    assert_eq!(program[5].target(), Some(7));
    assert_eq!(program[7].target(), Some(8));
  }

  #[test]
  fn if_without_else_jumps_to_end() {
    // 0:1 1:if 2:2 3:end
    let program = build("1 if 2 end").unwrap();
    assert_eq!(targets(&program), vec![None, Some(3), None, Some(4)]);
  }

  #[test]
  fn while_do_end_targets() {
    // 0:1 1:while 2:dup 3:0 4:> 5:do 6:1 7:- 8:end 9:drop
    let program = build("1 while dup 0 > do 1 - end drop").unwrap();
    assert_eq!(program[5].kind, OpKind::Do { cond: 1, target: Some(9) });
    assert_eq!(program[8].kind, OpKind::End { target: 1 });
  }

  #[test]
  fn nested_blocks_resolve_to_valid_addresses() {
    let program = build(
      "1 while dup 10 < do
         dup 2 divmod swap drop 0 = if
           dup prn
         else
           1 if 2 drop end
         end
         1 +
       end drop",
    )
    .unwrap();

    for (ip, op) in program.iter().enumerate() {
      if let Some(target) = op.target() {
        assert!(target <= program.len(), "op {ip} jumps out of the program");
        assert_ne!(target, ip, "op {ip} jumps to itself");
      }
    }
  }

  #[test]
  fn structural_errors() {
    let err = build("else").unwrap_err();
    assert!(matches!(err, CompileError::UnmatchedElse { .. }));

    let err = build("while 1 do 1 else end").unwrap_err();
    assert!(matches!(err, CompileError::UnmatchedElse { .. }));

    let err = build("1 do end").unwrap_err();
    assert!(matches!(err, CompileError::UnmatchedDo { .. }));

    let err = build("end").unwrap_err();
    assert!(matches!(err, CompileError::UnmatchedEnd { .. }));

    let err = build("while end").unwrap_err();
    assert!(matches!(err, CompileError::UnmatchedEnd { .. }));

    let err = build("1 if 1 while").unwrap_err();
    assert!(matches!(err, CompileError::UnclosedBlock { ref site } if site.loc.col == 8));
    assert_eq!(err.kind(), ErrorKind::Structural);
  }

  #[test]
  fn unknown_word_is_reported() {
    let err = build("1 frobnicate").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedName);
    assert_eq!(err.to_string(), "unknown word `frobnicate`");
  }
}
