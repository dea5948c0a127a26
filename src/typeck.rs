//! Stack-effect type checker.
//!
//! The program is interpreted once over a stack of types instead of values.
//! Every entry remembers the token that produced it so leftovers can be
//! reported at their source. Blocks snapshot the stack on entry; the
//! snapshots are compared by type sequence when control flow joins again.

use std::mem;

use tracing::debug;

use crate::error::{CompileError, CompileResult, Join, Site};
use crate::intrinsic::Intrinsic;
use crate::parser::{OpKind, Program};
use crate::tokenizer::Token;
use crate::ty::{DataType, TypeSeq};

type Entry<'p> = (DataType, &'p Token);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
  If,
  Else,
  While,
  Do,
}

/// Verify the program and require the stack to be empty once it finishes.
pub fn check(program: &Program) -> CompileResult<()> {
  let stack = Checker::default().run(program)?;
  if let Some(&(_, token)) = stack.last() {
    return Err(CompileError::ResidualStack {
      site: Site::from(token),
      types: types(&stack),
    });
  }
  debug!(ops = program.len(), "type check passed");
  Ok(())
}

/// Type stack left behind by `program`, bottom first. Unlike `check`, a
/// non-empty result is not an error.
pub fn infer(program: &Program) -> CompileResult<Vec<DataType>> {
  let stack = Checker::default().run(program)?;
  Ok(stack.into_iter().map(|(ty, _)| ty).collect())
}

fn types(entries: &[Entry<'_>]) -> TypeSeq {
  entries.iter().map(|&(ty, _)| ty).collect()
}

fn same_types(a: &[Entry<'_>], b: &[Entry<'_>]) -> bool {
  a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.0 == y.0)
}

#[derive(Default)]
struct Checker<'p> {
  stack: Vec<Entry<'p>>,
  blocks: Vec<(Vec<Entry<'p>>, Block)>,
}

impl<'p> Checker<'p> {
  fn run(mut self, program: &'p Program) -> CompileResult<Vec<Entry<'p>>> {
    for op in program {
      let token = &op.token;
      match &op.kind {
        OpKind::PushInt(_) => self.push(DataType::Int, token),
        OpKind::PushStr(_) => {
          self.push(DataType::Int, token);
          self.push(DataType::Ptr, token);
        }
        OpKind::Intrinsic(intrinsic) => self.intrinsic(*intrinsic, token)?,
        OpKind::If { .. } => {
          self.condition("if-block", token)?;
          self.blocks.push((self.stack.clone(), Block::If));
        }
        OpKind::Else { .. } => {
          let Some((snapshot, Block::If)) = self.blocks.pop() else {
            return Err(CompileError::UnmatchedElse {
              site: Site::from(token),
            });
          };
          let then_branch = mem::replace(&mut self.stack, snapshot);
          self.blocks.push((then_branch, Block::Else));
        }
        OpKind::While => self.blocks.push((self.stack.clone(), Block::While)),
        OpKind::Do { .. } => {
          self.condition("while-do", token)?;
          self.blocks.push((self.stack.clone(), Block::Do));
        }
        OpKind::End { .. } => self.end(token)?,
      }
    }
    Ok(self.stack)
  }

  fn push(&mut self, ty: DataType, token: &'p Token) {
    self.stack.push((ty, token));
  }

  fn end(&mut self, token: &'p Token) -> CompileResult<()> {
    match self.blocks.pop() {
      Some((snapshot, Block::If)) => self.join(&snapshot, Join::IfWithoutElse, token),
      Some((snapshot, Block::Else)) => self.join(&snapshot, Join::IfElse, token),
      Some((after_cond, Block::Do)) => {
        let Some((before_loop, Block::While)) = self.blocks.pop() else {
          return Err(CompileError::UnmatchedEnd {
            site: Site::from(token),
          });
        };
        self.join(&before_loop, Join::WhileBody, token)?;
        self.stack = after_cond;
        Ok(())
      }
      Some((_, Block::While)) | None => Err(CompileError::UnmatchedEnd {
        site: Site::from(token),
      }),
    }
  }

  fn join(&self, expected: &[Entry<'p>], join: Join, token: &Token) -> CompileResult<()> {
    if same_types(expected, &self.stack) {
      return Ok(());
    }
    Err(CompileError::JoinMismatch {
      site: Site::from(token),
      join,
      expected: types(expected),
      actual: types(&self.stack),
    })
  }

  fn condition(&mut self, what: &'static str, token: &Token) -> CompileResult<()> {
    match self.stack.pop() {
      Some((DataType::Bool, _)) => Ok(()),
      Some((found, _)) => Err(CompileError::InvalidCondition {
        site: Site::from(token),
        what,
        found,
      }),
      None => Err(CompileError::NotEnoughArguments {
        site: Site::from(token),
        what: format!("the {what} condition"),
      }),
    }
  }

  fn require(&self, count: usize, intrinsic: Intrinsic, token: &Token) -> CompileResult<()> {
    if self.stack.len() < count {
      return Err(CompileError::NotEnoughArguments {
        site: Site::from(token),
        what: format!("the `{intrinsic}` intrinsic"),
      });
    }
    Ok(())
  }

  /// Pop the top `N` entries, bottom first.
  fn pop<const N: usize>(
    &mut self,
    intrinsic: Intrinsic,
    token: &Token,
  ) -> CompileResult<[Entry<'p>; N]> {
    self.require(N, intrinsic, token)?;
    let base = self.stack.len() - N;
    let entries = std::array::from_fn(|i| self.stack[base + i]);
    self.stack.truncate(base);
    Ok(entries)
  }

  fn pop_types<const N: usize>(
    &mut self,
    intrinsic: Intrinsic,
    token: &Token,
  ) -> CompileResult<[DataType; N]> {
    Ok(self.pop::<N>(intrinsic, token)?.map(|(ty, _)| ty))
  }

  fn intrinsic(&mut self, intrinsic: Intrinsic, token: &'p Token) -> CompileResult<()> {
    use DataType::{Bool, Int, Ptr};

    let invalid = |found: &[DataType]| CompileError::InvalidArguments {
      site: Site::from(token),
      what: format!("the `{intrinsic}` intrinsic"),
      found: found.iter().copied().collect(),
    };

    match intrinsic {
      Intrinsic::Plus => {
        let out = match self.pop_types::<2>(intrinsic, token)? {
          [Int, Int] => Int,
          [Int, Ptr] | [Ptr, Int] => Ptr,
          found => return Err(invalid(&found)),
        };
        self.push(out, token);
      }
      Intrinsic::Minus => {
        let out = match self.pop_types::<2>(intrinsic, token)? {
          [Int, Int] => Int,
          [Ptr, Int] => Ptr,
          found => return Err(invalid(&found)),
        };
        self.push(out, token);
      }
      Intrinsic::Mul | Intrinsic::Shr | Intrinsic::Shl => match self.pop_types::<2>(intrinsic, token)? {
        [Int, Int] => self.push(Int, token),
        found => return Err(invalid(&found)),
      },
      Intrinsic::DivMod => match self.pop_types::<2>(intrinsic, token)? {
        [Int, Int] => {
          self.push(Int, token);
          self.push(Int, token);
        }
        found => return Err(invalid(&found)),
      },
      Intrinsic::Eq
      | Intrinsic::Gt
      | Intrinsic::Lt
      | Intrinsic::Ge
      | Intrinsic::Le
      | Intrinsic::Ne => match self.pop_types::<2>(intrinsic, token)? {
        [Int, Int] => self.push(Bool, token),
        found => return Err(invalid(&found)),
      },
      Intrinsic::Or | Intrinsic::And => match self.pop_types::<2>(intrinsic, token)? {
        [a, b] if a == b && matches!(a, Int | Bool) => self.push(a, token),
        found => return Err(invalid(&found)),
      },
      Intrinsic::Not => match self.pop_types::<1>(intrinsic, token)? {
        [a @ (Int | Bool)] => self.push(a, token),
        found => return Err(invalid(&found)),
      },
      Intrinsic::Print | Intrinsic::Drop => {
        self.pop::<1>(intrinsic, token)?;
      }
      Intrinsic::Dup => {
        let [a] = self.pop::<1>(intrinsic, token)?;
        self.stack.extend([a, a]);
      }
      Intrinsic::Swap => {
        let [b, a] = self.pop::<2>(intrinsic, token)?;
        self.stack.extend([a, b]);
      }
      Intrinsic::Over => {
        let [b, a] = self.pop::<2>(intrinsic, token)?;
        self.stack.extend([b, a, b]);
      }
      Intrinsic::Rot => {
        let [c, b, a] = self.pop::<3>(intrinsic, token)?;
        self.stack.extend([b, a, c]);
      }
      Intrinsic::Mem => self.push(Ptr, token),
      Intrinsic::Load | Intrinsic::Load64 => match self.pop_types::<1>(intrinsic, token)? {
        [Ptr] => self.push(Int, token),
        found => return Err(invalid(&found)),
      },
      Intrinsic::Store => match self.pop_types::<2>(intrinsic, token)? {
        [Ptr, Int] => {}
        found => return Err(invalid(&found)),
      },
      Intrinsic::Store64 => match self.pop_types::<2>(intrinsic, token)? {
        [Ptr, Int | Ptr] => {}
        found => return Err(invalid(&found)),
      },
      Intrinsic::CastPtr => {
        let [(_, origin)] = self.pop::<1>(intrinsic, token)?;
        self.push(Ptr, origin);
      }
      Intrinsic::Argc => self.push(Int, token),
      Intrinsic::Argv => self.push(Ptr, token),
      Intrinsic::Here => {
        self.push(Int, token);
        self.push(Ptr, token);
      }
      Intrinsic::Syscall(arity) => {
        let count = usize::from(arity) + 1;
        self.require(count, intrinsic, token)?;
        self.stack.truncate(self.stack.len() - count);
        self.push(Int, token);
      }
    }
    Ok(())
  }
}
