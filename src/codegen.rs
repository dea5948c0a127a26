//! Code generation: lower the resolved program into NASM x86-64 assembly.
//!
//! The emitter is a direct stack machine. Every op gets an `addr_N` label
//! equal to its address, so the jump targets computed by the program builder
//! are used as-is. String literals go into an append-only pool that is
//! emitted into `.data` after the program.

use tracing::debug;

use crate::error::{CompileError, CompileResult, Site};
use crate::intrinsic::Intrinsic;
use crate::parser::{Addr, Op, OpKind, Program};

/// Size of the flat buffer behind the `bit` intrinsic.
pub const MEM_CAPACITY: usize = 640_000;

/// Registers receiving syscall arguments, in order.
const SYSCALL_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "r10", "r8", "r9"];

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut asm = String::new();
  let mut strings: Vec<Vec<u8>> = Vec::new();

  asm.push_str("BITS 64\n");
  asm.push_str("section .text\n");
  asm.push_str("global _start\n");
  asm.push_str("_start:\n");
  asm.push_str("    mov [args_ptr], rsp\n");

  for (ip, op) in program.iter().enumerate() {
    asm.push_str(&format!("addr_{ip}:\n"));
    emit_op(ip, op, &mut asm, &mut strings)?;
  }

  asm.push_str(&format!("addr_{}:\n", program.len()));
  asm.push_str("    mov rax, 60\n");
  asm.push_str("    mov rdi, 0\n");
  asm.push_str("    syscall\n");

  emit_print(&mut asm);

  asm.push_str("section .bss\n");
  asm.push_str("args_ptr: resq 1\n");
  asm.push_str(&format!("mem: resb {MEM_CAPACITY}\n"));
  asm.push_str("print_buf: resb 32\n");

  asm.push_str("section .data\n");
  for (i, bytes) in strings.iter().enumerate() {
    if bytes.is_empty() {
      asm.push_str(&format!("str_{i}:\n"));
      continue;
    }
    let data: Vec<String> = bytes.iter().map(|b| format!("{b:#04x}")).collect();
    asm.push_str(&format!("str_{i}: db {}\n", data.join(",")));
  }

  debug!(ops = program.len(), strings = strings.len(), "assembly emitted");
  Ok(asm)
}

fn resolved(op: &Op) -> CompileResult<Addr> {
  op.target().ok_or_else(|| CompileError::Unresolved {
    site: Site::from(&op.token),
    text: op.token.text.clone(),
  })
}

fn push_string(bytes: Vec<u8>, asm: &mut String, strings: &mut Vec<Vec<u8>>) {
  asm.push_str(&format!("    mov rax, {}\n", bytes.len()));
  asm.push_str("    push rax\n");
  asm.push_str(&format!("    push str_{}\n", strings.len()));
  strings.push(bytes);
}

fn emit_op(ip: Addr, op: &Op, asm: &mut String, strings: &mut Vec<Vec<u8>>) -> CompileResult<()> {
  match &op.kind {
    OpKind::PushInt(value) => {
      asm.push_str(&format!("    ;-- push int {value} --\n"));
      asm.push_str(&format!("    mov rax, {value}\n"));
      asm.push_str("    push rax\n");
    }
    OpKind::PushStr(bytes) => {
      asm.push_str("    ;-- push str --\n");
      push_string(bytes.clone(), asm, strings);
    }
    OpKind::Intrinsic(intrinsic) => {
      asm.push_str(&format!("    ;-- {intrinsic} --\n"));
      emit_intrinsic(*intrinsic, op, asm, strings);
    }
    OpKind::If { .. } | OpKind::Do { .. } => {
      asm.push_str(&format!("    ;-- {} --\n", op.token.text));
      asm.push_str("    pop rax\n");
      asm.push_str("    test rax, rax\n");
      asm.push_str(&format!("    jz addr_{}\n", resolved(op)?));
    }
    OpKind::Else { .. } => {
      asm.push_str("    ;-- else --\n");
      asm.push_str(&format!("    jmp addr_{}\n", resolved(op)?));
    }
    OpKind::While => asm.push_str("    ;-- while --\n"),
    OpKind::End { target } => {
      asm.push_str("    ;-- end --\n");
      if *target != ip + 1 {
        asm.push_str(&format!("    jmp addr_{target}\n"));
      }
    }
  }
  Ok(())
}

fn emit_binary(asm: &mut String, body: &str) {
  asm.push_str("    pop rbx\n");
  asm.push_str("    pop rax\n");
  asm.push_str(body);
  asm.push_str("    push rax\n");
}

fn emit_compare(asm: &mut String, cmov: &str) {
  asm.push_str("    mov rcx, 0\n");
  asm.push_str("    mov rdx, 1\n");
  asm.push_str("    pop rbx\n");
  asm.push_str("    pop rax\n");
  asm.push_str("    cmp rax, rbx\n");
  asm.push_str(&format!("    {cmov} rcx, rdx\n"));
  asm.push_str("    push rcx\n");
}

/// Emit one intrinsic. Binary ops see the second operand in `rbx` and the
/// first in `rax`.
fn emit_intrinsic(intrinsic: Intrinsic, op: &Op, asm: &mut String, strings: &mut Vec<Vec<u8>>) {
  match intrinsic {
    Intrinsic::Plus => emit_binary(asm, "    add rax, rbx\n"),
    Intrinsic::Minus => emit_binary(asm, "    sub rax, rbx\n"),
    Intrinsic::Mul => emit_binary(asm, "    imul rax, rbx\n"),
    Intrinsic::Or => emit_binary(asm, "    or rax, rbx\n"),
    Intrinsic::And => emit_binary(asm, "    and rax, rbx\n"),
    Intrinsic::Shr => {
      asm.push_str("    pop rcx\n");
      asm.push_str("    pop rax\n");
      asm.push_str("    shr rax, cl\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::Shl => {
      asm.push_str("    pop rcx\n");
      asm.push_str("    pop rax\n");
      asm.push_str("    shl rax, cl\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::DivMod => {
      asm.push_str("    pop rbx\n");
      asm.push_str("    pop rax\n");
      asm.push_str("    cqo\n");
      asm.push_str("    idiv rbx\n");
      asm.push_str("    push rax\n");
      asm.push_str("    push rdx\n");
    }
    // Bitwise, so a true BOOL (1) becomes -2, which is still truthy.
    Intrinsic::Not => {
      asm.push_str("    pop rax\n");
      asm.push_str("    not rax\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::Print => {
      asm.push_str("    pop rdi\n");
      asm.push_str("    call print\n");
    }
    Intrinsic::Eq => emit_compare(asm, "cmove"),
    Intrinsic::Gt => emit_compare(asm, "cmovg"),
    Intrinsic::Lt => emit_compare(asm, "cmovl"),
    Intrinsic::Ge => emit_compare(asm, "cmovge"),
    Intrinsic::Le => emit_compare(asm, "cmovle"),
    Intrinsic::Ne => emit_compare(asm, "cmovne"),
    Intrinsic::Dup => {
      asm.push_str("    pop rax\n");
      asm.push_str("    push rax\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::Swap => {
      asm.push_str("    pop rax\n");
      asm.push_str("    pop rbx\n");
      asm.push_str("    push rax\n");
      asm.push_str("    push rbx\n");
    }
    Intrinsic::Drop => asm.push_str("    pop rax\n"),
    Intrinsic::Over => {
      asm.push_str("    pop rax\n");
      asm.push_str("    pop rbx\n");
      asm.push_str("    push rbx\n");
      asm.push_str("    push rax\n");
      asm.push_str("    push rbx\n");
    }
    Intrinsic::Rot => {
      asm.push_str("    pop rax\n");
      asm.push_str("    pop rbx\n");
      asm.push_str("    pop rcx\n");
      asm.push_str("    push rbx\n");
      asm.push_str("    push rax\n");
      asm.push_str("    push rcx\n");
    }
    Intrinsic::Mem => asm.push_str("    push mem\n"),
    Intrinsic::Load => {
      asm.push_str("    pop rax\n");
      asm.push_str("    xor rbx, rbx\n");
      asm.push_str("    mov bl, [rax]\n");
      asm.push_str("    push rbx\n");
    }
    Intrinsic::Store => {
      asm.push_str("    pop rbx\n");
      asm.push_str("    pop rax\n");
      asm.push_str("    mov [rax], bl\n");
    }
    Intrinsic::Load64 => {
      asm.push_str("    pop rax\n");
      asm.push_str("    mov rbx, [rax]\n");
      asm.push_str("    push rbx\n");
    }
    Intrinsic::Store64 => {
      asm.push_str("    pop rbx\n");
      asm.push_str("    pop rax\n");
      asm.push_str("    mov [rax], rbx\n");
    }
    // Only the type changes.
    Intrinsic::CastPtr => {}
    Intrinsic::Argc => {
      asm.push_str("    mov rax, [args_ptr]\n");
      asm.push_str("    mov rax, [rax]\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::Argv => {
      asm.push_str("    mov rax, [args_ptr]\n");
      asm.push_str("    add rax, 8\n");
      asm.push_str("    push rax\n");
    }
    Intrinsic::Here => {
      let here = op.token.loc.to_string().into_bytes();
      push_string(here, asm, strings);
    }
    Intrinsic::Syscall(arity) => {
      asm.push_str("    pop rax\n");
      for reg in SYSCALL_REGS.iter().take(usize::from(arity)) {
        asm.push_str(&format!("    pop {reg}\n"));
      }
      asm.push_str("    syscall\n");
      asm.push_str("    push rax\n");
    }
  }
}

/// Signed decimal printer. Takes the value in `rdi`, builds the digits
/// backwards from the end of `print_buf` and writes them with a newline.
fn emit_print(asm: &mut String) {
  asm.push_str("print:\n");
  asm.push_str("    mov rax, rdi\n");
  asm.push_str("    lea rsi, [print_buf + 31]\n");
  asm.push_str("    mov byte [rsi], 10\n");
  asm.push_str("    mov rcx, 1\n");
  asm.push_str("    mov r8, rax\n");
  asm.push_str("    test rax, rax\n");
  asm.push_str("    jns .digits\n");
  asm.push_str("    neg rax\n");
  asm.push_str(".digits:\n");
  asm.push_str("    mov rbx, 10\n");
  asm.push_str(".next:\n");
  asm.push_str("    xor rdx, rdx\n");
  asm.push_str("    div rbx\n");
  asm.push_str("    add dl, '0'\n");
  asm.push_str("    dec rsi\n");
  asm.push_str("    mov [rsi], dl\n");
  asm.push_str("    inc rcx\n");
  asm.push_str("    test rax, rax\n");
  asm.push_str("    jnz .next\n");
  asm.push_str("    test r8, r8\n");
  asm.push_str("    jns .write\n");
  asm.push_str("    dec rsi\n");
  asm.push_str("    mov byte [rsi], '-'\n");
  asm.push_str("    inc rcx\n");
  asm.push_str(".write:\n");
  asm.push_str("    mov rax, 1\n");
  asm.push_str("    mov rdi, 1\n");
  asm.push_str("    mov rdx, rcx\n");
  asm.push_str("    syscall\n");
  asm.push_str("    ret\n");
}
