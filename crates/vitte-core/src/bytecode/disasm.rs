//! Human-readable listing of a chunk's code, for debugging and golden tests.

use super::chunk::Chunk;
use super::op::{decode_varint, Op};
use crate::tag::Tag;
use crate::ByteReader;

#[cfg(not(feature = "std"))]
use alloc::{format, string::String};
#[cfg(feature = "std")]
use std::{format, string::String};

use core::fmt::Write;

fn show_const(t: &Tag) -> String {
    if let Some(f) = t.as_f64() {
        format!("{f}")
    } else if let Some(i) = t.as_int64() {
        format!("{i}")
    } else if let Some(bytes) = t.string_bytes() {
        match core::str::from_utf8(bytes) {
            Ok(s) if s.chars().count() <= 64 => format!("\"{s}\""),
            Ok(s) => format!("\"{}...\"", s.chars().take(64).collect::<String>()),
            Err(_) => format!("bytes[{}]", bytes.len()),
        }
    } else {
        t.print()
    }
}

/// Disassembles every instruction in `chunk`, one per line: offset, source
/// line (only printed when it changes from the previous instruction),
/// mnemonic, and the resolved operand/constant if any.
pub fn disassemble(chunk: &Chunk, title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {title} == (consts={}, bytes={})", chunk.consts().len(), chunk.len());

    let mut r = ByteReader::new(chunk.code());
    let mut last_line: Option<u32> = None;
    loop {
        let offset = r.offset();
        if r.remaining() == 0 {
            break;
        }
        let line = chunk.lines().line_for_offset(offset);
        let line_col = if last_line == Some(line) { "   |".to_string() } else { format!("{line:4}") };
        last_line = Some(line);

        let op = match Op::from_byte(r.read_u8().expect("checked remaining above")) {
            Ok(op) => op,
            Err(_) => {
                let _ = writeln!(out, "{offset:04} {line_col} <invalid opcode>");
                break;
            }
        };

        if op.has_operand() {
            let operand = match decode_varint(&mut r) {
                Ok(v) => v,
                Err(_) => {
                    let _ = writeln!(out, "{offset:04} {line_col} {:<14} <truncated operand>", op.mnemonic());
                    break;
                }
            };
            if matches!(op, Op::Constant | Op::DefGlobal | Op::GetGlobal | Op::SetGlobal) {
                match chunk.consts().get(operand as usize) {
                    Some(t) => {
                        let _ = writeln!(out, "{offset:04} {line_col} {:<14} {:4} ; {}", op.mnemonic(), operand, show_const(t));
                    }
                    None => {
                        let _ = writeln!(out, "{offset:04} {line_col} {:<14} {:4} ; <out of range>", op.mnemonic(), operand);
                    }
                }
            } else {
                let _ = writeln!(out, "{offset:04} {line_col} {:<14} {:4}", op.mnemonic(), operand);
            }
        } else {
            let _ = writeln!(out, "{offset:04} {line_col} {}", op.mnemonic());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Op;

    #[test]
    fn lists_each_instruction() {
        let mut chunk = Chunk::new();
        let idx = chunk.record_const(Tag::double(7.0));
        chunk.emit_unary(Op::Constant, idx as u64, 1);
        chunk.emit_op(Op::Print, 1);
        chunk.emit_op(Op::Return, 2);

        let text = disassemble(&chunk, "test");
        assert!(text.contains("CONSTANT"));
        assert!(text.contains('7'));
        assert!(text.contains("PRINT"));
        assert!(text.contains("RETURN"));
    }

    #[test]
    fn repeats_no_line_number_when_unchanged() {
        let mut chunk = Chunk::new();
        chunk.emit_op(Op::Nil, 1);
        chunk.emit_op(Op::Pop, 1);
        let text = disassemble(&chunk, "test");
        let lines: Vec<&str> = text.lines().skip(1).collect();
        assert!(lines[1].trim_start().starts_with("0001    |"));
    }
}
