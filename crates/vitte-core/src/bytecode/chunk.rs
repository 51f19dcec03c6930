//! Module F — the bytecode chunk: code buffer, run-length-encoded line
//! table, and deduplicated constant pool.

#[cfg(feature = "std")]
use std::{string::String, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use core::fmt;

use super::op::{decode_varint, encode_varint, encode_varint_padded, Op, MAX_OPERAND_LEN, RESERVED_INSTRUCTION_LEN};
use crate::list::List;
use crate::tag::Tag;
use crate::{crc32_ieee, ByteReader, ByteWriter};

const MAGIC: &[u8; 4] = b"CHNK";
const CHUNK_VERSION: u32 = 1;

/// Errors from [`Chunk::to_bytes`]/[`Chunk::from_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Malformed binary input; the `&'static str` names what failed.
    Format(&'static str),
    /// CRC32 stored in the trailer does not match the recomputed one.
    HashMismatch {
        /// Value stored in the file.
        expected: u32,
        /// Value recomputed while reading.
        found: u32,
    },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Format(msg) => write!(f, "malformed chunk: {msg}"),
            ChunkError::HashMismatch { expected, found } => {
                write!(f, "chunk hash mismatch: expected {expected:#010x}, found {found:#010x}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ChunkError {}

/// Flags carried alongside a chunk's code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkFlags {
    /// Debug metadata ([`DebugInfo`]) was discarded before shipping.
    pub stripped: bool,
}

/// Ambient, non-normative debug metadata (source file name). Not part of
/// the binary format, purely in-memory bookkeeping for tooling.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// Path or name of the primary source file, if known.
    pub main_file: Option<String>,
}

/// Run-length-encoded line table: `counts[i]` is the number of bytecode
/// bytes emitted while compiling 1-indexed source line `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    counts: Vec<u32>,
}

impl LineTable {
    /// Empty line table.
    pub fn new() -> Self {
        Self { counts: Vec::new() }
    }

    /// Records that `n_bytes` bytes were just emitted while on `line`.
    pub fn record(&mut self, line: u32, n_bytes: u32) {
        let idx = line.saturating_sub(1) as usize;
        if self.counts.len() <= idx {
            self.counts.resize(idx + 1, 0);
        }
        self.counts[idx] += n_bytes;
    }

    /// Cumulative-prefix-sum lookup: which source line emitted the byte at
    /// `offset`.
    pub fn line_for_offset(&self, offset: usize) -> u32 {
        let mut acc = 0usize;
        for (i, &count) in self.counts.iter().enumerate() {
            acc += count as usize;
            if offset < acc {
                return (i + 1) as u32;
            }
        }
        self.counts.len().max(1) as u32
    }

    fn as_slice(&self) -> &[u32] {
        &self.counts
    }
}

/// A compiled bytecode unit: code bytes, a line table, and a constant pool.
#[derive(Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    lines: LineTable,
    consts: List,
    flags: ChunkFlags,
    debug: DebugInfo,
}

impl Chunk {
    /// Empty chunk.
    pub fn new() -> Self {
        Self { code: Vec::new(), lines: LineTable::new(), consts: List::new(), flags: ChunkFlags::default(), debug: DebugInfo::default() }
    }

    /// Raw code bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Number of bytes emitted so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True if no bytes have been emitted.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The line table.
    pub fn lines(&self) -> &LineTable {
        &self.lines
    }

    /// The constant pool.
    pub fn consts(&self) -> &List {
        &self.consts
    }

    /// Flags.
    pub fn flags(&self) -> ChunkFlags {
        self.flags
    }

    /// Mutable flags.
    pub fn flags_mut(&mut self) -> &mut ChunkFlags {
        &mut self.flags
    }

    /// Debug info.
    pub fn debug(&self) -> &DebugInfo {
        &self.debug
    }

    /// Mutable debug info.
    pub fn debug_mut(&mut self) -> &mut DebugInfo {
        &mut self.debug
    }

    /// Looks up (or inserts) `t` in the constant pool by `tag_eq` **and**
    /// same runtime type, so e.g. `Double 1.0` and `Int64 1` are never
    /// collapsed despite being `tag_eq`. Returns a stable index.
    pub fn record_const(&mut self, t: Tag) -> usize {
        for i in 0..self.consts.len() {
            let existing = self.consts.get(i).unwrap();
            if existing.runtime_type_tag() == t.runtime_type_tag() && existing.tag_eq(&t) {
                return i;
            }
        }
        let idx = self.consts.len();
        self.consts.append(t).expect("const pool append");
        idx
    }

    fn emit_byte(&mut self, b: u8, line: u32) {
        self.code.push(b);
        self.lines.record(line, 1);
    }

    /// Emits a bare opcode with no operand.
    pub fn emit_op(&mut self, op: Op, line: u32) {
        self.emit_byte(op as u8, line);
    }

    /// Emits an opcode followed by its variable-length operand.
    pub fn emit_unary(&mut self, op: Op, operand: u64, line: u32) {
        self.emit_byte(op as u8, line);
        let mut buf = Vec::new();
        encode_varint(operand, &mut buf);
        for b in buf {
            self.emit_byte(b, line);
        }
    }

    /// Emits a 10-byte `OP_NOOP` placeholder (opcode byte + maximum-width
    /// operand) and returns its starting offset, to be filled in later by
    /// [`Chunk::patch_unary`] once the jump target is known.
    pub fn reserve_unary(&mut self, line: u32) -> usize {
        let start = self.code.len();
        for _ in 0..RESERVED_INSTRUCTION_LEN {
            self.emit_byte(Op::Noop as u8, line);
        }
        start
    }

    /// Overwrites a reservation made at `offset` with `op` and an operand of
    /// `(current_len - offset) - 10`, so decoding the instruction lands the
    /// instruction pointer exactly at the current end of the chunk. The
    /// 10-byte footprint never changes, so no later offset shifts.
    pub fn patch_unary(&mut self, offset: usize, op: Op) {
        let operand = (self.code.len() - offset - RESERVED_INSTRUCTION_LEN) as u64;
        self.code[offset] = op as u8;
        let mut buf = Vec::new();
        encode_varint_padded(operand, &mut buf);
        debug_assert_eq!(buf.len(), MAX_OPERAND_LEN);
        self.code[offset + 1..offset + 1 + MAX_OPERAND_LEN].copy_from_slice(&buf);
    }

    /// Emits `OP_LOOP` jumping backward to `loop_start` (an offset earlier
    /// captured via [`Chunk::len`]). The operand is the distance from just
    /// past this instruction back to `loop_start`, the mirror image of
    /// [`Chunk::patch_unary`]'s forward-jump distance. Like `patch_unary`,
    /// the operand is padded to exactly [`MAX_OPERAND_LEN`] bytes so the
    /// instruction's total footprint is always [`RESERVED_INSTRUCTION_LEN`]
    /// bytes, which the offset formula below assumes.
    pub fn emit_loop(&mut self, loop_start: usize, line: u32) {
        let offset = (self.code.len() + RESERVED_INSTRUCTION_LEN) - loop_start;
        self.emit_byte(Op::Loop as u8, line);
        let mut buf = Vec::new();
        encode_varint_padded(offset as u64, &mut buf);
        debug_assert_eq!(buf.len(), MAX_OPERAND_LEN);
        for b in buf {
            self.emit_byte(b, line);
        }
    }

    /// CRC32 (IEEE) over the code bytes, for quick equality checks in tests.
    pub fn compute_hash(&self) -> u32 {
        crc32_ieee(&self.code)
    }

    /// Serializes to the binary chunk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_bytes(MAGIC);
        w.write_u32_le(CHUNK_VERSION);
        w.write_u8(self.flags.stripped as u8);

        w.write_u32_le(self.code.len() as u32);
        w.write_bytes(&self.code);

        let line_counts = self.lines.as_slice();
        w.write_u32_le(line_counts.len() as u32);
        for &c in line_counts {
            w.write_u32_le(c);
        }

        w.write_u32_le(self.consts.len() as u32);
        for i in 0..self.consts.len() {
            write_const(&mut w, self.consts.get(i).unwrap());
        }

        let crc = crc32_ieee(w.as_slice());
        w.write_u32_le(crc);
        w.into_vec()
    }

    /// Parses the binary chunk format, verifying the CRC trailer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Chunk, ChunkError> {
        if bytes.len() < 4 {
            return Err(ChunkError::Format("truncated crc"));
        }
        let mut r = ByteReader::new(bytes);
        let magic = r.read_bytes(4).map_err(|_| ChunkError::Format("truncated magic"))?;
        if magic != MAGIC {
            return Err(ChunkError::Format("bad magic"));
        }
        let _version = r.read_u32_le().map_err(|_| ChunkError::Format("truncated version"))?;
        let stripped = r.read_u8().map_err(|_| ChunkError::Format("truncated flags"))? != 0;

        let code_len = r.read_u32_le().map_err(|_| ChunkError::Format("truncated code length"))? as usize;
        let code = r.read_bytes(code_len).map_err(|_| ChunkError::Format("truncated code"))?.to_vec();

        let line_count = r.read_u32_le().map_err(|_| ChunkError::Format("truncated line count"))? as usize;
        let mut counts = Vec::with_capacity(line_count);
        for _ in 0..line_count {
            counts.push(r.read_u32_le().map_err(|_| ChunkError::Format("truncated line table"))?);
        }

        let const_count = r.read_u32_le().map_err(|_| ChunkError::Format("truncated const count"))? as usize;
        let mut consts = List::new();
        for _ in 0..const_count {
            let t = read_const(&mut r)?;
            consts.append(t).map_err(|_| ChunkError::Format("const pool allocation failure"))?;
        }

        let found = crc32_ieee(&bytes[..bytes.len() - 4]);
        let expected = r.read_u32_le().map_err(|_| ChunkError::Format("truncated crc"))?;
        if found != expected {
            return Err(ChunkError::HashMismatch { expected, found });
        }

        Ok(Chunk {
            code,
            lines: LineTable { counts },
            consts,
            flags: ChunkFlags { stripped },
            debug: DebugInfo::default(),
        })
    }
}

const CONST_TAG_DOUBLE: u8 = 0;
const CONST_TAG_INT64: u8 = 1;
const CONST_TAG_PAIR: u8 = 2;
const CONST_TAG_SYMBOL: u8 = 3;
const CONST_TAG_STRING: u8 = 4;

fn write_const(w: &mut ByteWriter, t: &Tag) {
    if let Some(f) = t.as_f64() {
        w.write_u8(CONST_TAG_DOUBLE);
        w.write_f64_le(f);
    } else if let Some(i) = t.as_int64() {
        w.write_u8(CONST_TAG_INT64);
        w.write_i64_le(i);
    } else if let Some((a, b)) = t.pair_parts() {
        w.write_u8(CONST_TAG_PAIR);
        w.write_u16_le(a as u16);
        w.write_u32_le(b as u32);
    } else if let Some(code) = t.symbol_code() {
        w.write_u8(CONST_TAG_SYMBOL);
        w.write_u32_le(code);
    } else if let Some(bytes) = t.string_bytes() {
        w.write_u8(CONST_TAG_STRING);
        w.write_u32_le(bytes.len() as u32);
        w.write_bytes(bytes);
    } else {
        // Tables/Lists/Errors never appear as source literals, so the
        // compiler never asks the constant pool to hold one.
        unreachable!("unsupported constant-pool tag");
    }
}

fn read_const(r: &mut ByteReader<'_>) -> Result<Tag, ChunkError> {
    let kind = r.read_u8().map_err(|_| ChunkError::Format("truncated const tag"))?;
    Ok(match kind {
        CONST_TAG_DOUBLE => Tag::double(r.read_f64_le().map_err(|_| ChunkError::Format("truncated double const"))?),
        CONST_TAG_INT64 => Tag::boxed_int64(r.read_i64_le().map_err(|_| ChunkError::Format("truncated int64 const"))?),
        CONST_TAG_PAIR => {
            let a = r.read_u16_le().map_err(|_| ChunkError::Format("truncated pair const"))? as i16;
            let b = r.read_u32_le().map_err(|_| ChunkError::Format("truncated pair const"))? as i32;
            Tag::pair(a, b)
        }
        CONST_TAG_SYMBOL => {
            let code = r.read_u32_le().map_err(|_| ChunkError::Format("truncated symbol const"))?;
            Tag::symbol_raw(code)
        }
        CONST_TAG_STRING => {
            let len = r.read_u32_le().map_err(|_| ChunkError::Format("truncated string const length"))? as usize;
            let bytes = r.read_bytes(len).map_err(|_| ChunkError::Format("truncated string const bytes"))?;
            Tag::owned_string(bytes)
        }
        _ => return Err(ChunkError::Format("unknown const tag")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_and_line_lookup() {
        let mut c = Chunk::new();
        c.emit_op(Op::Nil, 1);
        c.emit_op(Op::Nil, 1);
        c.emit_op(Op::Return, 2);
        assert_eq!(c.lines().line_for_offset(0), 1);
        assert_eq!(c.lines().line_for_offset(1), 1);
        assert_eq!(c.lines().line_for_offset(2), 2);
    }

    #[test]
    fn reserve_and_patch_forward_jump() {
        let mut c = Chunk::new();
        c.emit_op(Op::True, 1);
        let reservation = c.reserve_unary(1);
        assert_eq!(reservation, 1);
        c.emit_op(Op::Pop, 1);
        c.emit_op(Op::Return, 1);
        c.patch_unary(reservation, Op::JumpIfFalse);
        assert_eq!(c.len(), 1 + RESERVED_INSTRUCTION_LEN + 2);

        let mut r = ByteReader::new(&c.code()[reservation..]);
        let op = Op::from_byte(r.read_u8().unwrap()).unwrap();
        assert_eq!(op, Op::JumpIfFalse);
        let operand = decode_varint(&mut r).unwrap();
        assert_eq!(operand as usize, c.len() - reservation - RESERVED_INSTRUCTION_LEN);
    }

    #[test]
    fn emit_loop_targets_loop_start() {
        let mut c = Chunk::new();
        c.emit_op(Op::Nil, 1);
        let loop_start = c.len();
        c.emit_op(Op::Pop, 1);
        let op_pos = c.len();
        c.emit_loop(loop_start, 1);

        // Decode independently of emit_loop's own offset formula: find the
        // instruction's real start, decode its operand, and measure how many
        // bytes were actually consumed instead of assuming a fixed width.
        let mut r = ByteReader::new(&c.code()[op_pos..]);
        let op = Op::from_byte(r.read_u8().unwrap()).unwrap();
        assert_eq!(op, Op::Loop);
        let decoded_operand = decode_varint(&mut r).unwrap() as usize;
        let post_operand_offset = op_pos + r.offset();
        assert_eq!(post_operand_offset - decoded_operand, loop_start);
        // The instruction's on-the-wire footprint must match patch_unary's
        // fixed width, or any later-emitted backward jump's distance math
        // (which assumes RESERVED_INSTRUCTION_LEN-byte instructions) breaks.
        assert_eq!(c.len() - op_pos, RESERVED_INSTRUCTION_LEN);
    }

    #[test]
    fn record_const_dedups_but_not_across_runtime_types() {
        let mut c = Chunk::new();
        let i0 = c.record_const(Tag::double(1.0));
        let i1 = c.record_const(Tag::double(1.0));
        let i2 = c.record_const(Tag::boxed_int64(1));
        assert_eq!(i0, i1);
        assert_ne!(i0, i2);
    }

    #[test]
    fn to_bytes_from_bytes_roundtrip() {
        let mut c = Chunk::new();
        let idx = c.record_const(Tag::double(42.0));
        c.emit_unary(Op::Constant, idx as u64, 1);
        c.emit_op(Op::Print, 1);
        c.emit_op(Op::Return, 2);

        let bytes = c.to_bytes();
        let back = Chunk::from_bytes(&bytes).unwrap();
        assert_eq!(back.code(), c.code());
        assert_eq!(back.consts().len(), 1);
        assert_eq!(back.consts().get(0).unwrap().as_f64(), Some(42.0));
    }

    #[test]
    fn from_bytes_rejects_bad_magic() {
        let err = Chunk::from_bytes(b"xxxx").unwrap_err();
        assert_eq!(err, ChunkError::Format("bad magic"));
    }

    #[test]
    fn from_bytes_detects_corruption() {
        let mut c = Chunk::new();
        c.emit_op(Op::Return, 1);
        let mut bytes = c.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Chunk::from_bytes(&bytes), Err(ChunkError::HashMismatch { .. })));
    }
}
