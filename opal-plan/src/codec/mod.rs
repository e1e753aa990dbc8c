//! The on-disk plan format: preamble, header, body.

pub mod reader;
pub mod writer;

/// ASCII `OPAL`.
pub const MAGIC: [u8; 4] = *b"OPAL";

/// Current (and, for this crate, only) wire version: major 1, minor 0.
pub const VERSION: u16 = 0x0001;

pub const FLAG_COMPRESSED: u16 = 1 << 0;
pub const FLAG_SIGNED: u16 = 1 << 1;
/// Every bit this crate recognizes. Any bit outside this mask is rejected
/// with `unsupported flags`.
pub const KNOWN_FLAGS: u16 = FLAG_COMPRESSED | FLAG_SIGNED;

pub const DEFAULT_MAX_HEADER_BYTES: u32 = 64 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: u32 = 32 * 1024 * 1024;

/// Maximum recursion depth for execution-tree nesting.
pub const MAX_DEPTH: usize = 1000;

/// Maximum length of any length-prefixed string or byte field.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Fixed size of the non-target portion of [`crate::plan::PlanHeader`] on
/// the wire: 16 (schema id) + 8 (created_at) + 16 (compiler) + 1 (plan
/// kind) + 3 (reserved) = 44 bytes.
pub const FIXED_HEADER_LEN: usize = 44;

/// The byte at offset 6 that distinguishes a bare plan file (a flags
/// `u16`, never equal to `b'C'` as its low byte in practice for this
/// format) from a contract envelope (`TYPE = b'C'`).
pub const CONTRACT_TYPE_BYTE: u8 = b'C';
