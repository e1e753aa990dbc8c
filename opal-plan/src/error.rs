//! Structured error taxonomy for the plan codec.
//!
//! Every fallible operation in this crate returns [`PlanError`]. Display
//! strings are part of the contract: callers and tests match on the
//! rendered message, not just the variant, so wording changes here are
//! breaking changes.

use thiserror::Error;

/// The single error type returned by every `opal-plan` operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    // ── Format errors ──
    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported version {0:#06x}")]
    UnsupportedVersion(u16),

    #[error("unsupported flags {0:#06x}")]
    UnsupportedFlags(u16),

    #[error("compressed plans not yet supported")]
    CompressedNotSupported,

    #[error("signed plans not yet supported")]
    SignedNotSupported,

    #[error("unknown node type {0:#04x}")]
    UnknownNodeType(u8),

    #[error("unknown value kind {0:#04x}")]
    UnknownValueKind(u8),

    #[error("pipeline must contain CommandNode or RedirectNode, got {0}")]
    InvalidPipelineElement(String),

    #[error("redirect target must be CommandNode, got {0}")]
    InvalidRedirectTarget(String),

    #[error("invalid utf-8 while reading {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("unknown redirect mode {0:#04x}")]
    UnknownRedirectMode(u8),

    #[error("unrecognized contract type byte {0:#04x}")]
    UnknownContractType(u8),

    #[error("unknown plan kind {0:#04x}")]
    UnknownPlanKind(u8),

    // ── Bounds errors ──
    #[error("field length {len} exceeds maximum {max}")]
    FieldTooLong { len: usize, max: usize },

    #[error("header length {len} exceeds maximum {max}")]
    HeaderTooLarge { len: usize, max: usize },

    #[error("body length {len} exceeds maximum {max}")]
    BodyTooLarge { len: usize, max: usize },

    #[error("max recursion depth {max} exceeded")]
    DepthExceeded { max: usize },

    #[error("{field} count {count} exceeds maximum {max}")]
    CountExceeded {
        field: &'static str,
        count: usize,
        max: usize,
    },

    #[error("plan salt must be empty or exactly 32 bytes, got {0}")]
    InvalidSaltLength(usize),

    // ── Truncation errors ──
    #[error("truncated while reading {field}: expected {expected} bytes, got {actual}")]
    Truncated {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    // ── Invariant errors ──
    #[error("duplicate step id {0}")]
    DuplicateStepId(u64),

    #[error("args not sorted ascending by key at index {0}")]
    UnsortedArgs(usize),

    #[error("secret uses not sorted ascending by (display_id, site) at index {0}")]
    UnsortedSecretUses(usize),

    #[error("transports not sorted ascending by id at index {0}")]
    UnsortedTransports(usize),

    #[error("duplicate argument key {0:?} within one command")]
    DuplicateArgKey(String),

    // ── Mutation errors ──
    #[error("plan is frozen")]
    PlanFrozen,

    // ── Digest / contract errors ──
    #[error("digest mismatch: contract verification failed")]
    DigestMismatch,

    // ── I/O passthrough (for the CLI layer; the codec itself never touches disk) ──
    #[error("{0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, PlanError>;
