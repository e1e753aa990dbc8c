//! Typed scalar union and keyed arguments.

use serde::{Deserialize, Serialize};

/// A value attached to an [`Arg`].
///
/// Tag codes `0x05`..`0x08` are reserved on the wire for `Float`,
/// `Duration`, `Array`, and `Map` but have no constructor in v1.0 — the
/// reader refuses to decode them (`UnknownValueKind`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    /// Index into an external placeholder table resolved by the executor.
    Placeholder(u32),
}

impl Value {
    /// The one-byte tag this value encodes as.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Value::String(_) => 0x01,
            Value::Int(_) => 0x02,
            Value::Bool(_) => 0x03,
            Value::Placeholder(_) => 0x04,
        }
    }
}

/// One `{ key, val }` pair inside a Command's argument list.
///
/// Keys are unique within a single Command; the canonical order is
/// ascending byte-lexicographic on `key` (enforced by the canonicalizer,
/// not by this type).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub key: String,
    pub val: Value,
}

impl Arg {
    pub fn new(key: impl Into<String>, val: Value) -> Self {
        Self {
            key: key.into(),
            val,
        }
    }
}
