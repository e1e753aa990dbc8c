//! The bounded decoder and verifier.
//!
//! Every count and length is checked against its bound *before* the
//! corresponding allocation is made. No byte input — truncated,
//! malformed, adversarially deep, or simply random — causes a panic;
//! every failure path returns a [`PlanError`] and no partial [`Plan`].

use super::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, FIXED_HEADER_LEN, KNOWN_FLAGS, MAGIC,
    MAX_DEPTH, MAX_FIELD_LEN, VERSION,
};
use crate::error::{PlanError, Result};
use crate::plan::{Plan, PlanHeader, PlanKind, SecretUse, Transport};
use crate::tree::{
    tag_variant_name, CommandNode, ExecutionNode, PipelineElement, RedirectMode, RedirectNode,
    Step,
};
use crate::value::{Arg, Value};

/// Limits a [`read`] call enforces. Mirrors
/// [`crate::codec::writer::WriterLimits`] but is independent — a reader
/// may be configured more conservatively than whatever wrote the bytes.
#[derive(Clone, Copy, Debug)]
pub struct ReaderLimits {
    pub max_header_bytes: u32,
    pub max_body_bytes: u32,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A decoded plan plus the digest recomputed from its bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadPlan {
    pub plan: Plan,
    pub digest: [u8; 32],
}

pub fn read(bytes: &[u8]) -> Result<ReadPlan> {
    read_with_limits(bytes, ReaderLimits::default())
}

pub fn read_with_limits(bytes: &[u8], limits: ReaderLimits) -> Result<ReadPlan> {
    let mut preamble = Cursor::new(bytes);

    let magic = preamble.read_bytes("magic", 4)?;
    if magic != MAGIC {
        return Err(PlanError::BadMagic);
    }

    let version = preamble.read_u16("version")?;
    if version != VERSION {
        return Err(PlanError::UnsupportedVersion(version));
    }

    let flags = preamble.read_u16("flags")?;
    if flags & !KNOWN_FLAGS != 0 {
        tracing::warn!(flags = format!("{flags:#06x}"), "rejected unknown flag bits");
        return Err(PlanError::UnsupportedFlags(flags));
    }
    if flags & super::FLAG_COMPRESSED != 0 {
        tracing::warn!("rejected plan with FlagCompressed set");
        return Err(PlanError::CompressedNotSupported);
    }
    if flags & super::FLAG_SIGNED != 0 {
        tracing::warn!("rejected plan with FlagSigned set");
        return Err(PlanError::SignedNotSupported);
    }

    let header_len = preamble.read_u32("header_len")? as usize;
    if header_len > limits.max_header_bytes as usize {
        return Err(PlanError::HeaderTooLarge {
            len: header_len,
            max: limits.max_header_bytes as usize,
        });
    }

    let body_len = preamble.read_u64("body_len")? as usize;
    if body_len > limits.max_body_bytes as usize {
        return Err(PlanError::BodyTooLarge {
            len: body_len,
            max: limits.max_body_bytes as usize,
        });
    }

    let header_bytes = preamble.read_bytes("header", header_len)?;
    let body_bytes = preamble.read_bytes("body", body_len)?;

    let (header, target) = read_header(header_bytes)?;
    let (steps, transports, plan_salt, secret_uses) = read_body(body_bytes)?;

    let digest = super::writer::compute_digest(&target, body_bytes);
    tracing::debug!(plan_target = %target, step_count = steps.len(), "plan decoded");
    let plan = Plan::from_parts(header, target, steps, transports, plan_salt, secret_uses);

    Ok(ReadPlan { plan, digest })
}

fn read_header(bytes: &[u8]) -> Result<(PlanHeader, String)> {
    let mut cur = Cursor::new(bytes);
    let schema_id: [u8; 16] = cur.read_bytes("schema_id", 16)?.try_into().unwrap();
    let created_at_nanos = cur.read_u64("created_at")?;
    let compiler: [u8; 16] = cur.read_bytes("compiler", 16)?.try_into().unwrap();
    let plan_kind_tag = cur.read_u8("plan_kind")?;
    let plan_kind =
        PlanKind::from_tag(plan_kind_tag).ok_or(PlanError::UnknownPlanKind(plan_kind_tag))?;
    let _reserved = cur.read_bytes("reserved", 3)?;
    let target = cur.read_str("target")?;

    let _ = FIXED_HEADER_LEN; // documents the 44-byte fixed prefix consumed above

    Ok((
        PlanHeader {
            schema_id,
            created_at_nanos,
            compiler,
            plan_kind,
        },
        target,
    ))
}

type BodyParts = (Vec<Step>, Vec<Transport>, Vec<u8>, Vec<SecretUse>);

fn read_body(bytes: &[u8]) -> Result<BodyParts> {
    let mut cur = Cursor::new(bytes);

    let step_count = cur.read_u16("step_count")?;
    let mut steps = Vec::with_capacity(step_count as usize);
    for _ in 0..step_count {
        steps.push(read_step(&mut cur, 1)?);
    }

    let transport_count = cur.read_u16("transport_count")?;
    let mut transports = Vec::with_capacity(transport_count as usize);
    for _ in 0..transport_count {
        transports.push(read_transport(&mut cur)?);
    }

    let plan_salt = cur.read_bytes("plan_salt", 32)?.to_vec();

    let secret_count = cur.read_u16("secret_use_count")?;
    let mut secret_uses = Vec::with_capacity(secret_count as usize);
    for _ in 0..secret_count {
        let display_id = cur.read_str("secret_use.display_id")?;
        let site_id = cur.read_str("secret_use.site_id")?;
        let site = cur.read_str("secret_use.site")?;
        secret_uses.push(SecretUse {
            display_id,
            site_id,
            site,
        });
    }

    Ok((steps, transports, plan_salt, secret_uses))
}

fn read_transport(cur: &mut Cursor<'_>) -> Result<Transport> {
    let id = cur.read_u64("transport.id")?;
    let decorator = cur.read_str("transport.decorator")?;
    let argc = cur.read_u16("transport.arg_count")?;
    let mut args = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        args.push(read_arg(cur)?);
    }
    let has_parent = cur.read_u8("transport.has_parent")?;
    let parent_id = if has_parent != 0 {
        Some(cur.read_u64("transport.parent_id")?)
    } else {
        None
    };
    Ok(Transport {
        id,
        decorator,
        args,
        parent_id,
    })
}

fn read_step(cur: &mut Cursor<'_>, depth: usize) -> Result<Step> {
    let id = cur.read_u64("step.id")?;
    let tree = read_node(cur, depth)?;
    Ok(Step { id, tree })
}

fn read_step_list(cur: &mut Cursor<'_>, field: &'static str, depth: usize) -> Result<Vec<Step>> {
    let count = cur.read_u16(field)?;
    let mut steps = Vec::with_capacity(count as usize);
    for _ in 0..count {
        steps.push(read_step(cur, depth)?);
    }
    Ok(steps)
}

fn read_node(cur: &mut Cursor<'_>, depth: usize) -> Result<ExecutionNode> {
    if depth > MAX_DEPTH {
        tracing::warn!(depth, max = MAX_DEPTH, "rejected plan exceeding max recursion depth");
        return Err(PlanError::DepthExceeded { max: MAX_DEPTH });
    }
    let tag = cur.read_u8("node_tag")?;
    match tag {
        0x01 => Ok(ExecutionNode::Command(read_command_fields(cur, depth)?)),
        0x02 => {
            let count = cur.read_u16("pipeline_count")?;
            let mut commands = Vec::with_capacity(count as usize);
            for _ in 0..count {
                commands.push(read_pipeline_element(cur, depth)?);
            }
            Ok(ExecutionNode::Pipeline { commands })
        }
        0x03 => {
            let left = Box::new(read_node(cur, depth + 1)?);
            let right = Box::new(read_node(cur, depth + 1)?);
            Ok(ExecutionNode::And { left, right })
        }
        0x04 => {
            let left = Box::new(read_node(cur, depth + 1)?);
            let right = Box::new(read_node(cur, depth + 1)?);
            Ok(ExecutionNode::Or { left, right })
        }
        0x05 => {
            let count = cur.read_u16("sequence_count")?;
            let mut nodes = Vec::with_capacity(count as usize);
            for _ in 0..count {
                nodes.push(read_node(cur, depth + 1)?);
            }
            Ok(ExecutionNode::Sequence { nodes })
        }
        0x06 => {
            let try_block = read_step_list(cur, "try_count", depth + 1)?;
            let catch_block = read_step_list(cur, "catch_count", depth + 1)?;
            let finally_block = read_step_list(cur, "finally_count", depth + 1)?;
            Ok(ExecutionNode::Try {
                try_block,
                catch_block,
                finally_block,
            })
        }
        0x07 => Ok(ExecutionNode::Redirect(read_redirect_fields(cur, depth)?)),
        0x08 => {
            let kind = cur.read_str("logic.kind")?;
            let condition = cur.read_str("logic.condition")?;
            let result = cur.read_str("logic.result")?;
            let block = read_step_list(cur, "logic_block_count", depth + 1)?;
            Ok(ExecutionNode::Logic {
                kind,
                condition,
                result,
                block,
            })
        }
        other => Err(PlanError::UnknownNodeType(other)),
    }
}

fn read_pipeline_element(cur: &mut Cursor<'_>, depth: usize) -> Result<PipelineElement> {
    let tag = cur.read_u8("pipeline_element_tag")?;
    match tag {
        0x01 => Ok(PipelineElement::Command(read_command_fields(cur, depth)?)),
        0x07 => Ok(PipelineElement::Redirect(read_redirect_fields(
            cur, depth,
        )?)),
        other => match tag_variant_name(other) {
            Some(name) => Err(PlanError::InvalidPipelineElement(name.to_string())),
            None => Err(PlanError::UnknownNodeType(other)),
        },
    }
}

/// Reads a redirect's fields once its `0x07` tag has already been
/// consumed by the caller ([`read_node`] or [`read_pipeline_element`]).
fn read_redirect_fields(cur: &mut Cursor<'_>, depth: usize) -> Result<RedirectNode> {
    let source = Box::new(read_node(cur, depth + 1)?);
    let target_tag = cur.read_u8("redirect.target_tag")?;
    if target_tag != 0x01 {
        let name = tag_variant_name(target_tag)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("{target_tag:#04x}"));
        return Err(PlanError::InvalidRedirectTarget(name));
    }
    let target = read_command_fields(cur, depth + 1)?;
    let mode_tag = cur.read_u8("redirect.mode")?;
    let mode = RedirectMode::from_tag(mode_tag).ok_or(PlanError::UnknownRedirectMode(mode_tag))?;
    Ok(RedirectNode {
        source,
        target,
        mode,
    })
}

fn read_command_fields(cur: &mut Cursor<'_>, depth: usize) -> Result<CommandNode> {
    let decorator = cur.read_str("command.decorator")?;
    let transport_id = cur.read_str("command.transport_id")?;
    let argc = cur.read_u16("arg_count")?;
    let mut args = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        args.push(read_arg(cur)?);
    }
    let block = read_step_list(cur, "block_step_count", depth + 1)?;
    Ok(CommandNode {
        decorator,
        transport_id,
        args,
        block,
    })
}

fn read_arg(cur: &mut Cursor<'_>) -> Result<Arg> {
    let key = cur.read_str("arg.key")?;
    let kind = cur.read_u8("arg.kind")?;
    let val = match kind {
        0x01 => Value::String(cur.read_str("arg.value.string")?),
        0x02 => Value::Int(cur.read_i64("arg.value.int")?),
        0x03 => Value::Bool(cur.read_u8("arg.value.bool")? != 0),
        0x04 => Value::Placeholder(cur.read_u32("arg.value.placeholder")?),
        other => return Err(PlanError::UnknownValueKind(other)),
    };
    Ok(Arg { key, val })
}

/// A bounded cursor over an in-memory byte slice. Every read checks
/// remaining length first; there is no way to read past the end.
///
/// `pub(crate)` so the contract envelope reader can parse its own
/// fixed fields with the same bounded primitives before handing the
/// embedded plan bytes to [`read`].
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn read_bytes(&mut self, field: &'static str, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(PlanError::Truncated {
                field,
                expected: n,
                actual: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.read_bytes(field, 1)?[0])
    }

    pub(crate) fn read_u16(&mut self, field: &'static str) -> Result<u16> {
        let bytes = self.read_bytes(field, 2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        let bytes = self.read_bytes(field, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64> {
        let bytes = self.read_bytes(field, 8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i64(&mut self, field: &'static str) -> Result<i64> {
        let bytes = self.read_bytes(field, 8)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Consumes and returns every byte from the current position to the
    /// end of the slice.
    pub(crate) fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub(crate) fn read_str(&mut self, field: &'static str) -> Result<String> {
        let len = self.read_u16(field)? as usize;
        if len > MAX_FIELD_LEN {
            return Err(PlanError::FieldTooLong {
                len,
                max: MAX_FIELD_LEN,
            });
        }
        let bytes = self.read_bytes(field, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PlanError::InvalidUtf8 { field })
    }
}
