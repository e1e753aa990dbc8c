//! The encoder and digester.
//!
//! The writer buffers the header and body in full before emitting the
//! preamble, so the length fields are always exact — the byte-accounting
//! invariant `file_len == 20 + HDR_LEN + BODY_LEN` holds by construction,
//! never by coincidence. A returned error leaves no partial bytes
//! anywhere the caller can observe: nothing is written until every bound
//! has been checked.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use super::{
    CONTRACT_TYPE_BYTE, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, FIXED_HEADER_LEN, MAGIC,
    MAX_FIELD_LEN, VERSION,
};
use crate::error::{PlanError, Result};
use crate::plan::{Plan, Transport};
use crate::tree::{CommandNode, ExecutionNode, PipelineElement, RedirectNode, Step};
use crate::value::{Arg, Value};

/// Bounds a [`write`] call may be tightened against. Threaded through as
/// explicit configuration rather than a process-wide constant, so a
/// caller embedding this crate can raise or lower the ceiling per call.
#[derive(Clone, Copy, Debug)]
pub struct WriterLimits {
    pub max_body_bytes: u32,
}

impl Default for WriterLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// The on-wire bytes plus the digest computed over them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Written {
    pub bytes: Vec<u8>,
    pub digest: [u8; 32],
}

/// Serializes `plan` and computes its BLAKE2b-256 digest.
///
/// Does not canonicalize — callers that need canonical output (everyone
/// but the differ) should call [`crate::canon::canonicalize`] first, or
/// go through [`Plan::freeze`](crate::plan::Plan::freeze), which does.
pub fn write(plan: &Plan, limits: WriterLimits) -> Result<Written> {
    let header_buf = write_header(plan)?;
    if header_buf.len() > DEFAULT_MAX_HEADER_BYTES as usize {
        return Err(PlanError::HeaderTooLarge {
            len: header_buf.len(),
            max: DEFAULT_MAX_HEADER_BYTES as usize,
        });
    }

    let body_buf = write_body(plan)?;
    if body_buf.len() > limits.max_body_bytes as usize {
        return Err(PlanError::BodyTooLarge {
            len: body_buf.len(),
            max: limits.max_body_bytes as usize,
        });
    }

    let digest = compute_digest(plan.target(), &body_buf);
    tracing::debug!(
        plan_target = %plan.target(),
        header_len = header_buf.len(),
        body_len = body_buf.len(),
        "plan serialized"
    );

    let mut bytes = Vec::with_capacity(20 + header_buf.len() + body_buf.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes()); // flags: none set in v1.0
    bytes.extend_from_slice(&(header_buf.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(body_buf.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&header_buf);
    bytes.extend_from_slice(&body_buf);

    Ok(Written { bytes, digest })
}

/// BLAKE2b-256 over `target ‖ body`. Preamble and header bytes never
/// participate — `created_at`/`compiler` can drift without invalidating
/// a contract.
pub fn compute_digest(target: &str, body: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(target.as_bytes());
    hasher.update(body);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn write_header(plan: &Plan) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(FIXED_HEADER_LEN + 2);
    let header = plan.header();
    buf.extend_from_slice(&header.schema_id);
    buf.extend_from_slice(&header.created_at_nanos.to_le_bytes());
    buf.extend_from_slice(&header.compiler);
    buf.push(header.plan_kind.tag());
    buf.extend_from_slice(&[0u8; 3]);
    write_str(&mut buf, plan.target())?;
    Ok(buf)
}

fn write_body(plan: &Plan) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    write_step_list(&mut buf, "step_count", plan.steps())?;

    let transport_count = check_count("transport_count", plan.transports().len())?;
    buf.extend_from_slice(&transport_count.to_le_bytes());
    for transport in plan.transports() {
        write_transport(&mut buf, transport)?;
    }

    let salt = plan.plan_salt();
    if !salt.is_empty() && salt.len() != 32 {
        return Err(PlanError::InvalidSaltLength(salt.len()));
    }
    let mut salt32 = [0u8; 32];
    salt32[..salt.len()].copy_from_slice(salt);
    buf.extend_from_slice(&salt32);

    let secret_count = check_count("secret_use_count", plan.secret_uses().len())?;
    buf.extend_from_slice(&secret_count.to_le_bytes());
    for secret_use in plan.secret_uses() {
        write_str(&mut buf, &secret_use.display_id)?;
        write_str(&mut buf, &secret_use.site_id)?;
        write_str(&mut buf, &secret_use.site)?;
    }

    Ok(buf)
}

fn write_transport(buf: &mut Vec<u8>, transport: &Transport) -> Result<()> {
    buf.extend_from_slice(&transport.id.to_le_bytes());
    write_str(buf, &transport.decorator)?;
    let argc = check_count("transport_arg_count", transport.args.len())?;
    buf.extend_from_slice(&argc.to_le_bytes());
    for arg in &transport.args {
        write_arg(buf, arg)?;
    }
    match transport.parent_id {
        Some(parent_id) => {
            buf.push(1);
            buf.extend_from_slice(&parent_id.to_le_bytes());
        }
        None => buf.push(0),
    }
    Ok(())
}

fn write_step_list(buf: &mut Vec<u8>, field: &'static str, steps: &[Step]) -> Result<()> {
    let count = check_count(field, steps.len())?;
    buf.extend_from_slice(&count.to_le_bytes());
    for step in steps {
        write_step(buf, step)?;
    }
    Ok(())
}

fn write_step(buf: &mut Vec<u8>, step: &Step) -> Result<()> {
    buf.extend_from_slice(&step.id.to_le_bytes());
    write_node(buf, &step.tree)
}

fn write_node(buf: &mut Vec<u8>, node: &ExecutionNode) -> Result<()> {
    buf.push(node.tag());
    match node {
        ExecutionNode::Command(cmd) => write_command_fields(buf, cmd)?,
        ExecutionNode::Pipeline { commands } => {
            let count = check_count("pipeline_count", commands.len())?;
            buf.extend_from_slice(&count.to_le_bytes());
            for element in commands {
                write_pipeline_element(buf, element)?;
            }
        }
        ExecutionNode::And { left, right } | ExecutionNode::Or { left, right } => {
            write_node(buf, left)?;
            write_node(buf, right)?;
        }
        ExecutionNode::Sequence { nodes } => {
            let count = check_count("sequence_count", nodes.len())?;
            buf.extend_from_slice(&count.to_le_bytes());
            for node in nodes {
                write_node(buf, node)?;
            }
        }
        ExecutionNode::Logic {
            kind,
            condition,
            result,
            block,
        } => {
            write_str(buf, kind)?;
            write_str(buf, condition)?;
            write_str(buf, result)?;
            write_step_list(buf, "logic_block_count", block)?;
        }
        ExecutionNode::Try {
            try_block,
            catch_block,
            finally_block,
        } => {
            write_step_list(buf, "try_count", try_block)?;
            write_step_list(buf, "catch_count", catch_block)?;
            write_step_list(buf, "finally_count", finally_block)?;
        }
        ExecutionNode::Redirect(redirect) => write_redirect_fields(buf, redirect)?,
    }
    Ok(())
}

fn write_pipeline_element(buf: &mut Vec<u8>, element: &PipelineElement) -> Result<()> {
    buf.push(element.tag());
    match element {
        PipelineElement::Command(cmd) => write_command_fields(buf, cmd)?,
        PipelineElement::Redirect(redirect) => write_redirect_fields(buf, redirect)?,
    }
    Ok(())
}

fn write_redirect_fields(buf: &mut Vec<u8>, redirect: &RedirectNode) -> Result<()> {
    write_node(buf, &redirect.source)?;
    buf.push(0x01); // target is always a CommandNode
    write_command_fields(buf, &redirect.target)?;
    buf.push(redirect.mode.tag());
    Ok(())
}

fn write_command_fields(buf: &mut Vec<u8>, cmd: &CommandNode) -> Result<()> {
    write_str(buf, &cmd.decorator)?;
    write_str(buf, &cmd.transport_id)?;
    let argc = check_count("arg_count", cmd.args.len())?;
    buf.extend_from_slice(&argc.to_le_bytes());
    for arg in &cmd.args {
        write_arg(buf, arg)?;
    }
    write_step_list(buf, "block_step_count", &cmd.block)?;
    Ok(())
}

fn write_arg(buf: &mut Vec<u8>, arg: &Arg) -> Result<()> {
    write_str(buf, &arg.key)?;
    write_value(buf, &arg.val)
}

fn write_value(buf: &mut Vec<u8>, val: &Value) -> Result<()> {
    buf.push(val.tag());
    match val {
        Value::String(s) => write_str(buf, s)?,
        Value::Int(i) => buf.extend_from_slice(&i.to_le_bytes()),
        Value::Bool(b) => buf.push(if *b { 1 } else { 0 }),
        Value::Placeholder(p) => buf.extend_from_slice(&p.to_le_bytes()),
    }
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_FIELD_LEN {
        return Err(PlanError::FieldTooLong {
            len: bytes.len(),
            max: MAX_FIELD_LEN,
        });
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn check_count(field: &'static str, count: usize) -> Result<u16> {
    if count > u16::MAX as usize {
        return Err(PlanError::CountExceeded {
            field,
            count,
            max: u16::MAX as usize,
        });
    }
    Ok(count as u16)
}

#[allow(dead_code)]
const _ASSERT_CONTRACT_TYPE_DISTINCT: () = {
    // The contract type byte ('C' = 0x43) must never collide with a bit
    // pattern a bare plan's flags field can hold verbatim at the same
    // offset; both known flag bits together (0x03) are far below 0x43.
    assert!(CONTRACT_TYPE_BYTE as u16 > super::KNOWN_FLAGS);
};
