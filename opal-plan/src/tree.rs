//! Polymorphic execution-tree model.
//!
//! [`ExecutionNode`] is a tagged union dispatched by exhaustive pattern
//! matching at every traversal site (canonicalize, write, read, validate,
//! convert). There is no open trait object here on purpose: adding a
//! ninth variant must be a compile error everywhere it matters.
//!
//! Two structural invariants are pushed into the type system rather than
//! checked at runtime: a `Redirect`'s target is a [`CommandNode`], not an
//! arbitrary node, and a `Pipeline`'s elements are a [`PipelineElement`]
//! (`Command` or `Redirect`), not an arbitrary node. Both are impossible
//! to construct incorrectly in memory; the corresponding wire-format
//! errors only ever fire against untrusted bytes, in the reader.

use serde::{Deserialize, Serialize};

use crate::value::Arg;

/// One statement in a plan: a unique id plus the tree it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: u64,
    pub tree: ExecutionNode,
}

impl Step {
    pub fn new(id: u64, tree: ExecutionNode) -> Self {
        Self { id, tree }
    }
}

/// How a [`RedirectNode`] writes its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectMode {
    Overwrite,
    Append,
}

impl RedirectMode {
    pub(crate) fn tag(self) -> u8 {
        match self {
            RedirectMode::Overwrite => 0x00,
            RedirectMode::Append => 0x01,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(RedirectMode::Overwrite),
            0x01 => Some(RedirectMode::Append),
            _ => None,
        }
    }
}

/// A decorator invocation: a named step handler plus its keyed arguments
/// and an optional nested block (for decorators that scope a sub-plan,
/// e.g. a retry or a with-context wrapper).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandNode {
    pub decorator: String,
    pub transport_id: String,
    pub args: Vec<Arg>,
    pub block: Vec<Step>,
}

/// `source | target`, where `target` is always a command:
/// `Redirect{ source: ExecutionNode, target: Command, mode }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RedirectNode {
    pub source: Box<ExecutionNode>,
    pub target: CommandNode,
    pub mode: RedirectMode,
}

/// The restricted element type of a [`ExecutionNode::Pipeline`]: each
/// element must be a Command or a Redirect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PipelineElement {
    Command(CommandNode),
    Redirect(RedirectNode),
}

impl PipelineElement {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            PipelineElement::Command(_) => 0x01,
            PipelineElement::Redirect(_) => 0x07,
        }
    }
}

/// One node of the execution tree. Eight variants, tag codes `0x01..=0x08`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExecutionNode {
    Command(CommandNode),
    Pipeline {
        commands: Vec<PipelineElement>,
    },
    And {
        left: Box<ExecutionNode>,
        right: Box<ExecutionNode>,
    },
    Or {
        left: Box<ExecutionNode>,
        right: Box<ExecutionNode>,
    },
    Sequence {
        nodes: Vec<ExecutionNode>,
    },
    Logic {
        kind: String,
        condition: String,
        result: String,
        block: Vec<Step>,
    },
    Try {
        try_block: Vec<Step>,
        catch_block: Vec<Step>,
        finally_block: Vec<Step>,
    },
    Redirect(RedirectNode),
}

impl ExecutionNode {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            ExecutionNode::Command(_) => 0x01,
            ExecutionNode::Pipeline { .. } => 0x02,
            ExecutionNode::And { .. } => 0x03,
            ExecutionNode::Or { .. } => 0x04,
            ExecutionNode::Sequence { .. } => 0x05,
            ExecutionNode::Try { .. } => 0x06,
            ExecutionNode::Redirect(_) => 0x07,
            ExecutionNode::Logic { .. } => 0x08,
        }
    }

    /// Convenience constructor for a bare shell command with no nested block.
    pub fn command(
        decorator: impl Into<String>,
        transport_id: impl Into<String>,
        args: Vec<Arg>,
    ) -> Self {
        ExecutionNode::Command(CommandNode {
            decorator: decorator.into(),
            transport_id: transport_id.into(),
            args,
            block: Vec::new(),
        })
    }
}

/// Maps a node-tag byte to the variant name it would decode as, for
/// error messages such as `"pipeline must contain CommandNode or
/// RedirectNode, got <variant>"`. Returns `None` for tags the format
/// does not define at all (those produce `UnknownNodeType` instead).
pub(crate) fn tag_variant_name(tag: u8) -> Option<&'static str> {
    match tag {
        0x01 => Some("CommandNode"),
        0x02 => Some("PipelineNode"),
        0x03 => Some("AndNode"),
        0x04 => Some("OrNode"),
        0x05 => Some("SequenceNode"),
        0x06 => Some("TryNode"),
        0x07 => Some("RedirectNode"),
        0x08 => Some("LogicNode"),
        _ => None,
    }
}
