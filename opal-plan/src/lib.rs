//! Deterministic binary codec and contract engine for execution plans.
//!
//! A [`plan::Plan`] is a target plus an ordered tree of [`tree::Step`]s.
//! [`canon::canonicalize`] puts every order-insignificant collection
//! into a total order, [`codec::writer`] serializes the canonical form
//! and digests it, [`codec::reader`] decodes untrusted bytes back into
//! a `Plan` without ever panicking, and [`contract`] wraps a frozen
//! plan's digest in a portable envelope a downstream executor can
//! verify before it runs anything.

pub mod canon;
pub mod codec;
pub mod contract;
pub mod convert;
pub mod error;
pub mod idfactory;
pub mod plan;
pub mod tree;
pub mod validate;
pub mod value;

pub use error::{PlanError, Result};
pub use plan::{Plan, PlanHeader, PlanKind, SecretUse, Transport};
pub use tree::{CommandNode, ExecutionNode, PipelineElement, RedirectMode, RedirectNode, Step};
pub use value::{Arg, Value};
