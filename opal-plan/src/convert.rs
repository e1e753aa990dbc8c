//! The seam between a frozen plan and whatever actually runs it.
//!
//! This module only describes the boundary: [`ExecutorSink`] is a trait
//! an external executor implements, [`DecoratorRegistry`] is a plain
//! configuration struct threaded through conversion instead of a
//! process-wide global, and [`to_executor_view`] is a pure function
//! from one [`ExecutionNode`] to a flat, executor-friendly description.
//! Nothing here runs a shell command, spawns a process, or touches I/O.

use std::collections::HashMap;

use crate::tree::{CommandNode, ExecutionNode, PipelineElement, RedirectMode, RedirectNode};
use crate::value::Arg;

/// Resolves a decorator name to whatever an executor needs to dispatch
/// it (a binary path, a handler id, arbitrary metadata). Lookups never
/// mutate the registry and never fail the conversion — an unregistered
/// decorator simply rides through [`ExecutorView`] under its own name,
/// letting a minimal executor implement only the decorators it knows.
#[derive(Clone, Debug, Default)]
pub struct DecoratorRegistry {
    entries: HashMap<String, String>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decorator: impl Into<String>, handler: impl Into<String>) {
        self.entries.insert(decorator.into(), handler.into());
    }

    pub fn resolve<'a>(&'a self, decorator: &'a str) -> &'a str {
        self.entries
            .get(decorator)
            .map(String::as_str)
            .unwrap_or(decorator)
    }
}

/// A flat, executor-friendly description of one execution node. Every
/// [`ExecutionNode`] variant maps to exactly one `ExecutorView` variant;
/// nested trees keep their own nested `ExecutorView`s rather than being
/// flattened away, since execution order still depends on that nesting.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutorView {
    Command {
        handler: String,
        transport_id: String,
        args: Vec<Arg>,
    },
    Pipeline(Vec<ExecutorView>),
    And(Box<ExecutorView>, Box<ExecutorView>),
    Or(Box<ExecutorView>, Box<ExecutorView>),
    Sequence(Vec<ExecutorView>),
    Logic {
        kind: String,
        condition: String,
        result: String,
        has_block: bool,
    },
    Try {
        has_catch: bool,
        has_finally: bool,
    },
    Redirect {
        source: Box<ExecutorView>,
        target_handler: String,
        mode: RedirectMode,
    },
}

/// Implemented by an external executor to receive a plan's nodes as
/// they are converted, in whatever order the executor's own traversal
/// calls [`to_executor_view`]. This crate never calls `accept` itself.
pub trait ExecutorSink {
    fn accept(&mut self, view: ExecutorView);
}

/// Converts one [`ExecutionNode`] into its [`ExecutorView`], resolving
/// decorator names through `registry`. Recurses into nested nodes but
/// does not walk into a Command/Logic/Try block's nested [`crate::tree::Step`]s —
/// those are separate statements an executor schedules on its own.
pub fn to_executor_view(node: &ExecutionNode, registry: &DecoratorRegistry) -> ExecutorView {
    match node {
        ExecutionNode::Command(cmd) => command_view(cmd, registry),
        ExecutionNode::Pipeline { commands } => ExecutorView::Pipeline(
            commands
                .iter()
                .map(|element| pipeline_element_view(element, registry))
                .collect(),
        ),
        ExecutionNode::And { left, right } => ExecutorView::And(
            Box::new(to_executor_view(left, registry)),
            Box::new(to_executor_view(right, registry)),
        ),
        ExecutionNode::Or { left, right } => ExecutorView::Or(
            Box::new(to_executor_view(left, registry)),
            Box::new(to_executor_view(right, registry)),
        ),
        ExecutionNode::Sequence { nodes } => ExecutorView::Sequence(
            nodes
                .iter()
                .map(|node| to_executor_view(node, registry))
                .collect(),
        ),
        ExecutionNode::Logic {
            kind,
            condition,
            result,
            block,
        } => ExecutorView::Logic {
            kind: kind.clone(),
            condition: condition.clone(),
            result: result.clone(),
            has_block: !block.is_empty(),
        },
        ExecutionNode::Try {
            catch_block,
            finally_block,
            try_block: _,
        } => ExecutorView::Try {
            has_catch: !catch_block.is_empty(),
            has_finally: !finally_block.is_empty(),
        },
        ExecutionNode::Redirect(redirect) => redirect_view(redirect, registry),
    }
}

fn pipeline_element_view(element: &PipelineElement, registry: &DecoratorRegistry) -> ExecutorView {
    match element {
        PipelineElement::Command(cmd) => command_view(cmd, registry),
        PipelineElement::Redirect(redirect) => redirect_view(redirect, registry),
    }
}

fn redirect_view(redirect: &RedirectNode, registry: &DecoratorRegistry) -> ExecutorView {
    ExecutorView::Redirect {
        source: Box::new(to_executor_view(&redirect.source, registry)),
        target_handler: registry.resolve(&redirect.target.decorator).to_string(),
        mode: redirect.mode,
    }
}

fn command_view(cmd: &CommandNode, registry: &DecoratorRegistry) -> ExecutorView {
    ExecutorView::Command {
        handler: registry.resolve(&cmd.decorator).to_string(),
        transport_id: cmd.transport_id.clone(),
        args: cmd.args.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn unregistered_decorator_passes_through_by_name() {
        let registry = DecoratorRegistry::new();
        let node = ExecutionNode::command("shell", "local", vec![]);
        match to_executor_view(&node, &registry) {
            ExecutorView::Command { handler, .. } => assert_eq!(handler, "shell"),
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn registered_decorator_resolves_to_handler() {
        let mut registry = DecoratorRegistry::new();
        registry.register("shell", "/bin/sh-runner");
        let node = ExecutionNode::command(
            "shell",
            "local",
            vec![Arg::new("cmd", Value::String("ls".into()))],
        );
        match to_executor_view(&node, &registry) {
            ExecutorView::Command { handler, .. } => assert_eq!(handler, "/bin/sh-runner"),
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn and_or_preserve_nesting() {
        let registry = DecoratorRegistry::new();
        let node = ExecutionNode::And {
            left: Box::new(ExecutionNode::command("a", "t", vec![])),
            right: Box::new(ExecutionNode::command("b", "t", vec![])),
        };
        match to_executor_view(&node, &registry) {
            ExecutorView::And(left, right) => {
                assert!(matches!(*left, ExecutorView::Command { .. }));
                assert!(matches!(*right, ExecutorView::Command { .. }));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn logic_reports_whether_its_block_is_present() {
        use crate::tree::Step;

        let registry = DecoratorRegistry::new();

        let empty = ExecutionNode::Logic {
            kind: "if".to_string(),
            condition: "cond".to_string(),
            result: "true".to_string(),
            block: vec![],
        };
        match to_executor_view(&empty, &registry) {
            ExecutorView::Logic { has_block, .. } => assert!(!has_block),
            other => panic!("expected Logic, got {other:?}"),
        }

        let non_empty = ExecutionNode::Logic {
            kind: "if".to_string(),
            condition: "cond".to_string(),
            result: "true".to_string(),
            block: vec![Step::new(1, ExecutionNode::command("shell", "t", vec![]))],
        };
        match to_executor_view(&non_empty, &registry) {
            ExecutorView::Logic { has_block, .. } => assert!(has_block),
            other => panic!("expected Logic, got {other:?}"),
        }
    }
}
