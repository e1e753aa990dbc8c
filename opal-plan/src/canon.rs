//! Canonicalization: enforces the total order on every collection whose
//! source order is not semantically meaningful, and leaves semantically
//! significant order alone.
//!
//! `canonicalize` is idempotent — running it twice is the same as
//! running it once — which is exercised directly in the test suite.

use crate::plan::Plan;
use crate::tree::{ExecutionNode, PipelineElement, Step};

/// Canonicalizes a plan in place: sorts args within every Command,
/// sorts the plan's secret-uses and transports, pads an empty salt out
/// to 32 zero bytes (the wire's only representation of "no salt"), and
/// recurses into every node variant. Pipeline/Sequence/And/Or/Try
/// ordering and the top-level steps list are left untouched — they
/// carry execution semantics.
pub fn canonicalize(plan: &mut Plan) {
    let steps = take_steps(plan);
    let canon_steps: Vec<Step> = steps.into_iter().map(canonicalize_step).collect();
    restore_steps(plan, canon_steps);

    sort_secret_uses(plan);
    sort_transports(plan);
    plan.pad_salt_for_canonicalization();
}

fn canonicalize_step(mut step: Step) -> Step {
    step.tree = canonicalize_node(step.tree);
    step
}

fn canonicalize_node(node: ExecutionNode) -> ExecutionNode {
    match node {
        ExecutionNode::Command(mut cmd) => {
            cmd.args.sort_by(|a, b| a.key.cmp(&b.key));
            cmd.block = cmd.block.into_iter().map(canonicalize_step).collect();
            ExecutionNode::Command(cmd)
        }
        ExecutionNode::Pipeline { commands } => ExecutionNode::Pipeline {
            commands: commands
                .into_iter()
                .map(canonicalize_pipeline_element)
                .collect(),
        },
        ExecutionNode::And { left, right } => ExecutionNode::And {
            left: Box::new(canonicalize_node(*left)),
            right: Box::new(canonicalize_node(*right)),
        },
        ExecutionNode::Or { left, right } => ExecutionNode::Or {
            left: Box::new(canonicalize_node(*left)),
            right: Box::new(canonicalize_node(*right)),
        },
        ExecutionNode::Sequence { nodes } => ExecutionNode::Sequence {
            nodes: nodes.into_iter().map(canonicalize_node).collect(),
        },
        ExecutionNode::Logic {
            kind,
            condition,
            result,
            block,
        } => ExecutionNode::Logic {
            kind,
            condition,
            result,
            block: block.into_iter().map(canonicalize_step).collect(),
        },
        ExecutionNode::Try {
            try_block,
            catch_block,
            finally_block,
        } => ExecutionNode::Try {
            try_block: try_block.into_iter().map(canonicalize_step).collect(),
            catch_block: catch_block.into_iter().map(canonicalize_step).collect(),
            finally_block: finally_block.into_iter().map(canonicalize_step).collect(),
        },
        ExecutionNode::Redirect(mut redirect) => {
            redirect.source = Box::new(canonicalize_node(*redirect.source));
            redirect.target.args.sort_by(|a, b| a.key.cmp(&b.key));
            redirect.target.block = redirect
                .target
                .block
                .into_iter()
                .map(canonicalize_step)
                .collect();
            ExecutionNode::Redirect(redirect)
        }
    }
}

fn canonicalize_pipeline_element(element: PipelineElement) -> PipelineElement {
    match element {
        PipelineElement::Command(mut cmd) => {
            cmd.args.sort_by(|a, b| a.key.cmp(&b.key));
            cmd.block = cmd.block.into_iter().map(canonicalize_step).collect();
            PipelineElement::Command(cmd)
        }
        PipelineElement::Redirect(mut redirect) => {
            redirect.source = Box::new(canonicalize_node(*redirect.source));
            redirect.target.args.sort_by(|a, b| a.key.cmp(&b.key));
            redirect.target.block = redirect
                .target
                .block
                .into_iter()
                .map(canonicalize_step)
                .collect();
            PipelineElement::Redirect(redirect)
        }
    }
}

fn take_steps(plan: &mut Plan) -> Vec<Step> {
    plan.steps().to_vec()
}

fn restore_steps(plan: &mut Plan, steps: Vec<Step>) {
    // `Plan` exposes no public "replace all steps" mutator — freeze is
    // the only caller of canonicalize, and it owns the plan outright —
    // so this crate-internal door is narrow on purpose.
    plan.set_steps_for_canonicalization(steps);
}

fn sort_secret_uses(plan: &mut Plan) {
    let mut uses = plan.secret_uses().to_vec();
    uses.sort_by(|a, b| (&a.display_id, &a.site).cmp(&(&b.display_id, &b.site)));
    plan.set_secret_uses_for_canonicalization(uses);
}

fn sort_transports(plan: &mut Plan) {
    let mut transports = plan.transports().to_vec();
    transports.sort_by_key(|t| t.id);
    plan.set_transports_for_canonicalization(transports);
}
