//! Development-time assertions over an in-memory plan.
//!
//! The codec trusts the planner and does not run these checks on every
//! mutation or on every decode — `validate` is a separate, explicit call
//! a planner's own test suite can make. A nil execution tree and a
//! pipeline element that isn't a Command/Redirect are both unrepresentable
//! in this crate's types (see [`crate::tree`]), so neither appears here;
//! every other invariant violation a frozen plan could have does.

use crate::error::PlanError;
use crate::plan::Plan;
use crate::tree::{ExecutionNode, PipelineElement, Step};
use std::collections::HashSet;

/// Walks `plan` and returns every invariant violation found. An empty
/// vec means the plan is valid. Does not mutate `plan` and does not
/// require it to be frozen.
pub fn validate(plan: &Plan) -> Vec<PlanError> {
    let mut problems = Vec::new();
    let mut seen_ids = HashSet::new();

    for step in plan.steps() {
        walk_step(step, &mut seen_ids, &mut problems);
    }

    if let Some(index) = first_out_of_order(&secret_use_keys(plan)) {
        problems.push(PlanError::UnsortedSecretUses(index));
    }

    let transport_ids: Vec<u64> = plan.transports().iter().map(|t| t.id).collect();
    if let Some(index) = first_out_of_order(&transport_ids) {
        problems.push(PlanError::UnsortedTransports(index));
    }

    problems
}

fn walk_step(step: &Step, seen_ids: &mut HashSet<u64>, problems: &mut Vec<PlanError>) {
    if !seen_ids.insert(step.id) {
        problems.push(PlanError::DuplicateStepId(step.id));
    }
    walk_node(&step.tree, seen_ids, problems);
}

fn walk_node(node: &ExecutionNode, seen_ids: &mut HashSet<u64>, problems: &mut Vec<PlanError>) {
    match node {
        ExecutionNode::Command(cmd) => {
            check_args_sorted(&cmd.args, problems);
            for step in &cmd.block {
                walk_step(step, seen_ids, problems);
            }
        }
        ExecutionNode::Pipeline { commands } => {
            for element in commands {
                match element {
                    PipelineElement::Command(cmd) => {
                        check_args_sorted(&cmd.args, problems);
                        for step in &cmd.block {
                            walk_step(step, seen_ids, problems);
                        }
                    }
                    PipelineElement::Redirect(redirect) => {
                        walk_node(&redirect.source, seen_ids, problems);
                        check_args_sorted(&redirect.target.args, problems);
                        for step in &redirect.target.block {
                            walk_step(step, seen_ids, problems);
                        }
                    }
                }
            }
        }
        ExecutionNode::And { left, right } | ExecutionNode::Or { left, right } => {
            walk_node(left, seen_ids, problems);
            walk_node(right, seen_ids, problems);
        }
        ExecutionNode::Sequence { nodes } => {
            for node in nodes {
                walk_node(node, seen_ids, problems);
            }
        }
        ExecutionNode::Logic { block, .. } => {
            for step in block {
                walk_step(step, seen_ids, problems);
            }
        }
        ExecutionNode::Try {
            try_block,
            catch_block,
            finally_block,
        } => {
            for step in try_block.iter().chain(catch_block).chain(finally_block) {
                walk_step(step, seen_ids, problems);
            }
        }
        ExecutionNode::Redirect(redirect) => {
            walk_node(&redirect.source, seen_ids, problems);
            check_args_sorted(&redirect.target.args, problems);
            for step in &redirect.target.block {
                walk_step(step, seen_ids, problems);
            }
        }
    }
}

fn check_args_sorted(args: &[crate::value::Arg], problems: &mut Vec<PlanError>) {
    for (index, pair) in args.windows(2).enumerate() {
        if pair[0].key > pair[1].key {
            problems.push(PlanError::UnsortedArgs(index));
        }
        if pair[0].key == pair[1].key {
            problems.push(PlanError::DuplicateArgKey(pair[0].key.clone()));
        }
    }
}

fn secret_use_keys(plan: &Plan) -> Vec<(String, String)> {
    plan.secret_uses()
        .iter()
        .map(|s| (s.display_id.clone(), s.site.clone()))
        .collect()
}

fn first_out_of_order<T: Ord>(items: &[T]) -> Option<usize> {
    items.windows(2).position(|pair| pair[0] > pair[1])
}
