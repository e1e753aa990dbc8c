//! Best-effort plaintext rendering of a decoded plan, behind the CLI's
//! `--template` flag. Not a polished formatter, just enough that a
//! human reading stdout can tell what a plan does.

use opal_plan::{CommandNode, ExecutionNode, Plan, PipelineElement, Value};

pub fn render(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!("target: {}\n", plan.target()));
    if let Some(hash) = plan.hash() {
        out.push_str(&format!("hash: {hash}\n"));
    }
    for step in plan.steps() {
        out.push_str(&format!("step {}:\n", step.id));
        render_node(&step.tree, 1, &mut out);
    }
    out
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn render_node(node: &ExecutionNode, depth: usize, out: &mut String) {
    match node {
        ExecutionNode::Command(cmd) => render_command(cmd, depth, out),
        ExecutionNode::Pipeline { commands } => {
            out.push_str(&format!("{}pipeline:\n", indent(depth)));
            for element in commands {
                match element {
                    PipelineElement::Command(cmd) => render_command(cmd, depth + 1, out),
                    PipelineElement::Redirect(redirect) => {
                        out.push_str(&format!(
                            "{}redirect ({:?}):\n",
                            indent(depth + 1),
                            redirect.mode
                        ));
                        render_node(&redirect.source, depth + 2, out);
                        render_command(&redirect.target, depth + 2, out);
                    }
                }
            }
        }
        ExecutionNode::And { left, right } => {
            out.push_str(&format!("{}and:\n", indent(depth)));
            render_node(left, depth + 1, out);
            render_node(right, depth + 1, out);
        }
        ExecutionNode::Or { left, right } => {
            out.push_str(&format!("{}or:\n", indent(depth)));
            render_node(left, depth + 1, out);
            render_node(right, depth + 1, out);
        }
        ExecutionNode::Sequence { nodes } => {
            out.push_str(&format!("{}sequence:\n", indent(depth)));
            for node in nodes {
                render_node(node, depth + 1, out);
            }
        }
        ExecutionNode::Logic {
            kind,
            condition,
            result,
            block,
        } => {
            out.push_str(&format!(
                "{}{kind} if {condition} -> {result}:\n",
                indent(depth)
            ));
            render_block(block, depth + 1, out);
        }
        ExecutionNode::Try {
            try_block,
            catch_block,
            finally_block,
        } => {
            out.push_str(&format!("{}try:\n", indent(depth)));
            render_block(try_block, depth + 1, out);
            if !catch_block.is_empty() {
                out.push_str(&format!("{}catch:\n", indent(depth)));
                render_block(catch_block, depth + 1, out);
            }
            if !finally_block.is_empty() {
                out.push_str(&format!("{}finally:\n", indent(depth)));
                render_block(finally_block, depth + 1, out);
            }
        }
        ExecutionNode::Redirect(redirect) => {
            out.push_str(&format!("{}redirect ({:?}):\n", indent(depth), redirect.mode));
            render_node(&redirect.source, depth + 1, out);
            render_command(&redirect.target, depth + 1, out);
        }
    }
}

fn render_block(steps: &[opal_plan::Step], depth: usize, out: &mut String) {
    for step in steps {
        out.push_str(&format!("{}step {}:\n", indent(depth), step.id));
        render_node(&step.tree, depth + 1, out);
    }
}

fn render_command(cmd: &CommandNode, depth: usize, out: &mut String) {
    out.push_str(&format!("{}{}", indent(depth), cmd.decorator));
    if !cmd.transport_id.is_empty() {
        out.push_str(&format!(" via {}", cmd.transport_id));
    }
    out.push('\n');
    for arg in &cmd.args {
        out.push_str(&format!(
            "{}{} = {}\n",
            indent(depth + 1),
            arg.key,
            render_value(&arg.val)
        ));
    }
    render_block(&cmd.block, depth + 1, out);
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Placeholder(p) => format!("<placeholder #{p}>"),
    }
}
