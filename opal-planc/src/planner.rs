//! A minimal, explicitly demo-only JSON plan source.
//!
//! The real parser, decorator registry, and lowering pipeline that
//! would normally produce a `Plan` are an external collaborator this
//! crate does not implement. This module exists so the CLI has
//! something concrete to freeze, seal, and verify.

use serde::Deserialize;

use opal_plan::{
    Arg, CommandNode, ExecutionNode, PipelineElement, Plan, RedirectMode, RedirectNode,
    SecretUse, Step, Transport, Value,
};

#[derive(Deserialize)]
pub struct SourcePlan {
    pub target: String,
    #[serde(default)]
    pub salt_hex: Option<String>,
    #[serde(default)]
    pub steps: Vec<SourceStep>,
    #[serde(default)]
    pub transports: Vec<SourceTransport>,
    #[serde(default)]
    pub secret_uses: Vec<SourceSecretUse>,
}

#[derive(Deserialize)]
pub struct SourceStep {
    pub id: u64,
    pub tree: SourceNode,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceNode {
    Command {
        decorator: String,
        #[serde(default)]
        transport_id: String,
        #[serde(default)]
        args: Vec<SourceArg>,
        #[serde(default)]
        block: Vec<SourceStep>,
    },
    Pipeline {
        commands: Vec<SourcePipelineElement>,
    },
    And {
        left: Box<SourceNode>,
        right: Box<SourceNode>,
    },
    Or {
        left: Box<SourceNode>,
        right: Box<SourceNode>,
    },
    Sequence {
        nodes: Vec<SourceNode>,
    },
    Logic {
        kind: String,
        condition: String,
        result: String,
        #[serde(default)]
        block: Vec<SourceStep>,
    },
    Try {
        #[serde(default)]
        try_block: Vec<SourceStep>,
        #[serde(default)]
        catch_block: Vec<SourceStep>,
        #[serde(default)]
        finally_block: Vec<SourceStep>,
    },
    Redirect {
        source: Box<SourceNode>,
        target: SourceCommand,
        #[serde(default)]
        mode: SourceRedirectMode,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourcePipelineElement {
    Command {
        decorator: String,
        #[serde(default)]
        transport_id: String,
        #[serde(default)]
        args: Vec<SourceArg>,
        #[serde(default)]
        block: Vec<SourceStep>,
    },
    Redirect {
        source: Box<SourceNode>,
        target: SourceCommand,
        #[serde(default)]
        mode: SourceRedirectMode,
    },
}

#[derive(Deserialize)]
pub struct SourceCommand {
    pub decorator: String,
    #[serde(default)]
    pub transport_id: String,
    #[serde(default)]
    pub args: Vec<SourceArg>,
    #[serde(default)]
    pub block: Vec<SourceStep>,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SourceRedirectMode {
    #[default]
    Overwrite,
    Append,
}

#[derive(Deserialize)]
pub struct SourceArg {
    pub key: String,
    pub value: SourceValue,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceValue {
    String { value: String },
    Int { value: i64 },
    Bool { value: bool },
    Placeholder { value: u32 },
}

#[derive(Deserialize)]
pub struct SourceTransport {
    pub id: u64,
    pub decorator: String,
    #[serde(default)]
    pub args: Vec<SourceArg>,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct SourceSecretUse {
    pub display_id: String,
    pub site_id: String,
    pub site: String,
}

/// Builds a `Plan` from `source`, drawing a fresh OS-CSPRNG salt unless
/// the source pins one via `salt_hex`.
pub fn build_plan(source: SourcePlan) -> anyhow::Result<Plan> {
    let salt = match &source.salt_hex {
        Some(hex_str) => hex::decode(hex_str)?,
        None => {
            let mut plan = Plan::new(&source.target);
            plan.generate_salt()?;
            let salt = plan.plan_salt().to_vec();
            return build_plan_with_salt(source, salt);
        }
    };
    build_plan_with_salt(source, salt)
}

/// Builds a `Plan` from `source`, forcing `salt` regardless of what the
/// source's own `salt_hex` says. Used by `verify`, which must reuse a
/// contract's stored salt exactly to reproduce its digest.
pub fn build_plan_with_salt(source: SourcePlan, salt: Vec<u8>) -> anyhow::Result<Plan> {
    let mut plan = Plan::new(source.target);
    plan.set_salt(salt)?;

    for step in source.steps {
        plan.push_step(build_step(step)?)?;
    }
    for transport in source.transports {
        plan.add_transport(build_transport(transport)?)?;
    }
    for secret_use in source.secret_uses {
        plan.add_secret_use(SecretUse::new(
            secret_use.display_id,
            secret_use.site_id,
            secret_use.site,
        ))?;
    }

    Ok(plan)
}

fn build_step(step: SourceStep) -> anyhow::Result<Step> {
    Ok(Step::new(step.id, build_node(step.tree)?))
}

fn build_steps(steps: Vec<SourceStep>) -> anyhow::Result<Vec<Step>> {
    steps.into_iter().map(build_step).collect()
}

fn build_node(node: SourceNode) -> anyhow::Result<ExecutionNode> {
    Ok(match node {
        SourceNode::Command {
            decorator,
            transport_id,
            args,
            block,
        } => ExecutionNode::Command(CommandNode {
            decorator,
            transport_id,
            args: build_args(args)?,
            block: build_steps(block)?,
        }),
        SourceNode::Pipeline { commands } => ExecutionNode::Pipeline {
            commands: commands
                .into_iter()
                .map(build_pipeline_element)
                .collect::<anyhow::Result<_>>()?,
        },
        SourceNode::And { left, right } => ExecutionNode::And {
            left: Box::new(build_node(*left)?),
            right: Box::new(build_node(*right)?),
        },
        SourceNode::Or { left, right } => ExecutionNode::Or {
            left: Box::new(build_node(*left)?),
            right: Box::new(build_node(*right)?),
        },
        SourceNode::Sequence { nodes } => ExecutionNode::Sequence {
            nodes: nodes
                .into_iter()
                .map(build_node)
                .collect::<anyhow::Result<_>>()?,
        },
        SourceNode::Logic {
            kind,
            condition,
            result,
            block,
        } => ExecutionNode::Logic {
            kind,
            condition,
            result,
            block: build_steps(block)?,
        },
        SourceNode::Try {
            try_block,
            catch_block,
            finally_block,
        } => ExecutionNode::Try {
            try_block: build_steps(try_block)?,
            catch_block: build_steps(catch_block)?,
            finally_block: build_steps(finally_block)?,
        },
        SourceNode::Redirect {
            source,
            target,
            mode,
        } => ExecutionNode::Redirect(RedirectNode {
            source: Box::new(build_node(*source)?),
            target: build_command(target)?,
            mode: build_mode(mode),
        }),
    })
}

fn build_pipeline_element(element: SourcePipelineElement) -> anyhow::Result<PipelineElement> {
    Ok(match element {
        SourcePipelineElement::Command {
            decorator,
            transport_id,
            args,
            block,
        } => PipelineElement::Command(CommandNode {
            decorator,
            transport_id,
            args: build_args(args)?,
            block: build_steps(block)?,
        }),
        SourcePipelineElement::Redirect {
            source,
            target,
            mode,
        } => PipelineElement::Redirect(RedirectNode {
            source: Box::new(build_node(*source)?),
            target: build_command(target)?,
            mode: build_mode(mode),
        }),
    })
}

fn build_command(cmd: SourceCommand) -> anyhow::Result<CommandNode> {
    Ok(CommandNode {
        decorator: cmd.decorator,
        transport_id: cmd.transport_id,
        args: build_args(cmd.args)?,
        block: build_steps(cmd.block)?,
    })
}

fn build_args(args: Vec<SourceArg>) -> anyhow::Result<Vec<Arg>> {
    Ok(args
        .into_iter()
        .map(|a| Arg::new(a.key, build_value(a.value)))
        .collect())
}

fn build_value(value: SourceValue) -> Value {
    match value {
        SourceValue::String { value } => Value::String(value),
        SourceValue::Int { value } => Value::Int(value),
        SourceValue::Bool { value } => Value::Bool(value),
        SourceValue::Placeholder { value } => Value::Placeholder(value),
    }
}

fn build_mode(mode: SourceRedirectMode) -> RedirectMode {
    match mode {
        SourceRedirectMode::Overwrite => RedirectMode::Overwrite,
        SourceRedirectMode::Append => RedirectMode::Append,
    }
}

fn build_transport(transport: SourceTransport) -> anyhow::Result<Transport> {
    Ok(Transport {
        id: transport.id,
        decorator: transport.decorator,
        args: build_args(transport.args)?,
        parent_id: transport.parent_id,
    })
}
