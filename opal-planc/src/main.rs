//! Thin CLI wrapper around `opal-plan`.
//!
//! The real parser/planner is an external collaborator (see
//! `opal_plan`'s own module docs); `planner` here only understands a
//! minimal, explicitly demo-only JSON plan source so this binary has
//! something concrete to freeze, seal, and verify. It is not a
//! replacement for the planner, nor a general-purpose plan format.

use std::fs;
use std::process::ExitCode;

use opal_plan::codec::writer::WriterLimits;
use opal_plan::codec::{reader, DEFAULT_MAX_BODY_BYTES};
use opal_plan::contract;
use tracing_subscriber::EnvFilter;

mod planner;
mod render;

const EXIT_OK: u8 = 0;
const EXIT_BAD_ARGS: u8 = 1;
const EXIT_IO: u8 = 2;
const EXIT_PARSE: u8 = 3;
const EXIT_GENERATION: u8 = 4;

type CliError = (u8, String);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(std::env::args().skip(1).collect()) {
        Ok(code) => ExitCode::from(code),
        Err((code, message)) => {
            eprintln!("opal-planc: {message}");
            ExitCode::from(code)
        }
    }
}

fn run(args: Vec<String>) -> Result<u8, CliError> {
    let mut positional = Vec::new();
    let mut template = false;
    let mut max_body_bytes: Option<u32> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--template" => template = true,
            "--max-body-bytes" => {
                let value = iter.next().ok_or_else(|| {
                    (EXIT_BAD_ARGS, "--max-body-bytes requires a value".to_string())
                })?;
                max_body_bytes = Some(value.parse().map_err(|_| {
                    (EXIT_BAD_ARGS, format!("invalid --max-body-bytes value: {value:?}"))
                })?);
            }
            other => positional.push(other.to_string()),
        }
    }

    let limits = WriterLimits {
        max_body_bytes: max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
    };

    let mut positional = positional.into_iter();
    let command = positional.next().ok_or_else(|| {
        (
            EXIT_BAD_ARGS,
            "usage: opal-planc <plan|contract|verify> [--template] [--max-body-bytes N] ..."
                .to_string(),
        )
    })?;

    match command.as_str() {
        "plan" => cmd_plan(&mut positional, template, limits),
        "contract" => cmd_contract(&mut positional, template, limits),
        "verify" => cmd_verify(&mut positional),
        other => Err((EXIT_BAD_ARGS, format!("unknown subcommand {other:?}"))),
    }
}

fn next_path(args: &mut impl Iterator<Item = String>, name: &str) -> Result<String, CliError> {
    args.next()
        .ok_or_else(|| (EXIT_BAD_ARGS, format!("missing {name} argument")))
}

fn read_source(path: &str) -> Result<planner::SourcePlan, CliError> {
    let text = fs::read_to_string(path).map_err(|e| (EXIT_IO, format!("reading {path}: {e}")))?;
    serde_json::from_str(&text).map_err(|e| (EXIT_PARSE, format!("parsing {path}: {e}")))
}

fn cmd_plan(
    args: &mut impl Iterator<Item = String>,
    template: bool,
    limits: WriterLimits,
) -> Result<u8, CliError> {
    let source_path = next_path(args, "source.json")?;
    let out_path = next_path(args, "out.plan")?;

    let source = read_source(&source_path)?;
    let mut plan =
        planner::build_plan(source).map_err(|e| (EXIT_PARSE, format!("building plan: {e}")))?;
    plan.freeze_with_limits(limits)
        .map_err(|e| (EXIT_GENERATION, format!("freezing plan: {e}")))?;

    let written = opal_plan::codec::writer::write(&plan, limits)
        .map_err(|e| (EXIT_GENERATION, format!("writing plan: {e}")))?;
    fs::write(&out_path, &written.bytes)
        .map_err(|e| (EXIT_IO, format!("writing {out_path}: {e}")))?;

    tracing::info!(
        plan_target = %plan.target(),
        hash = plan.hash().unwrap_or_default(),
        "wrote plan file"
    );
    if template {
        print!("{}", render::render(&plan));
    }
    Ok(EXIT_OK)
}

fn cmd_contract(
    args: &mut impl Iterator<Item = String>,
    template: bool,
    limits: WriterLimits,
) -> Result<u8, CliError> {
    let source_path = next_path(args, "source.json")?;
    let out_path = next_path(args, "out.contract")?;

    let source = read_source(&source_path)?;
    let mut plan =
        planner::build_plan(source).map_err(|e| (EXIT_PARSE, format!("building plan: {e}")))?;

    let envelope = contract::seal_with_limits(&mut plan, limits)
        .map_err(|e| (EXIT_GENERATION, format!("sealing contract: {e}")))?;
    fs::write(&out_path, &envelope)
        .map_err(|e| (EXIT_IO, format!("writing {out_path}: {e}")))?;

    tracing::info!(
        plan_target = %plan.target(),
        hash = plan.hash().unwrap_or_default(),
        "sealed contract file"
    );
    if template {
        print!("{}", render::render(&plan));
    }
    Ok(EXIT_OK)
}

fn cmd_verify(args: &mut impl Iterator<Item = String>) -> Result<u8, CliError> {
    let contract_path = next_path(args, "out.contract")?;
    let source_path = next_path(args, "source.json")?;

    let envelope = fs::read(&contract_path)
        .map_err(|e| (EXIT_IO, format!("reading {contract_path}: {e}")))?;
    let stored = contract::open(&envelope)
        .map_err(|e| (EXIT_PARSE, format!("parsing {contract_path}: {e}")))?;
    let stored_plan = reader::read(&stored.plan_bytes)
        .map_err(|e| (EXIT_PARSE, format!("decoding embedded plan: {e}")))?
        .plan;

    let source = read_source(&source_path)?;
    let replanned =
        planner::build_plan_with_salt(source, stored_plan.plan_salt().to_vec())
            .map_err(|e| (EXIT_PARSE, format!("re-planning from source: {e}")))?;

    match contract::verify_against(&envelope, &replanned) {
        Ok(()) => {
            tracing::info!(plan_target = %stored.target, "verification succeeded");
            println!("OK: digest matches");
            Ok(EXIT_OK)
        }
        Err(_) => {
            tracing::warn!(plan_target = %stored.target, "verification failed: digest mismatch");
            println!("FAILED: digest mismatch");
            for line in contract::diff_summary(&stored_plan, &replanned) {
                println!("  {line}");
            }
            Err((
                EXIT_GENERATION,
                "digest mismatch: contract verification failed".to_string(),
            ))
        }
    }
}
