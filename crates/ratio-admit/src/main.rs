mod cli;
mod logging;
mod version;

use std::process::ExitCode;

use anyhow::anyhow;
use anyhow::Result;
use clap::Parser;
use ratio_policy::Decision;
use ratio_policy::PolicySnapshot;
use ratio_policy::PolicySource;
use ratio_policy::RatioPolicyEngine;
use ratio_policy::ResourceRequest;
use tracing_subscriber::filter::LevelFilter;

use crate::cli::CheckArgs;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::SourceArgs;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    });
    tracing::debug!("ratio-admit {}", &**version::VERSION);

    match cli.command {
        Commands::Check(args) => run_check(args),
        Commands::Validate(args) => run_validate(args),
    }
}

fn run_check(args: CheckArgs) -> Result<ExitCode> {
    let request = ResourceRequest {
        partition: args.partition,
        gres: args.gres,
        cpu_count: args.cpus,
    };

    let decision = check(&args.source.source(), &request)?;
    let (line, code) = check_outcome(&decision);
    println!("{line}");
    Ok(ExitCode::from(code))
}

fn run_validate(args: SourceArgs) -> Result<ExitCode> {
    print!("{}", validate(&args.source())?);
    Ok(ExitCode::SUCCESS)
}

fn check(source: &PolicySource, request: &ResourceRequest) -> Result<Decision> {
    let engine = RatioPolicyEngine::load(source)
        .map_err(|report| anyhow!("failed to load policy: {report:?}"))?;
    Ok(engine.evaluate(request))
}

/// Line printed for a decision and the process exit status.
fn check_outcome(decision: &Decision) -> (String, u8) {
    match decision.reason() {
        None => ("Accepted".to_string(), 0),
        Some(reason) => (format!("Refused: {reason}"), 1),
    }
}

fn validate(source: &PolicySource) -> Result<String> {
    let snapshot =
        PolicySnapshot::load(source).map_err(|report| anyhow!("invalid policy: {report:?}"))?;
    Ok(render_summary(&snapshot))
}

fn render_summary(snapshot: &PolicySnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "enabled: {}\ndefault weight: {}\n",
        snapshot.is_enabled(),
        snapshot.default_weight()
    ));

    out.push_str("partitions:\n");
    for rule in snapshot.partition_rules() {
        out.push_str(&format!(
            "  {}: min {} CPU per GPU unit\n",
            rule.partition, rule.min_cpu_per_gpu
        ));
    }

    out.push_str("gpu types:\n");
    for entry in snapshot.gpu_types() {
        match entry.max_per_node {
            Some(max) => out.push_str(&format!(
                "  {}: weight {}, max {}\n",
                entry.name, entry.weight, max
            )),
            None => out.push_str(&format!("  {}: weight {}\n", entry.name, entry.weight)),
        }
    }
    out
}
