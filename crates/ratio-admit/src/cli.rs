use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ratio_policy::Document;
use ratio_policy::PolicySource;

use crate::version;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a single job request against the policy
    Check(CheckArgs),
    /// Load the policy and print a summary of its rules
    Validate(SourceArgs),
}

#[derive(Args, Clone)]
pub struct SourceArgs {
    #[arg(
        long,
        env = "RATIO_POLICY_CONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Policy document (.yaml, .yml, .json or .toml), e.g. /etc/slurm/gres_ratio.yaml"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        env = "RATIO_POLICY_GPU_TYPES",
        value_hint = clap::ValueHint::FilePath,
        help = "Separate GPU type weight table, merged into the policy's gpu_types"
    )]
    pub gpu_types: Option<PathBuf>,
}

impl SourceArgs {
    pub fn source(&self) -> PolicySource {
        let source = PolicySource::file(&self.config);
        match &self.gpu_types {
            Some(path) => source.with_gpu_types(Document::File(path.clone())),
            None => source,
        }
    }
}

#[derive(Args, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, help = "Requested partition; omitted means unknown")]
    pub partition: Option<String>,

    #[arg(long, help = "Requested GRES, e.g. gpu:a40:2")]
    pub gres: Option<String>,

    #[arg(long, help = "Requested CPU cores")]
    pub cpus: u32,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_check_arguments() {
        let cli = Cli::try_parse_from([
            "ratio-admit",
            "check",
            "--config",
            "/etc/slurm/gres_ratio.yaml",
            "--partition",
            "es1",
            "--gres",
            "gpu:a40:2",
            "--cpus",
            "4",
        ])
        .expect("arguments should parse");

        let Commands::Check(args) = cli.command else {
            panic!("expected check command");
        };
        assert_eq!(args.partition.as_deref(), Some("es1"));
        assert_eq!(args.gres.as_deref(), Some("gpu:a40:2"));
        assert_eq!(args.cpus, 4);
        assert_eq!(
            args.source.source(),
            PolicySource::file("/etc/slurm/gres_ratio.yaml")
        );
    }

    #[test]
    fn gpu_type_table_is_attached_to_source() {
        let cli = Cli::try_parse_from([
            "ratio-admit",
            "validate",
            "--config",
            "policy.toml",
            "--gpu-types",
            "gpu_cpu_ratios.json",
        ])
        .expect("arguments should parse");

        let Commands::Validate(args) = cli.command else {
            panic!("expected validate command");
        };
        assert_eq!(
            args.source().gpu_types,
            Some(Document::File(PathBuf::from("gpu_cpu_ratios.json")))
        );
    }
}
