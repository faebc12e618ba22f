//! SHADOW.TEST CLI
//!
//! Thin front-end over the library: verify, record, approve, baseline
//! governance, fingerprint and diff. Exit codes: 0 clean, 1 regressions or
//! differences, 2 errors. Logs go to stderr so stdout stays parseable.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use config::ShadowConfig;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sst")]
#[command(about = "SHADOW.TEST - Semantic shadow testing", long_about = None)]
#[command(version)]
struct Cli {
    /// Baseline directory
    #[arg(long, global = true)]
    baseline_dir: Option<PathBuf>,
    /// Shadow (capture) directory
    #[arg(long, global = true)]
    shadow_dir: Option<PathBuf>,
    /// Governance policy name
    #[arg(long, global = true)]
    governance_policy: Option<String>,
    /// Allow unlisted governance transitions with an advisory
    #[arg(long, global = true)]
    no_strict_governance: bool,
    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify captures against baselines
    Verify {
        /// Capture directory (defaults to the shadow directory)
        #[arg(long)]
        capture_dir: Option<PathBuf>,
        /// Show structured changes
        #[arg(long)]
        verbose: bool,
    },
    /// Promote every capture into a baseline
    Record,
    /// Approve the newest capture of a scenario
    Approve {
        /// `module.function:id` or `module.function`
        identifier: String,
        /// Fingerprint, when not part of the identifier
        semantic_id: Option<String>,
    },
    /// Baseline governance
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },
    /// Print the fingerprint of a JSON file
    Fingerprint {
        /// JSON file
        file: PathBuf,
    },
    /// Diff two JSON files under the diff policy
    Diff {
        /// Baseline JSON file
        baseline: PathBuf,
        /// Current JSON file
        current: PathBuf,
    },
}

#[derive(Subcommand)]
enum BaselineCommands {
    /// List baselines
    List,
    /// Show one baseline
    Show {
        /// Scenario key
        scenario_id: String,
    },
    /// Deprecate one baseline
    Deprecate {
        /// Scenario key
        scenario_id: String,
    },
}

impl Cli {
    fn config(&self) -> ShadowConfig {
        let mut config = ShadowConfig::from_env();
        if let Some(dir) = &self.baseline_dir {
            config.baseline_dir = dir.clone();
        }
        if let Some(dir) = &self.shadow_dir {
            config.shadow_dir = dir.clone();
        }
        if let Some(name) = &self.governance_policy {
            config.governance_policy = name.clone();
        }
        if self.no_strict_governance {
            config.strict_governance = false;
        }
        config
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shadow=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: &Cli, config: &ShadowConfig, out: &mut dyn Write) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Verify {
            capture_dir,
            verbose,
        } => commands::verify(config, capture_dir.as_deref(), cli.json, *verbose, out),
        Commands::Record => commands::record(config, out),
        Commands::Approve {
            identifier,
            semantic_id,
        } => commands::approve(config, identifier, semantic_id.as_deref(), out),
        Commands::Baseline { command } => match command {
            BaselineCommands::List => commands::baseline_list(config, out),
            BaselineCommands::Show { scenario_id } => {
                commands::baseline_show(config, scenario_id, out)
            }
            BaselineCommands::Deprecate { scenario_id } => {
                commands::baseline_deprecate(config, scenario_id, out)
            }
        },
        Commands::Fingerprint { file } => commands::fingerprint_file(file, out),
        Commands::Diff { baseline, current } => {
            commands::diff_files(config, baseline, current, cli.json, out)
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing();

    let config = cli.config();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = match dispatch(&cli, &config, &mut out) {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            writeln!(out, "{}", output::render_error(&err, cli.json))?;
            2
        }
    };
    out.flush()?;
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_approve_forms() {
        let cli = Cli::parse_from(["sst", "approve", "shop.price", "abc"]);
        match cli.command {
            Commands::Approve {
                identifier,
                semantic_id,
            } => {
                assert_eq!(identifier, "shop.price");
                assert_eq!(semantic_id.as_deref(), Some("abc"));
            }
            _ => panic!("expected approve"),
        }
    }

    #[test]
    fn test_global_flags_override_config() {
        let cli = Cli::parse_from([
            "sst",
            "baseline",
            "list",
            "--baseline-dir",
            "/tmp/b",
            "--no-strict-governance",
        ]);
        let config = cli.config();
        assert_eq!(config.baseline_dir, PathBuf::from("/tmp/b"));
        assert!(!config.strict_governance);
    }
}
