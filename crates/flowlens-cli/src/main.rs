#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use flowlens_metrics::calc::AggregateKey;
use output::CliError;
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "flowlens: flow metrics from work item snapshots",
    long_about = None
)]
struct Cli {
    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Compute one flow metric aggregate",
        long_about = "Compute one aggregate over an org's work items and print it as JSON.",
        after_help = "EXAMPLES:\n    # WIP age for an org\n    flowlens aggregate wipAge --db flow.sqlite3 --org acme\n\n    # Lead time for May, stories only, in Brisbane days\n    flowlens aggregate leadTime --db flow.sqlite3 --org acme \\\n        --from 2024-05-01 --to 2024-05-31 --type story --tz Australia/Brisbane"
    )]
    Aggregate(cmd::aggregate::AggregateArgs),

    #[command(about = "List the aggregate keys")]
    Keys,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FLOWLENS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "flowlens=debug,info"
        } else {
            "flowlens=info,warn"
        })
    });

    let format = env::var("FLOWLENS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;

    match cli.command {
        Commands::Aggregate(args) => {
            let value = cmd::aggregate::run_aggregate(&args, &project_root)?;
            output::render_json(&value)
        }
        Commands::Keys => {
            let keys: Vec<&str> = AggregateKey::ALL.iter().map(|key| key.as_str()).collect();
            output::render_json(&keys)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(?cli, "parsed arguments");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(render_err) = output::render_error(&CliError::from(&err)) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_parses_after_subcommand() {
        let cli = Cli::parse_from([
            "flowlens", "aggregate", "wipAge", "--db", "f.db", "--org", "acme", "-v",
        ]);
        assert!(cli.verbose);
        let Commands::Aggregate(args) = cli.command else {
            panic!("expected aggregate");
        };
        assert_eq!(args.key, "wipAge");
        assert_eq!(args.org, "acme");
    }

    #[test]
    fn type_flag_repeats() {
        let cli = Cli::parse_from([
            "flowlens", "aggregate", "leadTime", "--db", "f.db", "--org", "acme", "--type",
            "story", "--type", "bug",
        ]);
        let Commands::Aggregate(args) = cli.command else {
            panic!("expected aggregate");
        };
        assert_eq!(args.types, ["story", "bug"]);
    }

    #[test]
    fn org_is_required() {
        let result = Cli::try_parse_from(["flowlens", "aggregate", "wipAge", "--db", "f.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn keys_takes_no_arguments() {
        let cli = Cli::parse_from(["flowlens", "keys"]);
        assert!(matches!(cli.command, Commands::Keys));
    }
}
