use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use platypus_app_core::UserDirsLocations;
use platypus_cli::{commands, DupesArgs, EXIT_FAILURE};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find files with identical content
    Dupes(DupesArgs),
    /// List suggested scan roots
    Locations,
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Dupes(args) => commands::cmd_dupes(args),
        Commands::Locations => {
            for root in commands::cmd_locations(Arc::new(UserDirsLocations))? {
                println!("{root}");
            }
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
