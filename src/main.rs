use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use gridtap::core::config::FamilyKind;
use gridtap::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for gridtap::AppCommand {
    fn from(cmd: Commands) -> gridtap::AppCommand {
        match cmd {
            Commands::Sync { family, dry_run } => gridtap::AppCommand::Sync {
                families: family,
                dry_run,
            },
            Commands::Daemon => gridtap::AppCommand::Daemon,
            Commands::Status => gridtap::AppCommand::Status,
            Commands::Rate { date } => gridtap::AppCommand::Rate { date },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Catch every series up from its last stored point
    Sync {
        /// Only synchronise these families (repeatable)
        #[arg(short, long)]
        family: Vec<FamilyKind>,
        /// Keep fetched points in memory instead of the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Synchronise on the configured interval until Ctrl-C
    Daemon,
    /// Display the last stored point of every series
    Status,
    /// Display the SEK per EUR rate used for a date
    Rate {
        /// Date as YYYY-MM-DD
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => gridtap::cli::setup::setup_at_path(path),
            None => gridtap::cli::setup::setup(),
        },
        Some(cmd) => gridtap::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
