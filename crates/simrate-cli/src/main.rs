mod commands;
mod input;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use simrate::state::CONSOLE_TARGET;
use tracing_subscriber::EnvFilter;

use crate::commands::Options;

#[derive(Parser)]
#[command(name = "simrate")]
#[command(version, about = "Keeps the MSFS 2024 clock in step with the simulation rate")]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to the simulator and keep its clock synchronized (default).
    Run,

    /// Find and verify the seconds offset once, then exit.
    Locate,

    /// Search the simulator's memory for a value or the offset signature.
    #[command(group(ArgGroup::new("target").required(true).args(["value", "signature"])))]
    Scan {
        /// f32 value to search for in all committed memory.
        #[arg(long, allow_negative_numbers = true)]
        value: Option<f32>,

        /// Search the main module for the signature string instead.
        #[arg(long)]
        signature: bool,

        /// Maximum number of matches to print.
        #[arg(long, default_value_t = 64)]
        limit: usize,
    },

    /// Print the offset profile table as JSON.
    Profiles {
        /// Write the table to this file instead of stdout.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let mut filter = EnvFilter::from_default_env();
    for directive in log_directives(&command, cli.options.verbose) {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match command {
        Commands::Run => commands::run::run(&cli.options),
        Commands::Locate => commands::locate::run(&cli.options),
        Commands::Scan {
            value,
            signature,
            limit,
        } => commands::scan::run(&cli.options, value, signature, limit),
        Commands::Profiles { output } => commands::profiles::run(&cli.options, output.as_deref()),
    }
}

/// Every command prints the queued console lines itself, so their tracing copy stays off.
fn log_directives(command: &Commands, verbose: bool) -> Vec<String> {
    let level = match (command, verbose) {
        (_, true) => "debug",
        (Commands::Run, false) => "warn",
        _ => "info",
    };
    vec![format!("simrate={level}"), format!("{CONSOLE_TARGET}=off")]
}
