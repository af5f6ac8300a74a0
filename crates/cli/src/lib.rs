pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "shopmate",
    about = "Shopmate operator CLI",
    long_about = "Inspect Shopmate configuration, check orchestrator readiness, and render stored turn logs.",
    after_help = "Examples:\n  shopmate doctor --json\n  shopmate config\n  shopmate view turns.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model credentials, and guardrail coverage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Render a stored turn log as its display view, with paged searches merged")]
    View {
        #[arg(help = "Path to a JSON array of turn entries")]
        path: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::View { path } => commands::view::run(&path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
