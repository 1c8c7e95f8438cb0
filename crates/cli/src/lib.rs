pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "voicequote",
    about = "Voicequote operator CLI",
    long_about = "Check realtime readiness, inspect configuration, and replay recorded intake sessions.",
    after_help = "Examples:\n  voicequote doctor --json\n  voicequote config\n  voicequote replay session.jsonl"
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
    #[command(about = "Validate config, realtime credential, and session request readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Replay a JSON-lines file of realtime server events through the payload reducer"
    )]
    Replay {
        #[arg(help = "Path to a file with one realtime server event per line")]
        path: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Replay { path } => commands::replay::run(&path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
