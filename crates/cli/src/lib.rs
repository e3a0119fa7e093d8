pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tracechat",
    about = "Tracechat operator CLI",
    long_about = "Inspect configuration, check runtime dependencies, and preview how the assistant routes an utterance.",
    after_help = "Examples:\n  tracechat doctor --json\n  tracechat config\n  tracechat classify \"quantos parafusos tenho no inventário?\""
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
    #[command(about = "Validate config, the system context document, and backend reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show normalization, regex product extraction, and intent for an utterance")]
    Classify {
        #[arg(help = "Utterance to classify, as a user would type it")]
        utterance: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Classify { utterance } => commands::classify::run(&utterance),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
