pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bridal",
    about = "Bridal back office operator CLI",
    long_about = "Apply migrations, load demo data, inspect configuration, check readiness, and issue staff sessions.",
    after_help = "Examples:\n  bridal doctor --json\n  bridal config\n  bridal session --email admin@atelier.example"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo users, sessions and one document per resource kind")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and blob storage readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue a session token for an existing staff account")]
    Session {
        #[arg(long, help = "Email address of the account")]
        email: String,
        #[arg(long, help = "Session lifetime in hours (defaults to auth.session_ttl_hours)")]
        ttl_hours: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Session { email, ttl_hours } => commands::session::run(&email, ttl_hours),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
