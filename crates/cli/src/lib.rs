pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Relay operator CLI",
    long_about = "Operate the relay assistant engine: migrations, config inspection, readiness checks, and one-shot orchestration runs.",
    after_help = "Examples:\n  relay doctor --json\n  relay config\n  relay ask \"summarize the Acme deal\" --feature deal_summary"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with secret redaction")]
    Config,
    #[command(about = "Validate config, provider key readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one orchestration request from the terminal")]
    Ask {
        #[arg(help = "Instruction for the assistant")]
        instruction: String,
        #[arg(long, default_value = "chat", help = "Feature class (chat, action_execution, lead_scoring, deal_summary, email_draft, data_enrichment)")]
        feature: String,
        #[arg(long, default_value = "medium", help = "Complexity hint (simple, medium, complex)")]
        complexity: String,
        #[arg(long, default_value = "business", help = "Plan tier (free, starter, business, enterprise)")]
        plan: String,
        #[arg(long, default_value = "demo-tenant", help = "Tenant to run as")]
        tenant: String,
        #[arg(long, default_value = "demo-user", help = "User to run as")]
        user: String,
        #[arg(long, help = "Emit the full response as JSON")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask { instruction, feature, complexity, plan, tenant, user, json } => {
            commands::ask::run(commands::ask::AskArgs {
                instruction,
                feature,
                complexity,
                plan,
                tenant,
                user,
                json,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
