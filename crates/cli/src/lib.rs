pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "balcao",
    about = "Balcao operator CLI",
    long_about = "Inspect configuration, prepare the database and try the routing rules offline.",
    after_help = "Examples:\n  balcao doctor --json\n  balcao migrate\n  balcao classify \"quero orçamento de telha shingle\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Insert the default agent prompts and knowledge files when missing")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, WhatsApp credentials, keyword table and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Classify, extract and score one customer message without sending anything")]
    Classify {
        #[arg(help = "Customer message text")]
        message: String,
        #[arg(long, help = "Category already assigned to the conversation")]
        category: Option<String>,
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
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Classify { message, category } => {
            commands::classify::run(&message, category.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
