use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "focusframe", version, about = "Context-aware notification timing")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, default_value = "focusframe.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until ctrl-c
    Run(commands::run::RunArgs),
    /// Inspect and validate decision rules
    Rules {
        #[command(subcommand)]
        action: commands::rules::RulesAction,
    },
    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Show the persisted decision log
    Events(commands::events::EventsArgs),
    /// Record what you did with a delivered notification
    Feedback(commands::feedback::FeedbackArgs),
}

#[tokio::main]
async fn main() {
    focusframe_lib::init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(&cli.config, args).await,
        Commands::Rules { action } => commands::rules::run(&cli.config, action),
        Commands::Config { action } => commands::config::run(&cli.config, action),
        Commands::Events(args) => commands::events::run(&cli.config, args).await,
        Commands::Feedback(args) => commands::feedback::run(&cli.config, args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
