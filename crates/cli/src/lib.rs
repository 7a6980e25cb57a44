pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pagepilot_core::config::{AppConfig, ConfigOverrides, LoadOptions};

use crate::commands::run::RunArgs;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "pagepilot",
    about = "PagePilot task runner",
    long_about = "Carry out natural-language tasks against a page with an oracle-driven action loop.",
    after_help = "Examples:\n  pagepilot run --page page.json \"summarize the about section\"\n  pagepilot ask \"what is 2+2?\"\n  pagepilot catalog --json\n  pagepilot config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a pagepilot.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one task against a page file and print the task report as JSON")]
    Run {
        #[arg(long, help = "JSON page file with ordered sections")]
        page: PathBuf,
        #[arg(long, help = "Maximum loop iterations (1-20)")]
        max_iterations: Option<u32>,
        #[arg(long, help = "Skip the direct-answer classifier")]
        no_classify: bool,
        #[arg(long, help = "Context store key when the page has no url")]
        target: Option<String>,
        instruction: String,
    },
    #[command(about = "Ask the oracle a question directly, streaming the reply")]
    Ask { question: String },
    #[command(about = "List the available actions and their parameters")]
    Catalog {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let result = dispatch(cli).await;

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

async fn dispatch(cli: Cli) -> CommandResult {
    let mut options = LoadOptions {
        config_path: cli.config,
        require_file: false,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
    };

    match cli.command {
        Command::Catalog { json } => commands::catalog::run(json),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(options) },
        Command::Ask { question } => match load_config(options) {
            Ok(config) => commands::ask::run(&config, &question).await,
            Err(result) => result,
        },
        Command::Run { page, max_iterations, no_classify, target, instruction } => {
            options.overrides.max_iterations = max_iterations;
            if no_classify {
                options.overrides.classify_first = Some(false);
            }
            match load_config(options) {
                Ok(config) => {
                    commands::run::run(&config, RunArgs { page, instruction, target }).await
                }
                Err(result) => result,
            }
        }
    }
}

fn load_config(options: LoadOptions) -> Result<AppConfig, CommandResult> {
    let config = AppConfig::load(options).map_err(|error| {
        CommandResult::failure("config", "config_validation", error.to_string(), 2)
    })?;
    logging::init_logging(&config);
    Ok(config)
}
