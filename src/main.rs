//! execgate - run shell commands behind an approval gate and an OS sandbox
//!
//! Thin binary entry point that delegates to the handlers in `src/cli`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod main_helpers;
mod prompt;

use cli::args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    main_helpers::initialize_tracing(args.verbose);

    let config = cli::load_config(args.config.as_deref())
        .context("failed to load execgate configuration")?;

    match args.command {
        Commands::Run(run) => cli::handle_run_command(config, run.into()).await,
        Commands::Classify { command, cwd, json } => {
            cli::handle_classify_command(&config, &command, cwd, json)
        }
        Commands::Sandbox { json } => cli::handle_sandbox_command(json),
        Commands::Config { path } => {
            cli::handle_config_command(&config, args.config.as_deref(), path)
        }
    }
}
