use std::process::ExitCode;

use clap::Parser;

mod cli;
mod config;
mod error;
mod server;

use cli::Cli;
use config::{load_config, merge_config};
use error::{CliResult, to_exit_code};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = if cli.verbose {
        "browser_bridge=debug,browser_bridge_cli=debug,client=debug"
    } else {
        "browser_bridge=info,browser_bridge_cli=info,client=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    to_exit_code(run(cli))
}

fn run(cli: Cli) -> CliResult<()> {
    let file_config = load_config(cli.config.as_deref())?;
    let config = merge_config(file_config, &cli)?;
    server::serve(config)
}
