//! prsync CLI - sync file snapshots into GitHub pull requests.

use clap::Parser;

mod commands;
mod gcs;
mod logging;
mod output;
mod pipeline;
mod server;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    output::set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Completions { shell } => {
            commands::completions::run(shell, &mut std::io::stdout())
        }
        Commands::Serve { listen } => {
            logging::init(&cli.log_level, cli.json_logs);
            commands::serve::run(&cli.config, listen)
        }
        Commands::Sync {
            storage_uri,
            owner,
            repo,
            json,
        } => {
            logging::init(&cli.log_level, cli.json_logs);
            commands::sync::run(&cli.config, &storage_uri, &owner, &repo, json)
        }
    };

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
