//! Refresh CLI - Live reload development server.
//!
//! Provides commands for:
//! - `serve`: Serve a directory and reload connected browsers on file changes

mod commands;
mod error;
mod output;
mod server;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ServeArgs;
use output::Output;

/// Refresh - Live reload development server.
#[derive(Parser)]
#[command(name = "refresh", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory with live reload.
    Serve(ServeArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Serve(args) if args.verbose);

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Serve(args) => match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(args.execute()),
            Err(e) => Err(e.into()),
        },
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_repeated_watch() {
        let cli = Cli::try_parse_from([
            "refresh", "serve", "--watch", "public", "--watch", "templates", "-v",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command;
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["refresh", "build"]).is_err());
    }
}
