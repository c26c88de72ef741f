//! `refresh serve` command implementation.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use refresh::{CancellationToken, FsEventKind, RefreshInit};
use refresh_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;
use crate::server;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover refresh.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of static files to serve (overrides config).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to watch for changes; repeatable (overrides config).
    #[arg(short, long = "watch", value_name = "PATH")]
    watch: Vec<PathBuf>,

    /// Debounce window in milliseconds (overrides config).
    #[arg(long, value_name = "MS")]
    debounce: Option<u64>,

    /// Event kind that never triggers a reload; repeatable (overrides config).
    #[arg(long = "ignore-kind", value_name = "KIND")]
    ignore_kinds: Vec<String>,

    /// Watch only the top level of each directory.
    #[arg(long)]
    no_recursive: bool,

    /// Enable verbose output (log watcher and connection activity).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, watching cannot start, or the
    /// server fails to bind.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = self.cli_settings();
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let token = CancellationToken::new();
        let init = refresh_init(&config)?.with_signal(token.clone());
        let reload = refresh::refresh(init)?;

        output.info(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "Serving: {}",
            config.site_resolved.root.display()
        ));
        for path in &config.watch_resolved.paths {
            output.info(&format!("Watching: {}", path.display()));
        }

        let host = config.server.host.as_str();
        let port = config.server.port;
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|e| CliError::Server(format!("Failed to bind {host}:{port}: {e}")))?;

        server::serve(listener, &config.site_resolved.root, reload, token).await?;

        output.success("Server stopped");
        Ok(())
    }

    /// Build CLI settings from args. Empty repeatable flags leave config alone.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root: self.root.clone(),
            watch_paths: (!self.watch.is_empty()).then(|| self.watch.clone()),
            debounce_ms: self.debounce,
            ignore_kinds: (!self.ignore_kinds.is_empty()).then(|| self.ignore_kinds.clone()),
            recursive: self.no_recursive.then_some(false),
        }
    }
}

/// Convert loaded configuration into middleware options.
fn refresh_init(config: &Config) -> Result<RefreshInit, CliError> {
    let watch = &config.watch_resolved;
    let ignore_kinds = watch
        .ignore_kinds
        .iter()
        .map(|kind| FsEventKind::from_str(kind))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RefreshInit::default()
        .with_debounce_ms(watch.debounce_ms)
        .with_ignore_kinds(ignore_kinds)
        .with_paths(watch.paths.iter().cloned())
        .with_recursive(watch.recursive))
}
