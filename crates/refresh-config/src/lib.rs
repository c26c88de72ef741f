//! Configuration management for the refresh server.
//!
//! Parses `refresh.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `site.root`
//! - `watch.paths`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override served root directory.
    pub root: Option<PathBuf>,
    /// Override watched paths.
    pub watch_paths: Option<Vec<PathBuf>>,
    /// Override debounce duration in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Override ignored event kinds.
    pub ignore_kinds: Option<Vec<String>>,
    /// Override recursive watching.
    pub recursive: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "refresh.toml";

/// Upper bound for `watch.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Site configuration (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Watch configuration (paths are relative strings from TOML).
    watch: WatchConfigRaw,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
        }
    }
}

/// Raw site configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root: Option<String>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default)]
pub struct SiteConfig {
    /// Directory of static files served by the development server.
    pub root: PathBuf,
}

/// Raw watch configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    debounce_ms: Option<u64>,
    ignore_kinds: Option<Vec<String>>,
    paths: Option<Vec<String>>,
    recursive: Option<bool>,
}

/// Resolved watch configuration with absolute paths.
#[derive(Debug)]
pub struct WatchConfig {
    /// Debounce duration in milliseconds.
    pub debounce_ms: u64,
    /// Labels of event kinds that never trigger a reload.
    pub ignore_kinds: Vec<String>,
    /// Files or directories to watch.
    pub paths: Vec<PathBuf>,
    /// Watch directories recursively.
    pub recursive: bool,
}

impl WatchConfig {
    fn default_with_base(base: &Path) -> Self {
        Self {
            debounce_ms: 30,
            ignore_kinds: vec!["any".to_owned(), "access".to_owned()],
            paths: vec![base.to_path_buf()],
            recursive: true,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`REFRESH_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `refresh.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The result is
    /// validated last.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.root {
            self.site_resolved.root.clone_from(root);
        }
        if let Some(paths) = &settings.watch_paths {
            self.watch_resolved.paths.clone_from(paths);
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.watch_resolved.debounce_ms = debounce_ms;
        }
        if let Some(kinds) = &settings.ignore_kinds {
            self.watch_resolved.ignore_kinds.clone_from(kinds);
        }
        if let Some(recursive) = settings.recursive {
            self.watch_resolved.recursive = recursive;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            site: SiteConfigRaw::default(),
            watch: WatchConfigRaw::default(),
            site_resolved: SiteConfig {
                root: base.to_path_buf(),
            },
            watch_resolved: WatchConfig::default_with_base(base),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically by [`Config::load`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watch()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but the
        // browser needs a known address to connect back to
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate watch configuration.
    fn validate_watch(&self) -> Result<(), ConfigError> {
        if self.watch_resolved.paths.is_empty() {
            return Err(ConfigError::Validation(
                "watch.paths must contain at least one path".to_owned(),
            ));
        }

        if self.watch_resolved.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "watch.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root) = self.site.root {
            self.site.root = Some(expand::expand_env(root, "site.root")?);
        }

        if let Some(ref mut paths) = self.watch.paths {
            for path in paths.iter_mut() {
                *path = expand::expand_env(path, "watch.paths")?;
            }
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = WatchConfig::default_with_base(config_dir);

        self.site_resolved = SiteConfig {
            root: self
                .site
                .root
                .as_ref()
                .map_or_else(|| config_dir.to_path_buf(), |root| config_dir.join(root)),
        };

        self.watch_resolved = WatchConfig {
            debounce_ms: self.watch.debounce_ms.unwrap_or(defaults.debounce_ms),
            ignore_kinds: self
                .watch
                .ignore_kinds
                .clone()
                .unwrap_or(defaults.ignore_kinds),
            paths: self.watch.paths.as_ref().map_or(defaults.paths, |paths| {
                paths.iter().map(|p| config_dir.join(p)).collect()
            }),
            recursive: self.watch.recursive.unwrap_or(defaults.recursive),
        };
    }
}
