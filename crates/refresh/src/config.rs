//! Watch configuration.
//!
//! [`RefreshInit`] carries the caller's options, every one of them optional.
//! It is resolved once into an immutable [`WatchConfig`] with defaults
//! filled in.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use notify::RecursiveMode;
use tokio_util::sync::CancellationToken;

use crate::error::RefreshError;

/// Default debounce duration in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 30;

/// Event kinds ignored by default.
pub const DEFAULT_IGNORE_KINDS: [FsEventKind; 2] = [FsEventKind::Any, FsEventKind::Access];

/// Path watched by default.
pub const DEFAULT_PATH: &str = "./";

/// Whether directories are watched recursively by default.
pub const DEFAULT_RECURSIVE: bool = true;

/// Kind of filesystem event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// Catch-all event emitted when the backend cannot be more specific.
    Any,
    /// File was read or opened.
    Access,
    /// File or directory was created.
    Create,
    /// File contents or metadata changed.
    Modify,
    /// File or directory was removed.
    Remove,
    /// Anything else reported by the backend.
    Other,
}

impl FsEventKind {
    /// Lowercase label used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Access => "access",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsEventKind {
    type Err = RefreshError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "any" => Ok(Self::Any),
            "access" => Ok(Self::Access),
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "remove" => Ok(Self::Remove),
            "other" => Ok(Self::Other),
            _ => Err(RefreshError::InvalidConfig(format!(
                "unknown event kind: {label}"
            ))),
        }
    }
}

impl From<&notify::EventKind> for FsEventKind {
    fn from(kind: &notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Any => Self::Any,
            notify::EventKind::Access(_) => Self::Access,
            notify::EventKind::Create(_) => Self::Create,
            notify::EventKind::Modify(_) => Self::Modify,
            notify::EventKind::Remove(_) => Self::Remove,
            notify::EventKind::Other => Self::Other,
        }
    }
}

/// Options for [`refresh`](crate::refresh).
///
/// Unset fields fall back to the `DEFAULT_*` constants of this module.
#[derive(Clone, Debug, Default)]
pub struct RefreshInit {
    /// Debounce duration in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Event kinds that never trigger a reload.
    pub ignore_kinds: Option<Vec<FsEventKind>>,
    /// Files or directories to watch.
    pub paths: Option<Vec<PathBuf>>,
    /// Watch directories recursively.
    pub recursive: Option<bool>,
    /// Token that stops watching once cancelled.
    pub signal: Option<CancellationToken>,
}

impl RefreshInit {
    /// Set the debounce duration in milliseconds.
    #[must_use]
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = Some(debounce_ms);
        self
    }

    /// Set the event kinds that never trigger a reload.
    #[must_use]
    pub fn with_ignore_kinds(mut self, kinds: impl IntoIterator<Item = FsEventKind>) -> Self {
        self.ignore_kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Set the files or directories to watch.
    #[must_use]
    pub fn with_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Set whether directories are watched recursively.
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = Some(recursive);
        self
    }

    /// Set the token that stops watching once cancelled.
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Resolved, immutable watch configuration.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Delay between the first change of a burst and the reload broadcast.
    pub debounce: Duration,
    /// Event kinds that never trigger a reload.
    pub ignore_kinds: HashSet<FsEventKind>,
    /// Files or directories to watch (never empty).
    pub paths: Vec<PathBuf>,
    /// Watch directories recursively.
    pub recursive: bool,
    /// Token that stops watching once cancelled.
    pub signal: Option<CancellationToken>,
}

impl WatchConfig {
    /// Whether events of this kind are discarded.
    #[must_use]
    pub fn is_ignored(&self, kind: FsEventKind) -> bool {
        self.ignore_kinds.contains(&kind)
    }

    /// Whether the cancellation token has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn recursive_mode(&self) -> RecursiveMode {
        if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ignore_kinds: DEFAULT_IGNORE_KINDS.into_iter().collect(),
            paths: vec![PathBuf::from(DEFAULT_PATH)],
            recursive: DEFAULT_RECURSIVE,
            signal: None,
        }
    }
}

impl TryFrom<RefreshInit> for WatchConfig {
    type Error = RefreshError;

    fn try_from(init: RefreshInit) -> Result<Self, Self::Error> {
        let defaults = Self::default();

        let paths = match init.paths {
            Some(paths) if paths.is_empty() => {
                return Err(RefreshError::InvalidConfig(
                    "at least one watch path is required".to_owned(),
                ));
            }
            Some(paths) => paths,
            None => defaults.paths,
        };

        Ok(Self {
            debounce: init
                .debounce_ms
                .map_or(defaults.debounce, Duration::from_millis),
            ignore_kinds: init
                .ignore_kinds
                .map_or(defaults.ignore_kinds, |kinds| kinds.into_iter().collect()),
            paths,
            recursive: init.recursive.unwrap_or(defaults.recursive),
            signal: init.signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::try_from(RefreshInit::default()).unwrap();

        assert_eq!(config.debounce, Duration::from_millis(30));
        assert_eq!(
            config.ignore_kinds,
            HashSet::from([FsEventKind::Any, FsEventKind::Access])
        );
        assert_eq!(config.paths, vec![PathBuf::from("./")]);
        assert!(config.recursive);
        assert!(config.signal.is_none());
        assert!(!config.is_cancelled());
    }

    #[test]
    fn test_options_override_defaults_independently() {
        let init = RefreshInit::default()
            .with_debounce_ms(0)
            .with_paths(["./a", "./b"]);
        let config = WatchConfig::try_from(init).unwrap();

        assert_eq!(config.debounce, Duration::ZERO);
        assert_eq!(
            config.paths,
            vec![PathBuf::from("./a"), PathBuf::from("./b")]
        );
        // Untouched options keep their defaults
        assert!(config.is_ignored(FsEventKind::Access));
        assert!(config.recursive);
    }

    #[test]
    fn test_empty_ignore_kinds_ignores_nothing() {
        let init = RefreshInit::default().with_ignore_kinds([]);
        let config = WatchConfig::try_from(init).unwrap();

        assert!(!config.is_ignored(FsEventKind::Any));
        assert!(!config.is_ignored(FsEventKind::Access));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let init = RefreshInit::default().with_paths(Vec::<PathBuf>::new());
        let result = WatchConfig::try_from(init);

        assert!(matches!(result, Err(RefreshError::InvalidConfig(_))));
    }

    #[test]
    fn test_non_recursive_mode() {
        let init = RefreshInit::default().with_recursive(false);
        let config = WatchConfig::try_from(init).unwrap();

        assert_eq!(config.recursive_mode(), RecursiveMode::NonRecursive);
    }

    #[test]
    fn test_signal_cancellation_visible() {
        let token = CancellationToken::new();
        let config =
            WatchConfig::try_from(RefreshInit::default().with_signal(token.clone())).unwrap();

        assert!(!config.is_cancelled());
        token.cancel();
        assert!(config.is_cancelled());
    }

    #[test]
    fn test_event_kind_labels() {
        for kind in [
            FsEventKind::Any,
            FsEventKind::Access,
            FsEventKind::Create,
            FsEventKind::Modify,
            FsEventKind::Remove,
            FsEventKind::Other,
        ] {
            assert_eq!(kind.as_str().parse::<FsEventKind>().unwrap(), kind);
        }
        assert!("rename".parse::<FsEventKind>().is_err());
    }

    #[test]
    fn test_event_kind_from_notify() {
        use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

        assert_eq!(
            FsEventKind::from(&notify::EventKind::Any),
            FsEventKind::Any
        );
        assert_eq!(
            FsEventKind::from(&notify::EventKind::Access(AccessKind::Any)),
            FsEventKind::Access
        );
        assert_eq!(
            FsEventKind::from(&notify::EventKind::Create(CreateKind::File)),
            FsEventKind::Create
        );
        assert_eq!(
            FsEventKind::from(&notify::EventKind::Modify(ModifyKind::Any)),
            FsEventKind::Modify
        );
        assert_eq!(
            FsEventKind::from(&notify::EventKind::Remove(RemoveKind::File)),
            FsEventKind::Remove
        );
        assert_eq!(
            FsEventKind::from(&notify::EventKind::Other),
            FsEventKind::Other
        );
    }
}
