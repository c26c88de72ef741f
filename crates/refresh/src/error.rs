//! Error types for the live reload middleware.

/// Error returned when the middleware cannot be set up.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The filesystem subscription could not be opened.
    #[error("Failed to watch files: {0}")]
    Watch(#[from] notify::Error),
    /// Configuration values are invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error returned when a message cannot be delivered to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel has been closed.
    #[error("Channel is closed")]
    Closed,
}
