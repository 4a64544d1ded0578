//! TUI error types.

use thiserror::Error;

/// Unified error type for the terminal UI.
#[derive(Error, Debug)]
pub enum TuiError {
    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider layer failed outside a chat turn.
    #[error("ai error: {0}")]
    Ai(#[from] aiwrap_ai::AiError),
}

/// Convenience alias used throughout the TUI crate.
pub type Result<T> = std::result::Result<T, TuiError>;
