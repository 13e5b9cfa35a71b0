//! Error types for the Zio Booster updater.

/// Top-level error type surfaced to callers of the update subsystem.
///
/// The fine-grained failure taxonomy lives in
/// [`UpdateError`](crate::update::UpdateError); [`UpdateManager`](crate::update::UpdateManager)
/// collapses it into [`ZioError::Update`] before returning.
#[derive(Debug, thiserror::Error)]
pub enum ZioError {
    /// Configuration load/save error.
    #[error("config error: {0}")]
    Config(String),

    /// Self-update error (version check, download, install).
    #[error("update error: {0}")]
    Update(String),

    /// Scheduler error (task spawn, shutdown).
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ZioError>;
