//! Failure taxonomy of the update pipeline.

use std::path::PathBuf;

/// Fine-grained errors raised by the release client and the installer.
///
/// Everything except [`UpdateError::PartialInstall`] leaves the live
/// installation untouched and is safe to retry on a later check.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Registry unreachable or answered with a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// Registry answered, but not with the expected JSON shape.
    #[error("malformed registry response: {0}")]
    MalformedResponse(String),

    /// The registry has no published releases.
    #[error("no releases published")]
    EmptyReleaseList,

    /// Repository slug is not of the form `owner/repo`.
    #[error("invalid repository `{0}` (expected owner/repo)")]
    InvalidRepository(String),

    /// A version string could not be parsed.
    #[error("invalid version `{input}`: {reason}")]
    InvalidVersion {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The release archive could not be downloaded to the staging area.
    #[error("download failed: {0}")]
    Download(String),

    /// The archive could not be unpacked or has an unexpected layout.
    #[error("extract failed: {0}")]
    Extract(String),

    /// The pre-install backup could not be completed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// Live files were being replaced when a failure occurred.
    ///
    /// The installation may be inconsistent; restore from `backup_dir`.
    #[error("partial install ({reason}); restore from backup at {}", backup_dir.display())]
    PartialInstall {
        /// Backup of the pre-update tree.
        backup_dir: PathBuf,
        /// Underlying failure.
        reason: String,
    },
}

impl UpdateError {
    /// Returns `true` when the live installation may have been modified.
    pub fn requires_restore(&self) -> bool {
        matches!(self, Self::PartialInstall { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_partial_install_requires_restore() {
        let partial = UpdateError::PartialInstall {
            backup_dir: PathBuf::from("/opt/zio/backup_1.0.0"),
            reason: "disk full".to_owned(),
        };
        assert!(partial.requires_restore());
        assert!(!UpdateError::Backup("denied".to_owned()).requires_restore());
        assert!(!UpdateError::EmptyReleaseList.requires_restore());
    }

    #[test]
    fn partial_install_message_names_backup() {
        let err = UpdateError::PartialInstall {
            backup_dir: PathBuf::from("/opt/zio/backup_1.0.0"),
            reason: "disk full".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("backup_1.0.0"));
        assert!(msg.contains("disk full"));
    }
}
