//! Centralized filesystem locations for the updater.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `ZIO_CONFIG_DIR` | [`config_dir`] |
//! | `ZIO_INSTALL_DIR` | [`install_dir`] |
//! | `ZIO_UPDATE_REPO` | [`update_repository`] |

use std::path::PathBuf;

/// Release repository queried when no override is set.
pub const DEFAULT_REPOSITORY: &str = "aidandelange170-hub/Zio-Booster";

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/zio-booster/` by default. Override with
/// the `ZIO_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ZIO_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("zio-booster"))
        .unwrap_or_else(|| PathBuf::from("/tmp/zio-booster-config"))
}

/// Persisted update state (`config_dir()/version.json`).
#[must_use]
pub fn version_file() -> PathBuf {
    config_dir().join("version.json")
}

/// Live installation tree that updates are merged into.
///
/// Defaults to the process working directory; override with `ZIO_INSTALL_DIR`.
#[must_use]
pub fn install_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ZIO_INSTALL_DIR") {
        return PathBuf::from(override_dir);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// `owner/repo` slug of the release registry entry to track.
#[must_use]
pub fn update_repository() -> String {
    std::env::var("ZIO_UPDATE_REPO").unwrap_or_else(|_| DEFAULT_REPOSITORY.to_owned())
}
