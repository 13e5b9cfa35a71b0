//! Self-update system for Zio Booster.
//!
//! Checks the release registry for newer versions, backs up the live
//! installation, and merges the new release over it while keeping user
//! configuration. The [`UpdateManager`] is the single entry point used by
//! both the background scheduler and manual triggers.

pub mod applier;
pub mod checker;
pub mod error;
pub mod manager;
pub mod state;
pub mod version;

pub use applier::{InstallResult, UpdateInstaller, should_preserve};
pub use checker::{Release, ReleaseClient};
pub use error::UpdateError;
pub use manager::{CheckOutcome, NoUpdateReason, UpdateManager};
pub use state::UpdateConfig;
pub use version::{Version, compare};
