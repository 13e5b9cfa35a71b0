//! Zio Booster self-update subsystem.
//!
//! Keeps an installation current against a GitHub-style release registry:
//!
//! - **Version comparison**: [`update::version`] orders release tags by semver precedence
//! - **Release discovery**: [`update::checker`] fetches the newest release
//! - **Installation**: [`update::applier`] downloads, backs up and merges a release
//! - **Orchestration**: [`update::manager`] persists state and serializes checks
//! - **Scheduling**: [`scheduler`] runs periodic checks in the background

pub mod error;
pub mod scheduler;
pub mod update;
pub mod zio_dirs;

pub use error::{Result, ZioError};
pub use scheduler::UpdateScheduler;
pub use update::{CheckOutcome, NoUpdateReason, UpdateConfig, UpdateManager};
