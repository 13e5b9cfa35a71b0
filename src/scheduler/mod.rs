//! Background update scheduler.
//!
//! Periodically asks the [`UpdateManager`](crate::update::UpdateManager) to
//! check for updates until stopped.

pub mod runner;

pub use runner::UpdateScheduler;
