//! Update orchestration.
//!
//! [`UpdateManager`] owns the persisted [`UpdateConfig`], decides when a
//! check is due, and drives [`ReleaseClient`] and [`UpdateInstaller`]. One
//! instance is constructed at startup and shared (behind an `Arc`) by the
//! scheduler and any manual trigger.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::applier::UpdateInstaller;
use super::checker::ReleaseClient;
use super::error::UpdateError;
use super::state::UpdateConfig;
use super::version::Version;
use crate::error::{Result, ZioError};
use crate::zio_dirs;

/// Why a check finished without installing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoUpdateReason {
    /// Automatic updates are disabled or the interval has not elapsed.
    NotDue,
    /// The newest release is not newer than the installed version.
    UpToDate,
    /// The registry has no releases.
    NoReleases,
    /// Another check was already running.
    InProgress,
}

/// Result of a completed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A newer release was installed.
    Updated {
        /// Version that was replaced.
        from: String,
        /// Version now installed.
        to: String,
        /// Snapshot of the replaced tree.
        backup_dir: PathBuf,
    },
    /// Nothing was installed.
    NoUpdate(NoUpdateReason),
}

/// Coordinates release discovery, installation and state persistence.
pub struct UpdateManager {
    config_path: PathBuf,
    install_path: PathBuf,
    repository: String,
    client: ReleaseClient,
    installer: UpdateInstaller,
    config: Mutex<UpdateConfig>,
    /// Held for the whole of a check; at most one runs at a time.
    check_guard: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("config_path", &self.config_path)
            .field("install_path", &self.install_path)
            .field("repository", &self.repository)
            .field("registry", &self.client.api_base())
            .finish_non_exhaustive()
    }
}

impl UpdateManager {
    /// Open the manager, loading (or creating) the config at `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded or created, or the
    /// HTTP clients cannot be built.
    pub fn open(
        config_path: impl Into<PathBuf>,
        install_path: impl Into<PathBuf>,
        repository: impl Into<String>,
    ) -> Result<Self> {
        let config_path = config_path.into();
        let config = UpdateConfig::load_or_create(&config_path)?;

        Ok(Self {
            config_path,
            install_path: install_path.into(),
            repository: repository.into(),
            client: ReleaseClient::new().map_err(update_error)?,
            installer: UpdateInstaller::new().map_err(update_error)?,
            config: Mutex::new(config),
            check_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Open the manager at the default locations (see [`zio_dirs`]).
    ///
    /// # Errors
    ///
    /// See [`UpdateManager::open`].
    pub fn from_env() -> Result<Self> {
        Self::open(
            zio_dirs::version_file(),
            zio_dirs::install_dir(),
            zio_dirs::update_repository(),
        )
    }

    /// Use `client` to discover releases.
    pub fn with_release_client(mut self, client: ReleaseClient) -> Self {
        self.client = client;
        self
    }

    /// Use `installer` to apply releases.
    pub fn with_installer(mut self, installer: UpdateInstaller) -> Self {
        self.installer = installer;
        self
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> UpdateConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Installed version as recorded in the config.
    pub fn current_version(&self) -> String {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_version
            .clone()
    }

    /// Repository slug being tracked.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Installation tree updates are merged into.
    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// Location of the persisted config.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether an automatic check may run now.
    pub fn is_check_due(&self) -> bool {
        self.is_check_due_at(Utc::now())
    }

    /// Whether an automatic check may run at `now`.
    pub fn is_check_due_at(&self, now: DateTime<Utc>) -> bool {
        self.config
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_check_due_at(now)
    }

    /// Returns `true` while a check or install is executing.
    pub fn is_checking(&self) -> bool {
        self.check_guard.try_lock().is_err()
    }

    /// Enable or disable the periodic update path and persist the choice.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Config`] if the config cannot be saved.
    pub fn set_auto_update_enabled(&self, enabled: bool) -> Result<()> {
        self.update_config(|c| c.auto_update_enabled = enabled)?;
        info!(
            "automatic updates {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Change the spacing between automatic checks and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Config`] for negative or non-finite values, or if
    /// the config cannot be saved.
    pub fn set_check_interval_hours(&self, hours: f64) -> Result<()> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(ZioError::Config(format!(
                "check interval must be a non-negative number of hours, got {hours}"
            )));
        }
        self.update_config(|c| c.check_interval_hours = hours)
    }

    /// Periodic entry point: checks only when due, installs if newer.
    ///
    /// Returns [`NoUpdateReason::InProgress`] without waiting if another
    /// check holds the guard.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Update`] when the check or install failed, or
    /// [`ZioError::Config`] when the outcome could not be persisted.
    pub async fn check_for_updates(&self) -> Result<CheckOutcome> {
        let started = Utc::now();
        let Ok(_guard) = self.check_guard.try_lock() else {
            debug!("update check already in progress");
            return Ok(CheckOutcome::NoUpdate(NoUpdateReason::InProgress));
        };

        if !self.is_check_due_at(started) {
            debug!("update check not due");
            self.record_check(None, started)?;
            return Ok(CheckOutcome::NoUpdate(NoUpdateReason::NotDue));
        }

        self.run_check(started).await
    }

    /// User-initiated check. Ignores the interval and the auto-update flag.
    ///
    /// # Errors
    ///
    /// See [`UpdateManager::check_for_updates`].
    pub async fn manual_check(&self) -> Result<CheckOutcome> {
        let started = Utc::now();
        let Ok(_guard) = self.check_guard.try_lock() else {
            info!("manual update check ignored: a check is already in progress");
            return Ok(CheckOutcome::NoUpdate(NoUpdateReason::InProgress));
        };

        info!("manual update check triggered");
        self.run_check(started).await
    }

    /// Body of a check; the caller holds `check_guard`.
    ///
    /// Every outcome is stamped with `started`, the moment the attempt
    /// began, not the moment it finished.
    async fn run_check(&self, started: DateTime<Utc>) -> Result<CheckOutcome> {
        let installed = self.current_version();
        let current = Version::parse(&installed).map_err(|e| {
            error!("installed version is unusable, skipping update check: {e}");
            update_error(e)
        })?;

        info!("checking {} for updates (installed {current})", self.repository);
        let release = match self.client.latest_release(&self.repository).await {
            Ok(release) => release,
            Err(UpdateError::EmptyReleaseList) => {
                info!("no releases published for {}", self.repository);
                self.record_check(None, started)?;
                return Ok(CheckOutcome::NoUpdate(NoUpdateReason::NoReleases));
            }
            Err(e) => {
                warn!("update check failed: {e}");
                self.record_check_after_failure(started);
                return Err(update_error(e));
            }
        };

        let latest = Version::parse(&release.version).map_err(|e| {
            warn!("latest release has an unusable version: {e}");
            update_error(e)
        })?;

        if latest <= current {
            info!("up to date at {current} (latest release {latest})");
            self.record_check(None, started)?;
            return Ok(CheckOutcome::NoUpdate(NoUpdateReason::UpToDate));
        }

        info!("update available: {current} -> {latest}");
        match self
            .installer
            .install(&release, &self.install_path, &current)
            .await
        {
            Ok(result) => {
                self.record_check(Some(&latest), started).inspect_err(|e| {
                    error!("installed {latest} but could not record it: {e}");
                })?;
                info!(
                    "updated {current} -> {latest} (release {}, {} bytes, {} entries replaced, {} kept)",
                    result.version,
                    result.archive_bytes,
                    result.installed.len(),
                    result.preserved.len()
                );
                Ok(CheckOutcome::Updated {
                    from: current.to_string(),
                    to: latest.to_string(),
                    backup_dir: result.backup_dir,
                })
            }
            Err(e) => {
                if e.requires_restore() {
                    error!("UPDATE INCOMPLETE, installation needs restoring: {e}");
                } else {
                    warn!("update to {latest} not installed: {e}");
                }
                self.record_check_after_failure(started);
                Err(update_error(e))
            }
        }
    }

    /// Stamp the check time and, after an install, the new version.
    fn record_check(&self, installed: Option<&Version>, checked_at: DateTime<Utc>) -> Result<()> {
        self.update_config(|c| {
            if let Some(version) = installed {
                c.current_version = version.to_string();
            }
            c.mark_checked_at(checked_at);
        })
    }

    /// Like [`Self::record_check`], but the original failure is what gets
    /// reported, so a save error is only logged.
    fn record_check_after_failure(&self, checked_at: DateTime<Utc>) {
        if let Err(e) = self.record_check(None, checked_at) {
            warn!("cannot record failed update check: {e}");
        }
    }

    /// Apply `change` and persist; memory is only updated once the write
    /// has succeeded.
    fn update_config(&self, change: impl FnOnce(&mut UpdateConfig)) -> Result<()> {
        let mut config = self.config.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = config.clone();
        change(&mut next);
        next.save(&self.config_path)?;
        *config = next;
        Ok(())
    }
}

fn update_error(e: UpdateError) -> ZioError {
    ZioError::Update(e.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    /// Manager whose registry is unreachable.
    fn offline_manager(dir: &TempDir) -> UpdateManager {
        let install = dir.path().join("install");
        std::fs::create_dir_all(&install).unwrap();
        UpdateManager::open(dir.path().join("config/version.json"), install, "owner/repo")
            .unwrap()
            .with_release_client(ReleaseClient::with_api_base("http://127.0.0.1:9").unwrap())
    }

    fn stored(manager: &UpdateManager) -> UpdateConfig {
        UpdateConfig::load_or_create(manager.config_path()).unwrap()
    }

    #[test]
    fn open_creates_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        assert!(manager.config_path().is_file());
        assert_eq!(manager.config(), UpdateConfig::default());
        assert!(manager.is_check_due());
        assert!(!manager.is_checking());
    }

    #[test]
    fn settings_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);

        manager.set_auto_update_enabled(false).unwrap();
        manager.set_check_interval_hours(6.0).unwrap();

        let on_disk = stored(&manager);
        assert!(!on_disk.auto_update_enabled);
        assert_eq!(on_disk.check_interval_hours, 6.0);
        assert!(!manager.is_check_due());

        assert!(matches!(
            manager.set_check_interval_hours(-1.0),
            Err(ZioError::Config(_))
        ));
        assert_eq!(manager.config().check_interval_hours, 6.0);
    }

    #[tokio::test]
    async fn not_due_check_skips_registry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        manager.update_config(|c| c.mark_checked_at(Utc::now())).unwrap();
        let before = manager.config().last_update_check;

        let outcome = manager.check_for_updates().await.unwrap();
        assert_eq!(outcome, CheckOutcome::NoUpdate(NoUpdateReason::NotDue));
        assert!(manager.config().last_update_check >= before);
    }

    #[tokio::test]
    async fn due_again_after_interval() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        let now = Utc::now();
        manager.update_config(|c| c.mark_checked_at(now)).unwrap();

        assert!(!manager.is_check_due_at(now));
        assert!(manager.is_check_due_at(now + Duration::hours(24)));
    }

    #[tokio::test]
    async fn network_failure_still_advances_last_check() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        let before = manager.config().last_update_check;

        let err = manager.manual_check().await.unwrap_err();
        assert!(matches!(err, ZioError::Update(_)));
        assert!(stored(&manager).last_update_check > before);
        assert!(!manager.is_check_due());
    }

    #[tokio::test]
    async fn invalid_installed_version_leaves_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        manager
            .update_config(|c| c.current_version = "not-a-version".to_owned())
            .unwrap();
        let before = stored(&manager);

        let err = manager.manual_check().await.unwrap_err();
        assert!(err.to_string().contains("not-a-version"));
        assert_eq!(stored(&manager), before);
    }

    #[tokio::test]
    async fn manual_check_runs_when_auto_update_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);
        manager.set_auto_update_enabled(false).unwrap();

        assert_eq!(
            manager.check_for_updates().await.unwrap(),
            CheckOutcome::NoUpdate(NoUpdateReason::NotDue)
        );
        // The manual path reaches the (unreachable) registry instead.
        assert!(manager.manual_check().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_call_reports_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let manager = offline_manager(&dir);

        let _held = manager.check_guard.try_lock().unwrap();
        assert!(manager.is_checking());
        assert_eq!(
            manager.manual_check().await.unwrap(),
            CheckOutcome::NoUpdate(NoUpdateReason::InProgress)
        );
        assert_eq!(
            manager.check_for_updates().await.unwrap(),
            CheckOutcome::NoUpdate(NoUpdateReason::InProgress)
        );
    }
}
