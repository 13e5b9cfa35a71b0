//! Update state persistence.
//!
//! Tracks the installed version, the last check timestamp and the automatic
//! update preferences. Persisted as pretty-printed JSON to
//! `<config dir>/version.json`.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ZioError};

/// Version assumed for an installation that has never recorded one.
pub const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default spacing between automatic checks.
pub const DEFAULT_CHECK_INTERVAL_HOURS: f64 = 24.0;

/// Intervals above this are clamped (about a century).
const MAX_CHECK_INTERVAL_HOURS: f64 = 876_000.0;

/// Persistent update configuration, one per installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Version of the tree currently installed.
    pub current_version: String,
    /// When the registry was last consulted.
    #[serde(with = "timestamp")]
    pub last_update_check: DateTime<Utc>,
    /// Whether the periodic path may check and install.
    pub auto_update_enabled: bool,
    /// Minimum spacing between automatic checks.
    pub check_interval_hours: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            current_version: DEFAULT_VERSION.to_owned(),
            last_update_check: DateTime::<Utc>::UNIX_EPOCH,
            auto_update_enabled: true,
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
        }
    }
}

impl UpdateConfig {
    /// Load the config at `path`, writing defaults there if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Config`] if an existing file cannot be read or
    /// parsed (it is left untouched), or if the defaults cannot be written.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                info!("created update config at {}", path.display());
                return Ok(config);
            }
            Err(e) => {
                return Err(ZioError::Config(format!(
                    "cannot read update config {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            ZioError::Config(format!(
                "cannot parse update config {}: {e}",
                path.display()
            ))
        })
    }

    /// Persist the config to `path`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Config`] if the directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZioError::Config(format!(
                    "cannot create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ZioError::Config(format!("cannot serialize update config: {e}")))?;

        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, json).map_err(|e| {
            ZioError::Config(format!("cannot write {}: {e}", staged.display()))
        })?;
        std::fs::rename(&staged, path).map_err(|e| {
            ZioError::Config(format!(
                "cannot replace update config {}: {e}",
                path.display()
            ))
        })?;

        Ok(())
    }

    /// Configured spacing between automatic checks.
    pub fn check_interval(&self) -> Duration {
        let hours = self.check_interval_hours;
        if !hours.is_finite() || hours <= 0.0 {
            return Duration::zero();
        }
        Duration::milliseconds((hours.min(MAX_CHECK_INTERVAL_HOURS) * 3_600_000.0) as i64)
    }

    /// Whether an automatic check is permitted at `now`.
    pub fn is_check_due_at(&self, now: DateTime<Utc>) -> bool {
        if !self.auto_update_enabled {
            return false;
        }
        now.signed_duration_since(self.last_update_check) >= self.check_interval()
    }

    /// Record a check at `now`. The timestamp never moves backwards.
    pub fn mark_checked_at(&mut self, now: DateTime<Utc>) {
        if now > self.last_update_check {
            self.last_update_check = now;
        }
    }
}

/// RFC 3339 on write; on read also accepts naive ISO-8601 values without an
/// offset, which are taken as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp `{raw}`: {e}"))
    }
}
