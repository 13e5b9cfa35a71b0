//! Release installation.
//!
//! Downloads a release archive into a scoped staging directory, unpacks it,
//! snapshots the live tree into `backup_<version>`, then merges the new files
//! over the installation. Reserved user config files are never overwritten.
//!
//! Once the backup exists, failures are reported as
//! [`UpdateError::PartialInstall`] and nothing is rolled back: the backup is
//! left in place so an operator can inspect it before restoring.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::checker::Release;
use super::error::UpdateError;
use super::version::Version;

/// Files holding user customization; kept when already present.
pub const RESERVED_CONFIG_FILES: &[&str] = &["config.json", "settings.json", "preferences.json"];

/// Prefix of backup directories inside the installation tree.
pub const BACKUP_PREFIX: &str = "backup_";

/// VCS metadata and interpreter caches never copied in either direction.
const TRANSIENT_NAMES: &[&str] = &[".git", "__pycache__"];
const TRANSIENT_SUFFIXES: &[&str] = &[".pyc"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a completed install.
#[derive(Debug, Clone)]
pub struct InstallResult {
    /// Release tag that was installed.
    pub version: String,
    /// Snapshot of the tree taken before any file was replaced.
    pub backup_dir: PathBuf,
    /// Top-level entries written into the installation.
    pub installed: Vec<PathBuf>,
    /// Reserved entries left untouched because they already existed.
    pub preserved: Vec<PathBuf>,
    /// Size of the downloaded archive.
    pub archive_bytes: u64,
}

/// Returns `true` if `relative` names a reserved user config file that must
/// not be replaced when it already exists at the destination.
pub fn should_preserve(relative: &Path) -> bool {
    relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| RESERVED_CONFIG_FILES.contains(&name))
}

/// Returns `true` if any component of `relative` is left out of a backup:
/// a prior backup, VCS metadata, or an interpreter cache.
pub fn is_transient(relative: &Path) -> bool {
    relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name.starts_with(BACKUP_PREFIX)
            || TRANSIENT_NAMES.contains(&name.as_ref())
            || TRANSIENT_SUFFIXES.iter().any(|s| name.ends_with(s))
    })
}

/// Returns `true` for top-level release entries the merge leaves out:
/// VCS metadata, interpreter caches, and `backup_*` directories. Plain
/// files are only skipped by exact name.
fn is_skipped_on_merge(name: &Path, is_dir: bool) -> bool {
    let name = name.as_os_str().to_string_lossy();
    TRANSIENT_NAMES.contains(&name.as_ref()) || (is_dir && name.starts_with(BACKUP_PREFIX))
}

/// Backup location for the tree currently at `version`.
pub fn backup_dir_for(install_path: &Path, version: &Version) -> PathBuf {
    install_path.join(format!("{BACKUP_PREFIX}{version}"))
}

/// Downloads, unpacks and merges releases into an installation directory.
#[derive(Debug, Clone)]
pub struct UpdateInstaller {
    http: reqwest::Client,
}

impl UpdateInstaller {
    /// Build an installer with its own HTTP client.
    ///
    /// Only the connect phase is bounded; archives may be large, so the
    /// transfer itself has no deadline.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Download`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, UpdateError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("zio-booster/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::Download(format!("cannot create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Install `release` over `install_path`, which currently holds `current`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Download`], [`UpdateError::Extract`],
    ///   [`UpdateError::Backup`]: the live tree was not touched.
    /// - [`UpdateError::PartialInstall`]: some live files may have been
    ///   replaced; the error names the backup to restore from.
    pub async fn install(
        &self,
        release: &Release,
        install_path: &Path,
        current: &Version,
    ) -> Result<InstallResult, UpdateError> {
        let staging = tempfile::Builder::new()
            .prefix("zio-update-")
            .tempdir()
            .map_err(|e| UpdateError::Download(format!("cannot create staging dir: {e}")))?;

        let archive = staging.path().join("update.zip");
        info!("downloading update {} from {}", release.version, release.download_url);
        let archive_bytes = self.download(&release.download_url, &archive).await?;

        let extract_dir = staging.path().join("extracted");
        let source_root = run_blocking(
            move || extract_archive(&archive, &extract_dir),
            UpdateError::Extract,
        )
        .await?;
        debug!("extracted release root {}", source_root.display());

        let backup_dir = backup_dir_for(install_path, current);
        {
            let install_path = install_path.to_owned();
            let backup_dir = backup_dir.clone();
            run_blocking(
                move || create_backup(&install_path, &backup_dir),
                UpdateError::Backup,
            )
            .await?;
        }
        info!("backed up installation to {}", backup_dir.display());

        let (installed, preserved) = {
            let install_path = install_path.to_owned();
            let partial_backup = backup_dir.clone();
            let join_backup = backup_dir.clone();
            run_blocking(
                move || {
                    merge_tree(&source_root, &install_path).map_err(|reason| {
                        UpdateError::PartialInstall {
                            backup_dir: partial_backup,
                            reason,
                        }
                    })
                },
                move |reason| UpdateError::PartialInstall {
                    backup_dir: join_backup,
                    reason,
                },
            )
            .await?
        };

        for kept in &preserved {
            info!("kept existing {}", kept.display());
        }
        info!(
            "installed {} ({} entries) into {}",
            release.version,
            installed.len(),
            install_path.display()
        );

        Ok(InstallResult {
            version: release.version.clone(),
            backup_dir,
            installed,
            preserved,
            archive_bytes,
        })
    }

    /// Stream `url` to `dest` without buffering the whole body.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, UpdateError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Download(format!("cannot fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Download(format!("{url} returned {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            UpdateError::Download(format!("cannot create {}: {e}", dest.display()))
        })?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| UpdateError::Download(format!("transfer interrupted: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::Download(format!("download write failed: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| UpdateError::Download(format!("download write failed: {e}")))?;

        debug!("downloaded {written} bytes to {}", dest.display());
        Ok(written)
    }
}

/// Run filesystem work off the async runtime, mapping a panicked task onto
/// the error of the stage it belonged to.
async fn run_blocking<T, F, E>(work: F, on_panic: E) -> Result<T, UpdateError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, UpdateError> + Send + 'static,
    E: FnOnce(String) -> UpdateError,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(on_panic(format!("worker task failed: {e}"))),
    }
}

/// Unpack `archive` into `dest` and return its single top-level directory.
fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf, UpdateError> {
    let file = fs::File::open(archive)
        .map_err(|e| UpdateError::Extract(format!("cannot open archive: {e}")))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| UpdateError::Extract(format!("cannot read zip: {e}")))?;

    fs::create_dir_all(dest)
        .map_err(|e| UpdateError::Extract(format!("cannot create {}: {e}", dest.display())))?;
    zip.extract(dest)
        .map_err(|e| UpdateError::Extract(format!("cannot unpack zip: {e}")))?;

    let roots = fs::read_dir(dest)
        .map_err(|e| UpdateError::Extract(format!("cannot list extracted files: {e}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| UpdateError::Extract(format!("cannot list extracted files: {e}")))?;

    match roots.as_slice() {
        [root] if root.path().is_dir() => Ok(root.path()),
        [root] => Err(UpdateError::Extract(format!(
            "archive root {} is not a directory",
            root.file_name().to_string_lossy()
        ))),
        _ => Err(UpdateError::Extract(format!(
            "expected exactly one top-level directory, found {} entries",
            roots.len()
        ))),
    }
}

/// Snapshot `install_path` into `backup_dir`, skipping transient entries.
///
/// An older backup with the same name is replaced. A failed snapshot is
/// removed so a half-written backup is never mistaken for a good one.
fn create_backup(install_path: &Path, backup_dir: &Path) -> Result<(), UpdateError> {
    if !install_path.is_dir() {
        return Err(UpdateError::Backup(format!(
            "install path {} is not a directory",
            install_path.display()
        )));
    }

    if backup_dir.exists() {
        fs::remove_dir_all(backup_dir).map_err(|e| {
            UpdateError::Backup(format!(
                "cannot replace old backup {}: {e}",
                backup_dir.display()
            ))
        })?;
    }

    if let Err(reason) = copy_tree(install_path, backup_dir, is_transient) {
        if let Err(e) = fs::remove_dir_all(backup_dir) {
            warn!("cannot remove incomplete backup {}: {e}", backup_dir.display());
        }
        return Err(UpdateError::Backup(reason));
    }
    Ok(())
}

/// Merge the top level of `source_root` into `dest`.
///
/// Returns the entries written and the reserved entries kept as-is.
fn merge_tree(source_root: &Path, dest: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), String> {
    let mut entries = fs::read_dir(source_root)
        .map_err(|e| format!("cannot list {}: {e}", source_root.display()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("cannot list {}: {e}", source_root.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut installed = Vec::new();
    let mut preserved = Vec::new();

    for entry in entries {
        let relative = PathBuf::from(entry.file_name());
        let source = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| format!("cannot stat {}: {e}", source.display()))?;
        if is_skipped_on_merge(&relative, file_type.is_dir()) {
            continue;
        }

        let target = dest.join(&relative);
        if should_preserve(&relative) && target.exists() {
            preserved.push(relative);
            continue;
        }

        remove_existing(&target)?;
        if file_type.is_dir() {
            copy_tree(&source, &target, |_| false)?;
        } else {
            copy_entry(&source, &target, file_type.is_symlink())?;
        }
        installed.push(relative);
    }

    Ok((installed, preserved))
}

/// Delete whatever currently occupies `target` so it can be replaced.
fn remove_existing(target: &Path) -> Result<(), String> {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    removed.map_err(|e| format!("cannot replace {}: {e}", target.display()))
}

/// Recursively copy `src` to `dst`, pruning entries whose path relative to
/// `src` matches `skip`.
fn copy_tree(src: &Path, dst: &Path, skip: impl Fn(&Path) -> bool) -> Result<(), String> {
    let walker = WalkDir::new(src).follow_links(false).into_iter();
    let walker = walker.filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(src)
            .map(|rel| rel.as_os_str().is_empty() || !skip(rel))
            .unwrap_or(false)
    });

    for entry in walker {
        let entry = entry.map_err(|e| format!("cannot walk {}: {e}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| format!("unexpected path {}: {e}", entry.path().display()))?;
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| format!("cannot create {}: {e}", target.display()))?;
        } else {
            copy_entry(entry.path(), &target, file_type.is_symlink())?;
        }
    }
    Ok(())
}

/// Copy one file, recreating symlinks as links where the platform allows.
fn copy_entry(src: &Path, dst: &Path, is_symlink: bool) -> Result<(), String> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }

    #[cfg(unix)]
    {
        if is_symlink {
            let link = fs::read_link(src)
                .map_err(|e| format!("cannot read link {}: {e}", src.display()))?;
            return std::os::unix::fs::symlink(&link, dst)
                .map_err(|e| format!("cannot link {}: {e}", dst.display()));
        }
    }
    #[cfg(not(unix))]
    let _ = is_symlink;

    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| format!("cannot copy {} to {}: {e}", src.display(), dst.display()))
}
