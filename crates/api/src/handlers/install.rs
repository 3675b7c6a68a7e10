//! Saving, installing and uninstalling downloaded items.
//!
//! A downloaded file is first saved into its install type's destination
//! directory, then installed: zip archives are extracted in place, `bin`
//! items are made executable, anything else is installed as saved. The
//! returned file list is relative to the destination and is what
//! uninstall removes later.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Install task failed: {0}")]
    Task(String),
}

/// Reject anything but a single normal path component.
fn plain_name(name: &str) -> Result<&str, InstallError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(InstallError::InvalidName(name.to_string())),
    }
}

/// Copy a staged download to `destination/filename`.
pub async fn save_file(
    staged: &Path,
    destination: &Path,
    filename: &str,
) -> Result<PathBuf, InstallError> {
    let filename = plain_name(filename)?;
    tokio::fs::create_dir_all(destination).await?;
    let target = destination.join(filename);
    tokio::fs::copy(staged, &target).await?;
    tracing::debug!(target = %target.display(), "Item saved");
    Ok(target)
}

/// Install a saved file. Returns the installed names relative to
/// `destination`.
pub async fn install_file(
    saved: &Path,
    destination: &Path,
    install_type: &str,
) -> Result<Vec<String>, InstallError> {
    let filename = saved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| InstallError::InvalidName(saved.display().to_string()))?;

    if is_zip(&filename) {
        let archive = saved.to_path_buf();
        let dest = destination.to_path_buf();
        let files = tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
            .await
            .map_err(|e| InstallError::Task(e.to_string()))??;
        tokio::fs::remove_file(saved).await?;
        return Ok(files);
    }

    if install_type == "bin" {
        make_executable(saved).await?;
    }
    Ok(vec![filename])
}

/// Remove previously installed files. Already missing files are ignored.
pub async fn uninstall_files(destination: &Path, files: &[String]) -> Result<(), InstallError> {
    for name in files {
        let path = destination.join(plain_name(name)?);
        let removed = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed installed file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn is_zip(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".zip")
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    tokio::fs::set_permissions(path, permissions).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Extract every entry of `archive` below `dest`.
///
/// Entries whose path would leave `dest` are rejected. Returns the sorted
/// top-level names that were created.
fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<String>, InstallError> {
    let mut zip = zip::ZipArchive::new(fs::File::open(archive)?)?;
    let mut top_level = BTreeSet::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| InstallError::InvalidName(entry.name().to_string()))?;

        if let Some(Component::Normal(first)) = relative.components().next() {
            top_level.insert(first.to_string_lossy().into_owned());
        }

        let out_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(top_level.into_iter().collect())
}
