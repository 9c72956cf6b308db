//! Tar archives of workspace paths, used as cache payloads.

use crate::compression::{compress, decompress};
use crate::types::CompressionType;
use relay_core::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Archive prefix for paths outside the base directory.
const ABSOLUTE_ROOT: &str = "__root__";

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(dirs) = directories::BaseDirs::new()
    {
        return dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

fn archive_name(abs_path: &Path, base_dir: &Path) -> PathBuf {
    match abs_path.strip_prefix(base_dir) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => {
            let rel: PathBuf = abs_path
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            Path::new(ABSOLUTE_ROOT).join(rel)
        }
    }
}

/// Create a compressed archive from paths relative to `base_dir`.
///
/// Paths that do not exist are skipped.
pub fn create_archive(
    paths: &[String],
    base_dir: &Path,
    compression: CompressionType,
) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for p in paths {
        let path = expand_home(p);
        let abs_path = if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        };
        if !abs_path.exists() {
            debug!(path = %abs_path.display(), "Cache path does not exist, skipping");
            continue;
        }

        let name = archive_name(&abs_path, base_dir);
        if abs_path.is_dir() {
            builder
                .append_dir_all(&name, &abs_path)
                .map_err(|e| Error::Cache(format!("Failed to pack dir: {}", e)))?;
        } else {
            builder
                .append_path_with_name(&abs_path, &name)
                .map_err(|e| Error::Cache(format!("Failed to pack file: {}", e)))?;
        }
    }

    let tarball = builder
        .into_inner()
        .map_err(|e| Error::Cache(format!("Failed to finish tar: {}", e)))?;
    compress(&tarball, compression)
}

/// Extract an archive produced by [`create_archive`] under `base_dir`.
///
/// Returns the number of entries written.
pub fn extract_archive(
    payload: &[u8],
    base_dir: &Path,
    compression: CompressionType,
) -> Result<usize> {
    let tarball = decompress(payload, compression)?;
    let mut archive = tar::Archive::new(tarball.as_slice());
    let mut count = 0;

    let entries = archive
        .entries()
        .map_err(|e| Error::Cache(format!("Failed to read archive: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Cache(format!("Failed to read entry: {}", e)))?;
        let name = entry
            .path()
            .map_err(|e| Error::Cache(format!("Invalid entry path: {}", e)))?
            .into_owned();

        if name.components().any(|c| matches!(c, Component::ParentDir)) {
            warn!(path = %name.display(), "Skipping archive entry outside destination");
            continue;
        }

        let target = match name.strip_prefix(ABSOLUTE_ROOT) {
            Ok(rest) => Path::new("/").join(rest),
            Err(_) => base_dir.join(&name),
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .map_err(|e| Error::Cache(format!("Failed to unpack {}: {}", name.display(), e)))?;
        count += 1;
    }

    Ok(count)
}
