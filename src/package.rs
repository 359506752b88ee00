//! Packager: reads a build output tree into a [`Package`].
//!
//! The walk and the reads are blocking filesystem work, so [`pack`] hands the
//! whole job to tokio's blocking pool. [`pack_dir`] is the same walk for
//! callers that are not on a runtime.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::contract::Package;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("build directory {path} does not exist, run `rsd build` first")]
    MissingRoot { path: PathBuf },

    #[error("failed to walk {root}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("packaging task did not complete")]
    Task(#[from] tokio::task::JoinError),
}

/// Packs `root` on the blocking pool. See [`pack_dir`].
pub async fn pack(root: &Path) -> Result<Package, PackageError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || pack_dir(&root)).await?
}

/// Walks `root` and records every regular file under its root-relative,
/// `/`-joined path. The package is returned only after the whole walk.
pub fn pack_dir(root: &Path) -> Result<Package, PackageError> {
    if !root.is_dir() {
        error!(path = %root.display(), "Build directory missing");
        return Err(PackageError::MissingRoot {
            path: root.to_path_buf(),
        });
    }

    let mut package = Package::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            error!(error = ?e, root = %root.display(), "Failed to walk build directory");
            PackageError::Walk {
                root: root.to_path_buf(),
                source: e,
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let key = package_key(root, path);
        let bytes = fs::read(path).map_err(|e| {
            error!(error = ?e, path = %path.display(), "Failed to read file for packaging");
            PackageError::Read {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), "File is not valid UTF-8, packaging lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        debug!(key = %key, size = content.len(), "Packaged file");
        package.insert(key, content);
    }

    info!(root = %root.display(), files = package.len(), "Packaged build output");
    Ok(package)
}

fn package_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
