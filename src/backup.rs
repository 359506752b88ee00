//! Backup writer: stores the deploy endpoint's reply under `backups/`.
//!
//! Every response key is a relative path. Keys that would leave the backups
//! root are rejected before anything is written. Existing files are overwritten.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use crate::contract::Package;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("refusing to back up `{key}`: path escapes the backups directory")]
    UnsafePath { key: String },

    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a response key to a file path below `backups_root`.
pub fn backup_path(backups_root: &Path, key: &str) -> Result<PathBuf, BackupError> {
    let unsafe_path = || BackupError::UnsafePath {
        key: key.to_string(),
    };

    let mut path = backups_root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(key).components() {
        match component {
            Component::Normal(segment) => {
                path.push(segment);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path())
            }
        }
    }
    if depth == 0 {
        return Err(unsafe_path());
    }
    Ok(path)
}

/// Writes every entry of `payload` below `backups_root`. An empty payload writes nothing.
pub async fn write_backup(
    backups_root: &Path,
    payload: &Package,
) -> Result<Vec<PathBuf>, BackupError> {
    let targets = payload
        .iter()
        .map(|(key, content)| {
            backup_path(backups_root, key)
                .map(|path| (path, content))
                .inspect_err(|e| error!(error = %e, key = %key, "Rejected backup entry"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut written = Vec::with_capacity(targets.len());
    for (path, content) in targets {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                error!(error = ?e, path = %parent.display(), "Failed to create backup directory");
                BackupError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                }
            })?;
        }
        tokio::fs::write(&path, content).await.map_err(|e| {
            error!(error = ?e, path = %path.display(), "Failed to write backup file");
            BackupError::Write {
                path: path.clone(),
                source: e,
            }
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(path = %path.display(), "File {} saved", file_name);
        written.push(path);
    }
    Ok(written)
}
