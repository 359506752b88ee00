//! `init`: writes the default project templates into a project directory.
//!
//! The templates under `defaults/` are embedded into the binary at compile time,
//! so `rsd init` works from any location. Existing files with the same relative
//! path are overwritten.

use include_dir::{include_dir, Dir, DirEntry};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

static DEFAULTS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/defaults");

#[derive(Debug, Error)]
pub enum ScaffoldError {
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

/// Copies every template file into `project_root`, returning the written paths.
pub fn init(project_root: &Path) -> Result<Vec<PathBuf>, ScaffoldError> {
    info!(project_root = %project_root.display(), "Writing default configuration");
    let mut written = Vec::new();
    copy_dir(&DEFAULTS, project_root, &mut written)?;
    info!(count = written.len(), "Default configuration written");
    Ok(written)
}

fn copy_dir(dir: &Dir<'_>, target: &Path, written: &mut Vec<PathBuf>) -> Result<(), ScaffoldError> {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(sub) => copy_dir(sub, target, written)?,
            DirEntry::File(file) => {
                let out_path = target.join(file.path());
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        error!(error = ?e, path = %parent.display(), "Failed to create directory");
                        ScaffoldError::CreateDir {
                            path: parent.to_path_buf(),
                            source: e,
                        }
                    })?;
                }
                fs::write(&out_path, file.contents()).map_err(|e| {
                    error!(error = ?e, path = %out_path.display(), "Failed to write template");
                    ScaffoldError::Write {
                        path: out_path.clone(),
                        source: e,
                    }
                })?;
                debug!(path = %out_path.display(), "Template written");
                written.push(out_path);
            }
        }
    }
    Ok(())
}
