//! `build`: compiles every glob-matched source into the `dest/` tree.
//!
//! The destination directory is recreated on every run. Sources are resolved
//! up front, then compiled and written independently: up to
//! [`max_concurrent_builds`] bundler processes run at once and one failure
//! never stops the others. Each outcome lands in the returned [`BuildReport`].
//!
//! # Path mapping
//! `scripts/widget.ts` → `dest/widget.js`, `src/ui/panel.ts` → `dest/ui/panel.js`.
//! The first path segment is dropped, the remaining directories are kept, and
//! the extension is replaced with [`OUTPUT_EXTENSION`].
//!
//! The mapping is lossy: `src/a.ts` and `lib/a.ts` both want `dest/a.js`. The
//! first source in match order keeps the output; every later one is reported
//! as a [`BuildError::Collision`] and never compiled.
//!
//! `sourceRootsPattern` must be relative to the project root.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::compiler::CompileError;
use crate::contract::Compiler;
use crate::settings::{Settings, SettingsError};

/// Extension given to every bundle.
pub const OUTPUT_EXTENSION: &str = "js";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to remove build directory {path}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("source pattern `{pattern}` must be relative to the project directory")]
    AbsolutePattern { pattern: String },

    #[error("cannot map {path} into the build directory")]
    Unmappable { path: PathBuf },

    #[error("{output} is already produced by {first}")]
    Collision { output: PathBuf, first: PathBuf },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One bundle written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltFile {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// One source that produced no output.
#[derive(Debug)]
pub struct FailedFile {
    pub source: PathBuf,
    pub error: BuildError,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<BuiltFile>,
    pub failed: Vec<FailedFile>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Upper bound on bundler processes running at the same time.
pub fn max_concurrent_builds() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Runs a full build for the project described by `settings`.
///
/// Errors returned here abort the whole build (bad settings, unremovable
/// `dest/`, invalid pattern). Per-file failures are reported in the
/// [`BuildReport`] instead.
pub async fn build<C>(settings: &Settings, compiler: &C) -> Result<BuildReport, BuildError>
where
    C: Compiler + ?Sized,
{
    let pattern = settings.source_roots_pattern()?;
    check_pattern(pattern)?;
    let dest_root = settings.build_dir();

    clean_build_dir(&dest_root).await?;
    let sources = resolve_sources(&settings.project_root, pattern)?;
    info!(pattern, count = sources.len(), "Resolved source files");

    let mut report = BuildReport::default();
    let (jobs, rejected) = plan_outputs(sources, &dest_root);
    report.failed.extend(rejected);

    let limit = max_concurrent_builds();
    debug!(jobs = jobs.len(), limit, "Starting bundler jobs");
    let outcomes: Vec<_> = stream::iter(jobs)
        .map(|(source, output)| build_one(compiler, source, output))
        .buffer_unordered(limit)
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Ok(built) => report.built.push(built),
            Err(file) => report.failed.push(file),
        }
    }

    info!(
        built = report.built.len(),
        failed = report.failed.len(),
        "Build finished"
    );
    Ok(report)
}

/// Rejects patterns that would match outside the project directory.
pub fn check_pattern(pattern: &str) -> Result<(), BuildError> {
    if Path::new(pattern).has_root() {
        error!(pattern, "Source pattern is not relative to the project");
        return Err(BuildError::AbsolutePattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// Pairs every source with its output path. Sources without a usable output,
/// or whose output is already claimed by an earlier source, are rejected.
pub fn plan_outputs(
    sources: Vec<PathBuf>,
    dest_root: &Path,
) -> (Vec<(PathBuf, PathBuf)>, Vec<FailedFile>) {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut jobs = Vec::new();
    let mut rejected = Vec::new();

    for source in sources {
        let Some(output) = output_path(&source, dest_root) else {
            let error = BuildError::Unmappable {
                path: source.clone(),
            };
            rejected.push(failed(source, error));
            continue;
        };
        if let Some(first) = claimed.get(&output) {
            let error = BuildError::Collision {
                output,
                first: first.clone(),
            };
            rejected.push(failed(source, error));
            continue;
        }
        claimed.insert(output.clone(), source.clone());
        jobs.push((source, output));
    }
    (jobs, rejected)
}

/// Deletes `dest_root` and everything below it. A missing directory is fine.
pub async fn clean_build_dir(dest_root: &Path) -> Result<(), BuildError> {
    match tokio::fs::remove_dir_all(dest_root).await {
        Ok(()) => {
            debug!(path = %dest_root.display(), "Removed build directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!(error = ?e, path = %dest_root.display(), "Failed to remove build directory");
            Err(BuildError::Clean {
                path: dest_root.to_path_buf(),
                source: e,
            })
        }
    }
}

/// Expands `pattern` under `project_root` into regular files, relative to the root.
pub fn resolve_sources(project_root: &Path, pattern: &str) -> Result<Vec<PathBuf>, BuildError> {
    check_pattern(pattern)?;
    let root = glob::Pattern::escape(&project_root.to_string_lossy());
    let full_pattern = format!("{}/{}", root.trim_end_matches('/'), pattern);

    let entries = glob::glob(&full_pattern).map_err(|e| {
        error!(error = ?e, pattern, "Invalid source pattern");
        BuildError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        }
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => {
                let relative = path
                    .strip_prefix(project_root)
                    .map(Path::to_path_buf)
                    .unwrap_or(path);
                sources.push(relative);
            }
            Ok(path) => debug!(path = %path.display(), "Skipping non-file match"),
            Err(e) => warn!(error = ?e, path = %e.path().display(), "Unreadable path while matching sources"),
        }
    }
    Ok(sources)
}

/// Maps a project-relative source path to its bundle path under `dest_root`.
///
/// Returns `None` for paths that cannot stay inside `dest_root` (absolute
/// paths, `..` segments) or that have no file name.
pub fn output_path(source: &Path, dest_root: &Path) -> Option<PathBuf> {
    let mut segments = Vec::new();
    for component in source.components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let (file_name, parents) = segments.split_last()?;
    let mut output = dest_root.to_path_buf();
    for dir in parents.iter().skip(1) {
        output.push(dir);
    }
    output.push(Path::new(file_name).with_extension(OUTPUT_EXTENSION));
    Some(output)
}

fn failed(source: PathBuf, error: BuildError) -> FailedFile {
    error!(source = %source.display(), error = %error, "Failed to build file");
    FailedFile { source, error }
}

async fn build_one<C>(compiler: &C, source: PathBuf, output: PathBuf) -> Result<BuiltFile, FailedFile>
where
    C: Compiler + ?Sized,
{
    let bundle = match compiler.bundle(&source).await {
        Ok(bundle) => bundle,
        Err(e) => return Err(failed(source, e.into())),
    };

    if let Err(e) = write_bundle(&output, &bundle).await {
        return Err(failed(source, e));
    }

    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(
        source = %source.display(),
        output = %output.display(),
        "File {} saved", file_name
    );
    Ok(BuiltFile { source, output })
}

async fn write_bundle(output: &Path, bundle: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BuildError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(output, bundle)
        .await
        .map_err(|e| BuildError::Write {
            path: output.to_path_buf(),
            source: e,
        })
}
