//! Bundler invoked as a child process.
//!
//! The command line comes from settings (default `npx browserify --plugin tsify`);
//! the entry point is appended as the last argument and the bundle is read from
//! stdout. The process runs inside the project root so the bundler picks up the
//! project's `tsconfig.json` and `node_modules`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::Compiler;
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no compiler command configured")]
    EmptyCommand,

    #[error("failed to launch compiler `{program}`")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compiler exited with {status} for {entry}: {stderr}")]
    Failed {
        entry: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Runs an external bundler command for each entry point.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandCompiler {
    pub fn new(command: &[String], working_dir: &Path) -> Result<Self, CompileError> {
        let (program, args) = command.split_first().ok_or(CompileError::EmptyCommand)?;
        Ok(CommandCompiler {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: working_dir.to_path_buf(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CompileError> {
        let compiler = CommandCompiler::new(&settings.compiler, &settings.project_root)?;
        info!(
            program = %compiler.program,
            args = ?compiler.args,
            working_dir = %compiler.working_dir.display(),
            "Initialized compiler"
        );
        Ok(compiler)
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn bundle(&self, entry: &Path) -> Result<Vec<u8>, CompileError> {
        debug!(program = %self.program, entry = %entry.display(), "Invoking compiler");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(entry)
            .current_dir(&self.working_dir)
            .output()
            .await
            .map_err(|e| {
                error!(error = ?e, program = %self.program, "Failed to launch compiler process");
                CompileError::Launch {
                    program: self.program.clone(),
                    source: e,
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                entry = %entry.display(),
                status = %output.status,
                "Compiler exited with non-zero code: {}", stderr
            );
            return Err(CompileError::Failed {
                entry: entry.to_path_buf(),
                status: output.status.to_string(),
                stderr,
            });
        }

        debug!(entry = %entry.display(), size = output.stdout.len(), "Compiler produced bundle");
        Ok(output.stdout)
    }
}
