//! Settings loading: environment variables plus the project's `package.json`.
//!
//! Settings are read once at start-up by [`Settings::load`] and then passed by
//! reference into every command. Nothing else in the crate reads the process
//! environment.
//!
//! # Sources
//! - `RSD_ENVIRONMENT`, `RSD_API_ENDPOINT`, `RSD_API_TOKEN` from the environment
//!   (a `.env` file is loaded by `main` before this runs).
//! - The `"remote-scripting-development"` block of `package.json` in the
//!   project directory, providing `sourceRootsPattern` and an optional
//!   `compiler` command line.
//!
//! Missing values are kept as `None`; the command that needs a value asks for
//! it through an accessor and gets a [`SettingsError::Missing`] otherwise. This
//! keeps `init` usable in an empty directory.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

/// Key of the settings block inside `package.json`.
pub const SETTINGS_KEY: &str = "remote-scripting-development";
/// Project configuration file, relative to the project root.
pub const PROJECT_CONFIG_FILE: &str = "package.json";
/// Build output directory, relative to the project root.
pub const BUILD_DIR: &str = "dest";
/// Backup directory, relative to the project root.
pub const BACKUPS_DIR: &str = "backups";
/// Bundler invoked when the project does not configure one. The entry point is appended.
pub const DEFAULT_COMPILER: &[&str] = &["npx", "browserify", "--plugin", "tsify"];

pub const ENV_ENVIRONMENT: &str = "RSD_ENVIRONMENT";
pub const ENV_API_ENDPOINT: &str = "RSD_API_ENDPOINT";
pub const ENV_API_TOKEN: &str = "RSD_API_TOKEN";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{name} is not configured ({hint})")]
    Missing { name: &'static str, hint: &'static str },
}

/// Deployment environment. Only `dev` relaxes TLS checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Maps the raw `RSD_ENVIRONMENT` value. Anything but `"dev"` is production.
    pub fn from_value(raw: Option<&str>) -> Self {
        match raw {
            Some("dev") => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// Whether server certificates must be valid. Self-signed certificates are
    /// accepted in development only.
    pub fn verifies_certificates(self) -> bool {
        self.is_production()
    }
}

/// The `"remote-scripting-development"` block of `package.json`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub source_roots_pattern: Option<String>,
    #[serde(default)]
    pub compiler: Option<Vec<String>>,
}

/// Immutable settings for one invocation.
#[derive(Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub environment: Environment,
    pub api_endpoint: Option<String>,
    pub api_token: Option<String>,
    pub source_roots_pattern: Option<String>,
    /// Bundler command line; the entry point is appended as the last argument.
    pub compiler: Vec<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("project_root", &self.project_root)
            .field("environment", &self.environment)
            .field("api_endpoint", &self.api_endpoint)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("source_roots_pattern", &self.source_roots_pattern)
            .field("compiler", &self.compiler)
            .finish()
    }
}

impl Settings {
    /// Reads the process environment and `package.json` under `project_root`.
    pub fn load<P: AsRef<Path>>(project_root: P) -> Result<Self, SettingsError> {
        let project_root = project_root.as_ref();
        let project = load_project_settings(project_root)?;
        let settings = Settings::from_parts(project_root, |name| std::env::var(name).ok(), project);
        settings.trace_loaded();
        Ok(settings)
    }

    /// Assembles settings from an environment lookup and an already parsed project block.
    pub fn from_parts<F>(project_root: &Path, env: F, project: ProjectSettings) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let compiler = project
            .compiler
            .filter(|cmd| !cmd.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPILER.iter().map(|s| s.to_string()).collect());

        Settings {
            project_root: project_root.to_path_buf(),
            environment: Environment::from_value(env(ENV_ENVIRONMENT).as_deref()),
            api_endpoint: env(ENV_API_ENDPOINT).filter(|v| !v.is_empty()),
            api_token: env(ENV_API_TOKEN),
            source_roots_pattern: project.source_roots_pattern,
            compiler,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            project_root = %self.project_root.display(),
            environment = ?self.environment,
            api_endpoint = self.api_endpoint.as_deref().unwrap_or("<unset>"),
            api_token_set = self.api_token.is_some(),
            "Loaded settings"
        );
        debug!(settings = ?self, "Settings loaded (full debug)");
    }

    pub fn build_dir(&self) -> PathBuf {
        self.project_root.join(BUILD_DIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.project_root.join(BACKUPS_DIR)
    }

    pub fn source_roots_pattern(&self) -> Result<&str, SettingsError> {
        self.source_roots_pattern
            .as_deref()
            .ok_or(SettingsError::Missing {
                name: "sourceRootsPattern",
                hint: "set it in the \"remote-scripting-development\" block of package.json",
            })
    }

    pub fn api_endpoint(&self) -> Result<&str, SettingsError> {
        self.api_endpoint.as_deref().ok_or(SettingsError::Missing {
            name: ENV_API_ENDPOINT,
            hint: "set it in the environment or .env",
        })
    }

    pub fn api_token(&self) -> Result<&str, SettingsError> {
        self.api_token.as_deref().ok_or(SettingsError::Missing {
            name: ENV_API_TOKEN,
            hint: "set it in the environment or .env",
        })
    }
}

/// Reads the settings block of `package.json`. A missing file or block yields defaults.
pub fn load_project_settings(project_root: &Path) -> Result<ProjectSettings, SettingsError> {
    let path = project_root.join(PROJECT_CONFIG_FILE);

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(config_path = %path.display(), "No project configuration found, using defaults");
            return Ok(ProjectSettings::default());
        }
        Err(e) => {
            error!(error = ?e, config_path = %path.display(), "Failed to read project configuration");
            return Err(SettingsError::Read { path, source: e });
        }
    };

    let parse = |source: serde_json::Error| SettingsError::Parse {
        path: path.clone(),
        source,
    };

    let mut manifest: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = %path.display(), "Failed to parse project configuration");
        parse(e)
    })?;

    match manifest.get_mut(SETTINGS_KEY).map(serde_json::Value::take) {
        Some(block) => {
            let project: ProjectSettings = serde_json::from_value(block).map_err(|e| {
                error!(error = ?e, key = SETTINGS_KEY, "Invalid settings block");
                parse(e)
            })?;
            info!(config_path = %path.display(), ?project, "Parsed project settings");
            Ok(project)
        }
        None => {
            info!(config_path = %path.display(), key = SETTINGS_KEY, "Settings block absent, using defaults");
            Ok(ProjectSettings::default())
        }
    }
}
