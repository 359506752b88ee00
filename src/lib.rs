//! rsd: scaffold, bundle and deploy remote scripts.
//!
//! # Usage
//! The `rsd` binary wraps [`cli::run`]. The pipelines are plain async functions
//! ([`build::build`], [`deploy::deploy`]) over the seams in [`contract`], so they
//! can be driven by mocks in tests.

pub mod backup;
pub mod build;
pub mod cli;
pub mod compiler;
pub mod contract;
pub mod deploy;
pub mod package;
pub mod scaffold;
pub mod settings;
pub mod upload;

pub use cli::{run, Cli, Commands};
