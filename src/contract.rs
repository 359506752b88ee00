//! Seams between the pipelines and their external collaborators.
//!
//! `build` talks to a bundler through [`Compiler`] and `deploy` talks to the
//! remote endpoint through [`Uploader`]. Production implementations live in
//! [`crate::compiler`] and [`crate::upload`]; both traits are annotated for
//! `mockall` so tests can drive the pipelines without a toolchain or a server.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub use crate::compiler::CompileError;
pub use crate::upload::UploadError;

/// Relative file path (forward slashes) to file content.
///
/// Used both for the uploaded package and for the server's response.
pub type Package = BTreeMap<String, String>;

/// Produces one bundle from one entry point.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Bundle `entry` (relative to the project root) and return the bundle's bytes.
    async fn bundle(&self, entry: &Path) -> Result<Vec<u8>, CompileError>;
}

/// Sends a package to the deploy endpoint.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `package` and return the parsed response payload.
    async fn send_package(&self, package: &Package) -> Result<Package, UploadError>;
}
