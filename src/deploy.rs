//! Deploy pipeline: package `dest/`, upload it, back up the reply.
//!
//! The three steps run strictly in order. The package is complete before the
//! request starts, and the backup starts only after the full response body has
//! been parsed. Any step's error ends the deploy.

use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

use crate::backup::{write_backup, BackupError};
use crate::contract::Uploader;
use crate::package::{pack, PackageError};
use crate::settings::Settings;
use crate::upload::UploadError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

#[derive(Debug, Default)]
pub struct DeployReport {
    /// Number of files sent to the endpoint.
    pub packaged: usize,
    /// Backup files written from the endpoint's reply.
    pub backed_up: Vec<PathBuf>,
}

pub async fn deploy<U>(settings: &Settings, uploader: &U) -> Result<DeployReport, DeployError>
where
    U: Uploader + ?Sized,
{
    let build_dir = settings.build_dir();
    info!(build_dir = %build_dir.display(), "[DEPLOY] Packaging build output");
    let package = pack(&build_dir).await?;

    info!(files = package.len(), "[DEPLOY] Sending package");
    let response = match uploader.send_package(&package).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "[DEPLOY][ERROR] Upload failed");
            return Err(e.into());
        }
    };
    info!("Deployed");

    let backed_up = if response.is_empty() {
        info!("[DEPLOY] Response carried no backup payload");
        Vec::new()
    } else {
        let backups_dir = settings.backups_dir();
        info!(
            entries = response.len(),
            backups_dir = %backups_dir.display(),
            "[DEPLOY] Writing backup"
        );
        write_backup(&backups_dir, &response).await?
    };

    Ok(DeployReport {
        packaged: package.len(),
        backed_up,
    })
}
