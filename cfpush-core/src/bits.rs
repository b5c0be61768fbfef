//! High-level pipeline: pushes a local application's bits and waits for the server job.
//!
//! One call to [`ApplicationBits::upload_app`] runs a fresh cycle with nothing shared between
//! attempts:
//!   - collect fingerprints for the directory or zip archive ([`crate::fingerprint`])
//!   - ask the server which ones it already has ([`crate::matcher`])
//!   - package the remainder into a temp zip ([`crate::zipper`])
//!   - report progress once, then upload the manifest and archive as one multipart request
//!   - poll the returned job until it is terminal ([`crate::job`])
//!
//! # Error Handling
//! Each stage returns immediately with its [`ApiError`]; nothing is retried. Temp directories
//! and archives are owned by the stage values and released on every exit path.
//!
//! Concurrent uploads of the same application are not serialized here; callers prevent them.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::contract::{Gateway, UploadRequest, APPLICATION_FILE_NAME};
use crate::error::{ApiError, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::job::{self, UploadJob};
use crate::matcher;
use crate::zipper::{self, PackagedArchive};

/// Serializes the resource manifest part. An empty manifest is exactly `[]`.
pub fn manifest_json(matched: &[Fingerprint]) -> Result<String> {
    serde_json::to_string(matched)
        .map_err(|e| ApiError::Packaging(format!("encoding resource manifest: {e}")))
}

pub struct ApplicationBits<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    config: Config,
}

impl<G: Gateway + ?Sized> ApplicationBits<G> {
    pub fn new(gateway: Arc<G>, config: Config) -> Self {
        Self { gateway, config }
    }

    /// Uploads the application at `path` to `app_guid` and waits for the server to finish
    /// processing it.
    ///
    /// `progress` receives the resolved source path, the archive size in bytes and the number of
    /// files being uploaded, exactly once, before the upload request is sent.
    pub async fn upload_app<P>(&self, app_guid: &str, path: &Path, progress: P) -> Result<()>
    where
        P: FnOnce(&Path, u64, u64),
    {
        tracing::info!(app_guid, path = %path.display(), "[PUSH] Starting application upload");

        let app = fingerprint::collect(path)?;
        let outcome =
            matcher::match_resources(self.gateway.as_ref(), &self.config, &app.fingerprints)
                .await?;
        let archive = zipper::package(&app.root, &outcome.to_upload)?;

        progress(&app.source_path, archive.size, archive.file_count);

        let mut job = self.upload_bits(app_guid, &outcome.matched, &archive).await?;
        drop(archive);
        drop(app);

        job::poll_until_complete(self.gateway.as_ref(), &self.config, &mut job)
            .await
            .map_err(|e| {
                tracing::error!(app_guid, job = %job.guid, error = %e, "[PUSH] Upload job did not finish");
                e
            })?;
        tracing::info!(app_guid, job = %job.guid, "[PUSH] Application upload complete");
        Ok(())
    }

    /// Sends the manifest and archive, returning the queued job.
    pub async fn upload_bits(
        &self,
        app_guid: &str,
        matched: &[Fingerprint],
        archive: &PackagedArchive,
    ) -> Result<UploadJob> {
        let url = self
            .config
            .url(&format!("/v2/apps/{app_guid}/bits?async=true"));
        let request = UploadRequest {
            resources: manifest_json(matched)?,
            archive_path: archive.to_path_buf(),
            archive_size: archive.size,
            file_name: APPLICATION_FILE_NAME,
        };
        tracing::info!(
            app_guid,
            matched = matched.len(),
            files = archive.file_count,
            bytes = archive.size,
            "[PUSH] Uploading application bits"
        );

        let body = self
            .gateway
            .put_multipart(&url, request)
            .await
            .map_err(|e| match e {
                ApiError::HttpStatus {
                    status,
                    error_code,
                    message,
                } => {
                    tracing::error!(app_guid, status, error_code = %error_code, message = %message, "[PUSH] Upload rejected");
                    ApiError::UploadRejected {
                        status,
                        error_code,
                        message,
                    }
                }
                other => {
                    tracing::error!(app_guid, error = %other, "[PUSH] Upload request failed");
                    other
                }
            })?;

        let job = UploadJob::from_response(body)?;
        tracing::info!(app_guid, job = %job.guid, status_url = %job.status_url, "[PUSH] Upload accepted");
        Ok(job)
    }
}
