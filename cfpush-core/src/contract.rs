//! # contract: the transport seam between the engine and the Cloud Controller
//!
//! Every network call made by the push pipeline and the pagination gateway goes through the
//! [`Gateway`] trait. The production implementation is
//! [`CloudControllerGateway`](crate::gateway::CloudControllerGateway); tests substitute the
//! `mockall`-generated `MockGateway` or a small hand-written fake.
//!
//! All methods take fully-resolved URLs (see [`Config::url`](crate::config::Config::url)) and
//! return the decoded JSON body. Status and transport failures are already mapped onto
//! [`ApiError`](crate::error::ApiError) by the implementor.

#![allow(unused)]

use std::path::PathBuf;

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::error::Result;

/// File name of the archive part in the bits upload request.
pub const APPLICATION_FILE_NAME: &str = "application.zip";

/// A fully built bits upload body.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// JSON array of matched fingerprints; `[]` on a first push.
    pub resources: String,
    /// Packaged delta archive on disk. Owned by the upload attempt that built it.
    pub archive_path: PathBuf,
    pub archive_size: u64,
    pub file_name: &'static str,
}

/// Asynchronous JSON transport against the Cloud Controller.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// GET a JSON resource.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value>;

    /// PUT a JSON body and decode the JSON reply.
    async fn put_json(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value>;

    /// PUT a multipart body with a `resources` field and an `application` file part.
    async fn put_multipart(&self, url: &str, request: UploadRequest)
        -> Result<serde_json::Value>;
}
