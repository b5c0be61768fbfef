//! Error type shared by every stage of the push pipeline and the listing gateway.
//!
//! Nothing in this crate retries on error. Each failure is surfaced to the immediate caller
//! with the resolved path or the server's message attached, so it can be acted on without
//! re-running at a higher log level.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The local application path is missing or is neither a directory nor a zip archive.
    #[error("Invalid application source {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    /// Transport or connectivity failure at the match, upload, poll or list stage.
    #[error("Error performing request: {0}")]
    RemoteUnavailable(String),

    /// The upload endpoint answered with a non-success status.
    #[error("Upload rejected by server (status {status}, error code {error_code}): {message}")]
    UploadRejected {
        status: u16,
        error_code: String,
        message: String,
    },

    /// The server-side job finished in the `failed` state.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The delta archive could not be built.
    #[error("Error packaging application: {0}")]
    Packaging(String),

    /// Non-success status from any endpoint other than the upload endpoint.
    #[error("Server error, status code: {status}, error code: {error_code}, message: {message}")]
    HttpStatus {
        status: u16,
        error_code: String,
        message: String,
    },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    /// Machine-readable error code reported by the server, when there is one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ApiError::UploadRejected { error_code, .. } | ApiError::HttpStatus { error_code, .. }
                if !error_code.is_empty() =>
            {
                Some(error_code.as_str())
            }
            _ => None,
        }
    }

    /// HTTP status attached to the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UploadRejected { status, .. } | ApiError::HttpStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Maps a failed fetch onto `RemoteUnavailable`, keeping its message. A status the server
    /// answered with stays `HttpStatus` so its status and error code reach the caller.
    pub(crate) fn into_remote_unavailable(self) -> ApiError {
        match self {
            ApiError::RemoteUnavailable(_) | ApiError::HttpStatus { .. } => self,
            other => ApiError::RemoteUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_source_message_names_the_path() {
        let err = ApiError::InvalidSource {
            path: PathBuf::from("/foo/bar"),
            reason: "no such file or directory".into(),
        };
        assert!(err.to_string().contains("/foo/bar"));
    }

    #[test]
    fn error_code_is_only_reported_when_present() {
        let rejected = ApiError::UploadRejected {
            status: 400,
            error_code: "CF-AppBitsUploadInvalid".into(),
            message: "The app upload is invalid".into(),
        };
        assert_eq!(rejected.error_code(), Some("CF-AppBitsUploadInvalid"));
        assert_eq!(rejected.status(), Some(400));

        let bare = ApiError::HttpStatus {
            status: 502,
            error_code: String::new(),
            message: "bad gateway".into(),
        };
        assert_eq!(bare.error_code(), None);
        assert_eq!(ApiError::JobFailed("x".into()).status(), None);
    }

    #[test]
    fn remote_unavailable_keeps_the_original_message() {
        let err = ApiError::Packaging("boom".into()).into_remote_unavailable();
        match err {
            ApiError::RemoteUnavailable(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_status_survives_fetch_error_mapping() {
        let err = ApiError::HttpStatus {
            status: 500,
            error_code: "CF-ServerError".into(),
            message: "boom".into(),
        }
        .into_remote_unavailable();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.error_code(), Some("CF-ServerError"));
    }
}
