//! Resource matching: which fingerprints does the server already hold?

use std::collections::HashSet;

use crate::config::Config;
use crate::contract::Gateway;
use crate::error::{ApiError, Result};
use crate::fingerprint::Fingerprint;

pub const RESOURCE_MATCH_PATH: &str = "/v2/resource_match";

/// Local fingerprints split into what the server has and what must be uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// The resource manifest: known server-side, in local order.
    pub matched: Vec<Fingerprint>,
    pub to_upload: Vec<Fingerprint>,
}

/// Splits `fingerprints` by the server's reply, keyed on `(path, digest)`.
///
/// Entries the server returns that were never sent are ignored, so `matched` is always a
/// subset of the local set and `to_upload` its exact complement.
pub fn partition(fingerprints: &[Fingerprint], known: &[Fingerprint]) -> MatchOutcome {
    let known: HashSet<(&str, &str)> = known.iter().map(Fingerprint::key).collect();
    let (matched, to_upload) = fingerprints
        .iter()
        .cloned()
        .partition(|f| known.contains(&f.key()));
    MatchOutcome { matched, to_upload }
}

fn is_unsupported(err: &ApiError) -> bool {
    matches!(err.status(), Some(404) | Some(405) | Some(501))
        && matches!(err, ApiError::HttpStatus { .. })
}

/// Asks the server which of `fingerprints` it already has.
///
/// Transport failures surface as [`ApiError::RemoteUnavailable`], server statuses as
/// [`ApiError::HttpStatus`]. An unsupported endpoint degrades to uploading everything when `config.resource_match_fallback` is set.
pub async fn match_resources<G>(
    gateway: &G,
    config: &Config,
    fingerprints: &[Fingerprint],
) -> Result<MatchOutcome>
where
    G: Gateway + ?Sized,
{
    if fingerprints.is_empty() {
        return Ok(MatchOutcome::default());
    }

    let body = serde_json::to_value(fingerprints)
        .map_err(|e| ApiError::InvalidResponse(format!("encoding fingerprints: {e}")))?;
    let url = config.url(RESOURCE_MATCH_PATH);
    tracing::info!(files = fingerprints.len(), "Matching resources against server");

    let reply = match gateway.put_json(&url, body).await {
        Ok(reply) => reply,
        Err(e) if is_unsupported(&e) && config.resource_match_fallback => {
            tracing::warn!(
                error = %e,
                files = fingerprints.len(),
                "Resource matching unsupported by server, uploading every file"
            );
            return Ok(MatchOutcome {
                matched: Vec::new(),
                to_upload: fingerprints.to_vec(),
            });
        }
        Err(e) => {
            tracing::error!(error = %e, "Resource matching failed");
            return Err(e.into_remote_unavailable());
        }
    };

    let known: Vec<Fingerprint> = serde_json::from_value(reply).map_err(|e| {
        tracing::error!(error = ?e, "Resource match reply did not decode");
        ApiError::InvalidResponse(format!("resource match reply: {e}"))
    })?;
    let outcome = partition(fingerprints, &known);
    tracing::info!(
        matched = outcome.matched.len(),
        to_upload = outcome.to_upload.len(),
        "Resource matching complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockGateway;

    fn fp(path: &str, digest: &str) -> Fingerprint {
        Fingerprint {
            relative_path: path.into(),
            size: 1,
            digest: digest.into(),
            mode: 0o644,
        }
    }

    fn local() -> Vec<Fingerprint> {
        vec![
            fp("Gemfile", "d1"),
            fp("Gemfile.lock", "d2"),
            fp("app.rb", "d3"),
            fp("copy/app.rb", "d3"),
        ]
    }

    #[test]
    fn partition_is_a_disjoint_cover() {
        let local = local();
        let known = vec![fp("app.rb", "d3"), fp("Gemfile", "d1"), fp("unknown", "zz")];
        let outcome = partition(&local, &known);

        assert_eq!(outcome.matched, vec![fp("Gemfile", "d1"), fp("app.rb", "d3")]);
        assert_eq!(
            outcome.to_upload,
            vec![fp("Gemfile.lock", "d2"), fp("copy/app.rb", "d3")]
        );
        for f in &outcome.matched {
            assert!(!outcome.to_upload.contains(f));
        }
        assert_eq!(outcome.matched.len() + outcome.to_upload.len(), local.len());
    }

    #[test]
    fn same_path_with_changed_digest_must_be_uploaded() {
        let outcome = partition(&[fp("app.rb", "new")], &[fp("app.rb", "old")]);
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.to_upload, vec![fp("app.rb", "new")]);
    }

    #[tokio::test]
    async fn sends_fingerprints_and_partitions_reply() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_put_json()
            .withf(|url, body| {
                url == "https://api.example.com/v2/resource_match"
                    && body.as_array().map(|a| a.len()) == Some(4)
                    && body[0]["fn"] == "Gemfile"
                    && body[0]["sha1"] == "d1"
            })
            .times(1)
            .returning(|_, _| {
                Ok(serde_json::json!([{"fn": "Gemfile", "sha1": "d1", "size": 1}]))
            });

        let config = Config::new("https://api.example.com", "bearer t");
        let outcome = match_resources(&gateway, &config, &local()).await.unwrap();
        assert_eq!(outcome.matched, vec![fp("Gemfile", "d1")]);
        assert_eq!(outcome.to_upload.len(), 3);
    }

    #[tokio::test]
    async fn unsupported_endpoint_falls_back_to_upload_everything() {
        let mut gateway = MockGateway::new();
        gateway.expect_put_json().times(1).returning(|_, _| {
            Err(ApiError::HttpStatus {
                status: 404,
                error_code: "CF-NotFound".into(),
                message: "Unknown request".into(),
            })
        });

        let config = Config::new("https://api.example.com", "");
        let outcome = match_resources(&gateway, &config, &local()).await.unwrap();
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.to_upload, local());
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let mut gateway = MockGateway::new();
        gateway.expect_put_json().times(1).returning(|_, _| {
            Err(ApiError::HttpStatus {
                status: 501,
                error_code: String::new(),
                message: "Not Implemented".into(),
            })
        });

        let mut config = Config::new("https://api.example.com", "");
        config.resource_match_fallback = false;
        let err = match_resources(&gateway, &config, &local()).await.unwrap_err();
        assert_eq!(err.status(), Some(501));
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_error_code() {
        let mut gateway = MockGateway::new();
        gateway.expect_put_json().times(1).returning(|_, _| {
            Err(ApiError::HttpStatus {
                status: 500,
                error_code: "CF-ServerError".into(),
                message: "An unknown error occurred.".into(),
            })
        });

        let config = Config::new("https://api.example.com", "");
        let err = match_resources(&gateway, &config, &local()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.error_code(), Some("CF-ServerError"));
    }

    #[tokio::test]
    async fn transport_failure_is_remote_unavailable_without_fallback() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_put_json()
            .times(1)
            .returning(|_, _| Err(ApiError::RemoteUnavailable("connection refused".into())));

        let config = Config::new("https://api.example.com", "");
        let err = match_resources(&gateway, &config, &local()).await.unwrap_err();
        match err {
            ApiError::RemoteUnavailable(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_fingerprint_set_makes_no_request() {
        let gateway = MockGateway::new();
        let config = Config::new("https://api.example.com", "");
        let outcome = match_resources(&gateway, &config, &[]).await.unwrap();
        assert_eq!(outcome, MatchOutcome::default());
    }
}
