//! Server-side job tracking.
//!
//! An upload hands back a job handle; the poller re-fetches the job resource every
//! `polling_throttle` until it reaches `finished` or `failed`. Nothing here bounds the number of
//! polls; deadlines belong to the caller.

use std::fmt;

use serde::Deserialize;

use crate::config::Config;
use crate::contract::Gateway;
use crate::error::{ApiError, Result};

/// Job states in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ApiError::InvalidResponse(format!(
                "unknown job status '{other}'"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Handle on an asynchronous server job. Only the poller mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub guid: String,
    pub status_url: String,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct JobMetadata {
    guid: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    metadata: JobMetadata,
}

#[derive(Debug, Deserialize)]
struct JobEntity {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    entity: JobEntity,
}

impl UploadJob {
    /// Builds a queued job from the upload response `{metadata: {guid, url}}`.
    pub fn from_response(body: serde_json::Value) -> Result<Self> {
        let created: JobCreated = serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("job metadata: {e}")))?;
        Ok(Self {
            guid: created.metadata.guid,
            status_url: created.metadata.url,
            status: JobStatus::Queued,
        })
    }

    /// Applies an observed status. Backward reports and anything after a terminal state are
    /// ignored; returns whether the status changed.
    pub fn observe(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next <= self.status {
            if next != self.status {
                tracing::warn!(
                    job = %self.guid,
                    current = %self.status,
                    reported = %next,
                    "Ignoring backward job status transition"
                );
            }
            return false;
        }
        tracing::debug!(job = %self.guid, from = %self.status, to = %next, "Job status changed");
        self.status = next;
        true
    }
}

/// Polls `job` until it is terminal.
///
/// `finished` returns `Ok`, `failed` is [`ApiError::JobFailed`], and the first fetch error
/// ends polling: [`ApiError::RemoteUnavailable`] for transport failures, [`ApiError::HttpStatus`]
/// when the server answered with an error status.
pub async fn poll_until_complete<G>(gateway: &G, config: &Config, job: &mut UploadJob) -> Result<()>
where
    G: Gateway + ?Sized,
{
    let url = config.url(&job.status_url);
    let throttle = config.polling_throttle();
    let mut polls: u64 = 0;

    loop {
        let body = gateway.get_json(&url).await.map_err(|e| {
            tracing::error!(error = %e, job = %job.guid, "Failed to fetch job status");
            e.into_remote_unavailable()
        })?;
        polls += 1;

        let resource: JobResource = serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("job status: {e}")))?;
        let reported = JobStatus::parse(&resource.entity.status)?;
        job.observe(reported);

        match job.status {
            JobStatus::Finished => {
                tracing::info!(job = %job.guid, polls, "Job finished");
                return Ok(());
            }
            JobStatus::Failed => {
                let detail = resource
                    .entity
                    .error
                    .unwrap_or_else(|| format!("job {} failed", job.guid));
                tracing::error!(job = %job.guid, polls, detail = %detail, "Job failed");
                return Err(ApiError::JobFailed(detail));
            }
            JobStatus::Queued | JobStatus::Running => {
                tracing::debug!(job = %job.guid, status = %job.status, polls, "Job still in progress");
                if !throttle.is_zero() {
                    tokio::time::sleep(throttle).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockGateway;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn job() -> UploadJob {
        UploadJob::from_response(serde_json::json!({
            "metadata": {"guid": "my-job-guid", "url": "/v2/jobs/my-job-guid"}
        }))
        .unwrap()
    }

    fn status_body(status: &str) -> serde_json::Value {
        serde_json::json!({"entity": {"status": status}})
    }

    fn scripted_gateway(statuses: &[&'static str]) -> (MockGateway, Arc<Mutex<u32>>) {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut script = statuses.to_vec().into_iter();
        let mut gateway = MockGateway::new();
        gateway
            .expect_get_json()
            .withf(|url| url == "https://api.example.com/v2/jobs/my-job-guid")
            .times(statuses.len())
            .returning(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(status_body(script.next().expect("scripted status")))
            });
        (gateway, calls)
    }

    fn config() -> Config {
        Config::new("https://api.example.com", "bearer t").with_polling_throttle(Duration::ZERO)
    }

    #[test]
    fn parses_job_metadata() {
        let job = job();
        assert_eq!(job.guid, "my-job-guid");
        assert_eq!(job.status_url, "/v2/jobs/my-job-guid");
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut job = job();
        assert!(job.observe(JobStatus::Running));
        assert!(!job.observe(JobStatus::Queued));
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.observe(JobStatus::Failed));
        assert!(!job.observe(JobStatus::Finished));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            JobStatus::parse("paused"),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn running_then_finished_succeeds() {
        let (gateway, calls) = scripted_gateway(&["running", "finished"]);
        let mut job = job();
        poll_until_complete(&gateway, &config(), &mut job)
            .await
            .expect("job should finish");
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn running_then_failed_is_job_failed() {
        let (gateway, _) = scripted_gateway(&["queued", "running", "failed"]);
        let mut job = job();
        let err = poll_until_complete(&gateway, &config(), &mut job)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::JobFailed(_)));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn fetch_error_stops_polling() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_get_json()
            .times(1)
            .returning(|_| Err(ApiError::RemoteUnavailable("connection refused".into())));
        let mut job = job();
        let err = poll_until_complete(&gateway, &config(), &mut job)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn server_status_while_polling_keeps_error_code() {
        let mut gateway = MockGateway::new();
        gateway.expect_get_json().times(1).returning(|_| {
            Err(ApiError::HttpStatus {
                status: 404,
                error_code: "CF-JobNotFound".into(),
                message: "The job could not be found: my-job-guid".into(),
            })
        });
        let mut job = job();
        let err = poll_until_complete(&gateway, &config(), &mut job)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.error_code(), Some("CF-JobNotFound"));
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_throttle_between_polls() {
        let (gateway, _) = scripted_gateway(&["running", "running", "finished"]);
        let config = config().with_polling_throttle(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let mut job = job();
        poll_until_complete(&gateway, &config, &mut job).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
