//! Streaming pagination over Cloud Controller collections.
//!
//! [`list_paginated`] spawns a fetch task that follows `next_url` links and hands each decoded
//! page to the consumer through a bounded channel. The consumer reads batches with
//! [`PageStream::next_batch`] and then collects the single terminal result with
//! [`PageStream::finish`]. Stopping is cooperative: [`PageStream::stop`] (or dropping the
//! stream) cancels the task, which never starts another fetch or delivers another batch once
//! it observes the signal.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use cfpush_core::{config::Config, gateway::CloudControllerGateway, resources::SpaceResource};
//! # async fn demo() -> cfpush_core::error::Result<()> {
//! let config = Config::new("https://api.example.com", "bearer token");
//! let gateway = Arc::new(CloudControllerGateway::new(&config)?);
//! let mut spaces = cfpush_core::pagination::list_paginated(
//!     gateway,
//!     &config,
//!     "/v2/organizations/my-org/spaces",
//!     SpaceResource::into_model,
//! );
//! while let Some(batch) = spaces.next_batch().await {
//!     for space in batch {
//!         println!("{}", space.name);
//!     }
//! }
//! spaces.finish().await
//! # }
//! ```

use std::sync::Arc;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::Config;
use crate::contract::Gateway;
use crate::error::{ApiError, Result};

/// Pages buffered ahead of a slow consumer.
pub const PAGE_BUFFER: usize = 1;

/// One page of a collection response.
#[derive(Debug, Deserialize)]
pub struct PaginatedResources<R> {
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default = "Vec::new")]
    pub resources: Vec<R>,
}

/// Consumer side of a listing in progress.
pub struct PageStream<T> {
    batches: mpsc::Receiver<Vec<T>>,
    status: Option<oneshot::Receiver<Result<()>>>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl<T> PageStream<T> {
    /// Next decoded page, in server order. `None` once the listing has ended for any reason.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        self.batches.recv().await
    }

    /// Signals the fetch task to stop. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the terminal signal: `Ok` on the last page or a clean stop, or the single
    /// error that ended the listing. Any batches not yet read are discarded, and a fetch still
    /// in flight is abandoned, so its outcome never becomes the result.
    pub async fn finish(mut self) -> Result<()> {
        self.cancel.cancel();
        self.batches.close();
        match self.status.take() {
            Some(status) => status.await.unwrap_or_else(|_| {
                Err(ApiError::RemoteUnavailable(
                    "listing task ended without reporting a result".to_string(),
                ))
            }),
            None => Ok(()),
        }
    }

    /// Drains every page and returns the items in order, or the terminal error.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(batch) = self.next_batch().await {
            items.extend(batch);
        }
        self.finish().await?;
        Ok(items)
    }

    /// Adapts the listing into a stream of batches, ending with an `Err` item if it failed.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            match stream.next_batch().await {
                Some(batch) => Some((Ok(batch), Some(stream))),
                None => match stream.finish().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        })
    }
}

/// Lists a collection starting at `path`, decoding each resource with `decode`.
///
/// Must be called from within a tokio runtime. Each call starts a fresh listing from the
/// first page.
pub fn list_paginated<G, R, T, F>(
    gateway: Arc<G>,
    config: &Config,
    path: &str,
    decode: F,
) -> PageStream<T>
where
    G: Gateway + ?Sized + 'static,
    R: DeserializeOwned + Send + 'static,
    T: Send + 'static,
    F: Fn(R) -> T + Send + 'static,
{
    let (batch_tx, batch_rx) = mpsc::channel(PAGE_BUFFER);
    let (status_tx, status_rx) = oneshot::channel();
    let cancel = CancellationToken::new();

    let task_cancel = cancel.clone();
    let config = config.clone();
    let start = path.to_string();
    tokio::spawn(async move {
        let result = fetch_pages(&*gateway, &config, start, decode, &batch_tx, &task_cancel).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Listing ended with an error");
        }
        drop(batch_tx);
        let _ = status_tx.send(result);
    });

    PageStream {
        batches: batch_rx,
        status: Some(status_rx),
        _guard: cancel.clone().drop_guard(),
        cancel,
    }
}

async fn fetch_pages<G, R, T, F>(
    gateway: &G,
    config: &Config,
    start: String,
    decode: F,
    batches: &mpsc::Sender<Vec<T>>,
    cancel: &CancellationToken,
) -> Result<()>
where
    G: Gateway + ?Sized,
    R: DeserializeOwned,
    F: Fn(R) -> T,
{
    let mut next = Some(start);
    let mut pages: u64 = 0;

    while let Some(path) = next.take() {
        let url = config.url(&path);
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(pages, url = %url, "Listing stopped before fetch completed");
                return Ok(());
            }
            body = gateway.get_json(&url) => body.map_err(ApiError::into_remote_unavailable)?,
        };

        let page: PaginatedResources<R> = serde_json::from_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("page {url}: {e}"))
        })?;
        pages += 1;
        next = page.next_url.filter(|u| !u.is_empty());
        tracing::debug!(
            pages,
            url = %url,
            items = page.resources.len(),
            has_next = next.is_some(),
            "Fetched page"
        );

        let items: Vec<T> = page.resources.into_iter().map(&decode).collect();
        if items.is_empty() {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(pages, "Listing stopped before delivery");
                return Ok(());
            }
            sent = batches.send(items) => {
                if sent.is_err() {
                    tracing::debug!(pages, "Consumer went away, ending listing");
                    return Ok(());
                }
            }
        }
    }

    tracing::debug!(pages, "Listing complete");
    Ok(())
}
