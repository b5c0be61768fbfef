//! `reqwest`-backed [`Gateway`] talking to a live Cloud Controller.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::config::Config;
use crate::contract::{Gateway, UploadRequest};
use crate::error::{ApiError, Result};

/// Error body returned by the Cloud Controller on non-success statuses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

pub struct CloudControllerGateway {
    client: Client,
    access_token: String,
}

impl CloudControllerGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cfpush/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to build HTTP client");
                ApiError::RemoteUnavailable(e.to_string())
            })?;
        tracing::info!(
            api_endpoint = %config.api_endpoint,
            access_token_set = !config.access_token.is_empty(),
            "Initialized CloudControllerGateway"
        );
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(header::ACCEPT, "application/json");
        if self.access_token.is_empty() {
            builder
        } else {
            builder.header(header::AUTHORIZATION, &self.access_token)
        }
    }

    async fn send(&self, method: &str, url: &str, builder: RequestBuilder) -> Result<Response> {
        tracing::debug!(method, url, "Sending request");
        builder.send().await.map_err(|e| {
            tracing::error!(error = ?e, method, url, "Request could not be sent");
            ApiError::RemoteUnavailable(format!("{method} {url}: {e}"))
        })
    }
}

/// Turns a response into its JSON body, or a `HttpStatus` error decoded from the error body.
async fn decode_json(response: Response) -> Result<serde_json::Value> {
    let status = response.status();
    let url = response.url().to_string();
    let bytes = response.bytes().await.map_err(|e| {
        tracing::error!(error = ?e, url = %url, "Failed reading response body");
        ApiError::RemoteUnavailable(format!("reading response from {url}: {e}"))
    })?;

    if !status.is_success() {
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        let message = body
            .description
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
        let error_code = body
            .error_code
            .or_else(|| body.code.map(|c| c.to_string()))
            .unwrap_or_default();
        tracing::error!(status = status.as_u16(), error_code = %error_code, url = %url, "Server returned an error status");
        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            error_code,
            message,
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!(error = ?e, url = %url, "Response body is not valid JSON");
        ApiError::InvalidResponse(format!("{url}: {e}"))
    })
}

#[async_trait]
impl Gateway for CloudControllerGateway {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let builder = self.authorized(self.client.get(url));
        let response = self.send("GET", url, builder).await?;
        decode_json(response).await
    }

    async fn put_json(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let builder = self.authorized(self.client.put(url)).json(&body);
        let response = self.send("PUT", url, builder).await?;
        decode_json(response).await
    }

    async fn put_multipart(
        &self,
        url: &str,
        request: UploadRequest,
    ) -> Result<serde_json::Value> {
        let archive = tokio::fs::File::open(&request.archive_path)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, path = %request.archive_path.display(), "Failed to open packaged archive");
                ApiError::Packaging(format!(
                    "opening {}: {e}",
                    request.archive_path.display()
                ))
            })?;
        let application = Part::stream_with_length(archive, request.archive_size)
            .file_name(request.file_name)
            .mime_str("application/zip")
            .map_err(|e| ApiError::Packaging(e.to_string()))?;
        let form = Form::new()
            .text("resources", request.resources)
            .part("application", application);

        let builder = self.authorized(self.client.put(url)).multipart(form);
        let response = self.send("PUT", url, builder).await?;
        decode_json(response).await
    }
}
