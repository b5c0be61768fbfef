//! List-style repositories. Each one is a thin call into [`list_paginated`] with its own path
//! and decoder.

use std::sync::Arc;

use reqwest::Url;

use crate::config::Config;
use crate::contract::Gateway;
use crate::error::{ApiError, Result};
use crate::pagination::{list_paginated, PageStream};
use crate::resources::{
    Route, RouteResource, ServiceInstance, ServiceInstanceResource, Space, SpaceResource,
};

/// Appends URL-encoded query pairs to a path resolved against the endpoint.
fn with_query(config: &Config, path: &str, pairs: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(&config.url(path)).map_err(|e| {
        ApiError::RemoteUnavailable(format!("invalid API endpoint {}: {e}", config.api_endpoint))
    })?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

pub struct SpaceRepository<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    config: Config,
}

impl<G: Gateway + ?Sized + 'static> SpaceRepository<G> {
    pub fn new(gateway: Arc<G>, config: Config) -> Self {
        Self { gateway, config }
    }

    pub fn list_spaces(&self, org_guid: &str) -> PageStream<Space> {
        tracing::info!(org_guid, "Listing spaces");
        list_paginated(
            self.gateway.clone(),
            &self.config,
            &format!("/v2/organizations/{org_guid}/spaces"),
            SpaceResource::into_model,
        )
    }
}

pub struct RouteRepository<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    config: Config,
}

impl<G: Gateway + ?Sized + 'static> RouteRepository<G> {
    pub fn new(gateway: Arc<G>, config: Config) -> Self {
        Self { gateway, config }
    }

    pub fn list_routes(&self) -> PageStream<Route> {
        tracing::info!("Listing routes");
        list_paginated(
            self.gateway.clone(),
            &self.config,
            "/v2/routes?inline-relations-depth=1",
            RouteResource::into_model,
        )
    }

    /// First route with `host`, stopping the listing as soon as one is seen.
    pub async fn find_by_host(&self, host: &str) -> Result<Route> {
        let filter = format!("host:{host}");
        let url = with_query(
            &self.config,
            "/v2/routes?inline-relations-depth=1",
            &[("q", filter.as_str())],
        )?;
        let mut stream =
            list_paginated(self.gateway.clone(), &self.config, &url, RouteResource::into_model);

        let found = stream.next_batch().await.and_then(|batch| batch.into_iter().next());
        stream.stop();
        stream.finish().await?;

        found.ok_or_else(|| {
            tracing::info!(host, "No route found for host");
            ApiError::NotFound(format!("Route with host {host} not found"))
        })
    }
}

pub struct ServiceRepository<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    config: Config,
}

impl<G: Gateway + ?Sized + 'static> ServiceRepository<G> {
    pub fn new(gateway: Arc<G>, config: Config) -> Self {
        Self { gateway, config }
    }

    pub fn list_service_instances(&self, space_guid: &str) -> PageStream<ServiceInstance> {
        tracing::info!(space_guid, "Listing service instances");
        list_paginated(
            self.gateway.clone(),
            &self.config,
            &format!("/v2/spaces/{space_guid}/service_instances?inline-relations-depth=1"),
            ServiceInstanceResource::into_model,
        )
    }
}
