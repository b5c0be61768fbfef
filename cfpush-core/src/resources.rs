//! Wire resources for the collections listed through the pagination gateway, and the plain
//! models they decode into.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Space {
    pub guid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub guid: String,
    pub host: String,
    /// Domain name, empty when the listing did not inline the domain.
    pub domain: String,
}

impl Route {
    pub fn url(&self) -> String {
        match (self.host.is_empty(), self.domain.is_empty()) {
            (_, true) => self.host.clone(),
            (true, false) => self.domain.clone(),
            (false, false) => format!("{}.{}", self.host, self.domain),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInstance {
    pub guid: String,
    pub name: String,
    /// Plan name, empty for user-provided instances.
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub struct SpaceResource {
    #[serde(default)]
    pub metadata: Metadata,
    pub entity: SpaceEntity,
}

#[derive(Debug, Deserialize)]
pub struct SpaceEntity {
    pub name: String,
}

impl SpaceResource {
    pub fn into_model(self) -> Space {
        Space {
            guid: self.metadata.guid,
            name: self.entity.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DomainResource {
    #[serde(default)]
    pub metadata: Metadata,
    pub entity: DomainEntity,
}

#[derive(Debug, Deserialize)]
pub struct DomainEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RouteResource {
    #[serde(default)]
    pub metadata: Metadata,
    pub entity: RouteEntity,
}

#[derive(Debug, Deserialize)]
pub struct RouteEntity {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub domain: Option<DomainResource>,
}

impl RouteResource {
    pub fn into_model(self) -> Route {
        Route {
            guid: self.metadata.guid,
            host: self.entity.host,
            domain: self
                .entity
                .domain
                .map(|d| d.entity.name)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServicePlanResource {
    pub entity: ServicePlanEntity,
}

#[derive(Debug, Deserialize)]
pub struct ServicePlanEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceInstanceResource {
    #[serde(default)]
    pub metadata: Metadata,
    pub entity: ServiceInstanceEntity,
}

#[derive(Debug, Deserialize)]
pub struct ServiceInstanceEntity {
    pub name: String,
    #[serde(default)]
    pub service_plan: Option<ServicePlanResource>,
}

impl ServiceInstanceResource {
    pub fn into_model(self) -> ServiceInstance {
        ServiceInstance {
            guid: self.metadata.guid,
            name: self.entity.name,
            plan: self
                .entity
                .service_plan
                .map(|p| p.entity.name)
                .unwrap_or_default(),
        }
    }
}
