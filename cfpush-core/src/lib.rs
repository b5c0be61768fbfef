#![doc = "cfpush-core: core logic library for cfpush."]

//! This crate contains the engine behind the `cfpush` CLI: pushing application bits to a Cloud
//! Controller, waiting on the server job that processes them, and streaming paginated
//! collections with cancellation.
//!
//! # Layout
//! - [`bits`]: the upload pipeline, built from [`fingerprint`], [`matcher`], [`zipper`] and [`job`]
//! - [`pagination`] and [`repositories`]: lazily fetched listings
//! - [`contract`] and [`gateway`]: the HTTP seam and its reqwest implementation
//!
//! # Usage
//! Construct a [`gateway::CloudControllerGateway`] from a [`config::Config`], wrap it in an `Arc`
//! and hand it to [`bits::ApplicationBits`] or one of the repositories.

pub mod bits;
pub mod config;
pub mod contract;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod job;
pub mod matcher;
pub mod pagination;
pub mod repositories;
pub mod resources;
pub mod zipper;

pub use error::{ApiError, Result};
