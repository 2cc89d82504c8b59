// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant credential and telemetry ingestion server implementation for Beacon.
//!
//! This crate provides the server-side implementation for the telemetry
//! system: credential lifecycle management, durable event capture, background
//! daily aggregation, and the read-side queries.
//!
//! # Architecture
//!
//! - `tenant` - Application registration with atomic first-credential issuance
//! - `credential` - Key rotation, revocation, resolution, audit history
//! - `auth` - Resolving presented credentials to tenant identities
//! - `event` - Durable event capture and the aggregation trigger
//! - `aggregation` - Daily summary recomputation and the background worker
//! - `query` - Summaries, per-user stats, recent events, counts by type
//!
//! # Example
//!
//! ```ignore
//! use beacon_server_telemetry::{TelemetryConfig, TelemetryService};
//! use beacon_telemetry_core::{EventPayload, OwnerId};
//!
//! let service = TelemetryService::start(TelemetryConfig::default()).await?;
//!
//! // Register an application; the plaintext key is returned exactly once.
//! let (tenant, api_key, _) = service
//!     .tenants
//!     .register("My Shop".into(), "https://shop.example", OwnerId::new())
//!     .await?;
//!
//! // Authenticate and capture an event.
//! let ctx = service.authenticator.authenticate(api_key.expose()).await?.unwrap();
//! service
//!     .ingestor
//!     .ingest(ctx.tenant_id, EventPayload::new("page_view"), None)
//!     .await?;
//!
//! // Read it back.
//! let recent = service.queries.recent_events(ctx.tenant_id, 10).await?;
//! ```

pub mod aggregation;
pub mod auth;
pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod pool;
pub mod query;
pub mod schema;
pub mod service;
pub mod tenant;
pub mod testing;

pub use aggregation::{
	spawn_aggregation_worker, AggregationEngine, AggregationHandle, AggregationJob,
};
pub use auth::Authenticator;
pub use config::TelemetryConfig;
pub use credential::CredentialStore;
pub use error::{Result, TelemetryServerError};
pub use event::EventIngestor;
pub use pool::create_pool;
pub use query::QueryService;
pub use schema::init_schema;
pub use service::TelemetryService;
pub use tenant::TenantRegistry;

// Re-export core types for convenience
pub use beacon_telemetry_core::*;
