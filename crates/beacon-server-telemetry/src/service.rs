// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Composition root wiring storage, the aggregation worker, and the
//! telemetry components. This is what a host process hands to its HTTP
//! boundary.

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::aggregation::{spawn_aggregation_worker, AggregationEngine};
use crate::auth::Authenticator;
use crate::config::TelemetryConfig;
use crate::credential::CredentialStore;
use crate::error::Result;
use crate::event::EventIngestor;
use crate::pool::create_pool;
use crate::query::QueryService;
use crate::schema::init_schema;
use crate::tenant::TenantRegistry;

/// The assembled telemetry service.
pub struct TelemetryService {
	pub tenants: TenantRegistry,
	pub credentials: CredentialStore,
	pub authenticator: Authenticator,
	pub ingestor: EventIngestor,
	pub aggregation: AggregationEngine,
	pub queries: QueryService,
	worker: JoinHandle<()>,
}

impl TelemetryService {
	/// Connects to the configured database and starts the service.
	pub async fn start(config: TelemetryConfig) -> Result<Self> {
		let pool = create_pool(&config.database_url).await?;
		Self::with_pool(config, pool).await
	}

	/// Starts the service on an existing pool, applying the schema and
	/// spawning the aggregation worker.
	pub async fn with_pool(config: TelemetryConfig, pool: SqlitePool) -> Result<Self> {
		init_schema(&pool).await?;

		let aggregation = AggregationEngine::new(pool.clone());
		let (aggregation_handle, worker) =
			spawn_aggregation_worker(aggregation.clone(), config.aggregation_queue_capacity);

		let credentials = CredentialStore::new(pool.clone());

		Ok(Self {
			tenants: TenantRegistry::new(pool.clone()),
			authenticator: Authenticator::new(credentials.clone()),
			credentials,
			ingestor: EventIngestor::new(pool.clone(), aggregation_handle),
			aggregation,
			queries: QueryService::new(pool, config.user_recent_events),
			worker,
		})
	}

	/// Stops the aggregation worker after it drains the queued jobs.
	pub async fn shutdown(self) {
		let TelemetryService {
			ingestor, worker, ..
		} = self;
		// Dropping the last submit handle closes the queue.
		drop(ingestor);
		let _ = worker.await;
	}
}
