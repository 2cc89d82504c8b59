// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event ingestion: the durable write plus the aggregation trigger.
//!
//! Ingestion success is defined solely by the durability of the event row.
//! The aggregation pass is submitted to the background queue after the write
//! and neither its scheduling nor its outcome affects the caller.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use beacon_common_secret::SecretString;
use beacon_telemetry_core::{Event, EventId, EventPayload, TenantId};

use crate::aggregation::{AggregationHandle, AggregationJob};
use crate::error::{Result, TelemetryServerError};

/// Ingests events for resolved tenants.
#[derive(Clone)]
pub struct EventIngestor {
	pool: SqlitePool,
	aggregation: AggregationHandle,
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
	id: String,
	tenant_id: String,
	event_type: String,
	url: Option<String>,
	referrer: Option<String>,
	device: Option<String>,
	ip_address: Option<String>,
	metadata: String,
	session_id: Option<String>,
	user_id: Option<String>,
	timestamp: String,
	created_at: String,
}

impl TryFrom<EventRow> for Event {
	type Error = TelemetryServerError;

	fn try_from(row: EventRow) -> Result<Self> {
		Ok(Event {
			id: EventId(
				row
					.id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid event ID".into()))?,
			),
			tenant_id: TenantId(
				row
					.tenant_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid tenant ID".into()))?,
			),
			event_type: row.event_type,
			url: row.url,
			referrer: row.referrer,
			device: row.device.map(|s| s.parse()).transpose()?,
			ip_address: row.ip_address.map(SecretString::new),
			metadata: serde_json::from_str(&row.metadata)?,
			session_id: row.session_id,
			user_id: row.user_id,
			timestamp: DateTime::parse_from_rfc3339(&row.timestamp)
				.map_err(|e| TelemetryServerError::InvalidData(format!("invalid timestamp: {e}")))?
				.with_timezone(&Utc),
			created_at: DateTime::parse_from_rfc3339(&row.created_at)
				.map_err(|e| TelemetryServerError::InvalidData(format!("invalid created_at: {e}")))?
				.with_timezone(&Utc),
		})
	}
}

pub(crate) const EVENT_COLUMNS: &str = "id, tenant_id, event_type, url, referrer, device, \
	ip_address, metadata, session_id, user_id, timestamp, created_at";

impl EventIngestor {
	pub fn new(pool: SqlitePool, aggregation: AggregationHandle) -> Self {
		Self { pool, aggregation }
	}

	/// Persists one immutable event and schedules its aggregation pass.
	///
	/// The event timestamp defaults to capture time and the IP address to
	/// the transport-observed origin when the payload omits them.
	#[instrument(skip(self, payload, transport_ip), fields(tenant_id = %tenant_id, event_type = %payload.event_type))]
	pub async fn ingest(
		&self,
		tenant_id: TenantId,
		payload: EventPayload,
		transport_ip: Option<String>,
	) -> Result<Event> {
		let now = Utc::now();
		let event = Event {
			id: EventId::new(),
			tenant_id,
			event_type: payload.event_type,
			url: payload.url,
			referrer: payload.referrer,
			device: payload.device,
			ip_address: payload.ip_address.or(transport_ip).map(SecretString::new),
			metadata: payload.metadata,
			session_id: payload.session_id,
			user_id: payload.user_id,
			timestamp: payload.timestamp.unwrap_or(now),
			created_at: now,
		};

		sqlx::query(
			r#"
			INSERT INTO events (
				id, tenant_id, event_type, url, referrer, device,
				ip_address, metadata, session_id, user_id, timestamp, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(event.id.to_string())
		.bind(event.tenant_id.to_string())
		.bind(&event.event_type)
		.bind(&event.url)
		.bind(&event.referrer)
		.bind(event.device.map(|d| d.as_str()))
		.bind(event.ip_address.as_ref().map(|ip| ip.expose().to_string()))
		.bind(serde_json::to_string(&event.metadata)?)
		.bind(&event.session_id)
		.bind(&event.user_id)
		.bind(event.timestamp.to_rfc3339())
		.bind(event.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		tracing::debug!(event_id = %event.id, "event stored");

		// Fire and forget; the row is already durable.
		self.aggregation.submit(AggregationJob {
			tenant_id,
			event_type: event.event_type.clone(),
			date: event.utc_day(),
		});

		Ok(event)
	}
}
