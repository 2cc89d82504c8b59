// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Daily summary recomputation.
//!
//! Every pass recomputes the full aggregate for its (tenant, event type,
//! UTC day) key from the immutable event set and upserts the result, so
//! racing passes for the same key settle on the same values regardless of
//! completion order. Summaries are a cache; a failed or skipped pass is
//! corrected by the next event for the key.
//!
//! Per-key scan cost grows with event volume; the recompute-from-scratch
//! strategy is intentional and is not replaced with incremental counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::instrument;

use beacon_telemetry_core::{
	EventSummary, EventSummaryId, TenantId, UNKNOWN_DEVICE_BUCKET,
};

use crate::error::{Result, TelemetryServerError};

/// One scheduled recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationJob {
	pub tenant_id: TenantId,
	pub event_type: String,
	pub date: NaiveDate,
}

/// Recomputes summary rows from raw events.
#[derive(Clone)]
pub struct AggregationEngine {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct SummaryRow {
	id: String,
	tenant_id: String,
	event_type: String,
	date: String,
	total_count: i64,
	unique_users: i64,
	device_data: String,
	updated_at: String,
}

impl TryFrom<SummaryRow> for EventSummary {
	type Error = TelemetryServerError;

	fn try_from(row: SummaryRow) -> Result<Self> {
		Ok(EventSummary {
			id: EventSummaryId(
				row
					.id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid summary ID".into()))?,
			),
			tenant_id: TenantId(
				row
					.tenant_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid tenant ID".into()))?,
			),
			event_type: row.event_type,
			date: row
				.date
				.parse()
				.map_err(|_| TelemetryServerError::InvalidData("invalid summary date".into()))?,
			total_count: row.total_count as u64,
			unique_users: row.unique_users as u64,
			device_data: serde_json::from_str(&row.device_data)?,
			updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
				.map_err(|e| TelemetryServerError::InvalidData(format!("invalid updated_at: {e}")))?
				.with_timezone(&Utc),
		})
	}
}

pub(crate) const SUMMARY_COLUMNS: &str =
	"id, tenant_id, event_type, date, total_count, unique_users, device_data, updated_at";

/// UTC datetime bounds `[start, end)` of a calendar day.
pub(crate) fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
	let start = date.and_time(NaiveTime::MIN).and_utc();
	(start, start + Duration::days(1))
}

impl AggregationEngine {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Recomputes the summary for one (tenant, event type, UTC day) key and
	/// upserts it, returning the stored row.
	///
	/// Idempotent: the aggregate is derived from the full event scan, never
	/// from the previous summary, so repeated or concurrent passes converge
	/// on the same values.
	#[instrument(skip(self), fields(tenant_id = %tenant_id, event_type = %event_type, date = %date))]
	pub async fn recompute(
		&self,
		tenant_id: TenantId,
		event_type: &str,
		date: NaiveDate,
	) -> Result<EventSummary> {
		let (day_start, day_end) = day_bounds(date);

		// COUNT(DISTINCT user_id) ignores NULL user ids.
		let (total_count, unique_users): (i64, i64) = sqlx::query_as(
			r#"
			SELECT COUNT(*), COUNT(DISTINCT user_id)
			FROM events
			WHERE tenant_id = ? AND event_type = ?
			  AND timestamp >= ? AND timestamp < ?
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(event_type)
		.bind(day_start.to_rfc3339())
		.bind(day_end.to_rfc3339())
		.fetch_one(&self.pool)
		.await?;

		let device_rows: Vec<(String, i64)> = sqlx::query_as(
			r#"
			SELECT COALESCE(device, ?), COUNT(*)
			FROM events
			WHERE tenant_id = ? AND event_type = ?
			  AND timestamp >= ? AND timestamp < ?
			GROUP BY COALESCE(device, ?)
			"#,
		)
		.bind(UNKNOWN_DEVICE_BUCKET)
		.bind(tenant_id.to_string())
		.bind(event_type)
		.bind(day_start.to_rfc3339())
		.bind(day_end.to_rfc3339())
		.bind(UNKNOWN_DEVICE_BUCKET)
		.fetch_all(&self.pool)
		.await?;

		let device_data: BTreeMap<String, u64> = device_rows
			.into_iter()
			.map(|(device, count)| (device, count as u64))
			.collect();

		let summary = EventSummary {
			id: EventSummaryId::new(),
			tenant_id,
			event_type: event_type.to_string(),
			date,
			total_count: total_count as u64,
			unique_users: unique_users as u64,
			device_data,
			updated_at: Utc::now(),
		};

		// Insert-or-replace keyed on the uniqueness constraint: a racing
		// first write for the key cannot produce a duplicate row.
		sqlx::query(
			r#"
			INSERT INTO event_summaries (
				id, tenant_id, event_type, date,
				total_count, unique_users, device_data, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(tenant_id, event_type, date) DO UPDATE SET
				total_count = excluded.total_count,
				unique_users = excluded.unique_users,
				device_data = excluded.device_data,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(summary.id.to_string())
		.bind(summary.tenant_id.to_string())
		.bind(&summary.event_type)
		.bind(summary.date.to_string())
		.bind(summary.total_count as i64)
		.bind(summary.unique_users as i64)
		.bind(serde_json::to_string(&summary.device_data)?)
		.bind(summary.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		// Return the stored row; on conflict the original row id survives.
		let row = sqlx::query_as::<_, SummaryRow>(&format!(
			"SELECT {SUMMARY_COLUMNS} FROM event_summaries WHERE tenant_id = ? AND event_type = ? AND date = ?"
		))
		.bind(summary.tenant_id.to_string())
		.bind(&summary.event_type)
		.bind(summary.date.to_string())
		.fetch_one(&self.pool)
		.await?;

		let stored: EventSummary = row.try_into()?;
		tracing::debug!(
			total_count = stored.total_count,
			unique_users = stored.unique_users,
			"summary recomputed"
		);
		Ok(stored)
	}
}

/// Submission side of the aggregation queue.
///
/// Submission never blocks and never fails the caller: a full queue or a
/// stopped worker drops the job with a log line, and the key self-heals on
/// the next event.
#[derive(Clone)]
pub struct AggregationHandle {
	tx: mpsc::Sender<AggregationJob>,
}

impl AggregationHandle {
	/// Submits a job, dropping it if the queue cannot accept it.
	pub fn submit(&self, job: AggregationJob) {
		match self.tx.try_send(job) {
			Ok(()) => {}
			Err(TrySendError::Full(job)) => {
				tracing::warn!(
					tenant_id = %job.tenant_id,
					event_type = %job.event_type,
					date = %job.date,
					"aggregation queue full, dropping job"
				);
			}
			Err(TrySendError::Closed(job)) => {
				tracing::warn!(
					tenant_id = %job.tenant_id,
					event_type = %job.event_type,
					date = %job.date,
					"aggregation worker stopped, dropping job"
				);
			}
		}
	}

	#[cfg(test)]
	pub(crate) fn for_testing() -> (Self, mpsc::Receiver<AggregationJob>) {
		let (tx, rx) = mpsc::channel(16);
		(Self { tx }, rx)
	}
}

/// Spawns the background worker draining the aggregation queue.
///
/// Recomputation failures are logged and swallowed; they never reach the
/// ingesting caller. The worker exits when every [`AggregationHandle`] is
/// dropped.
pub fn spawn_aggregation_worker(
	engine: AggregationEngine,
	queue_capacity: usize,
) -> (AggregationHandle, JoinHandle<()>) {
	let (tx, mut rx) = mpsc::channel::<AggregationJob>(queue_capacity);

	let worker = tokio::spawn(async move {
		while let Some(job) = rx.recv().await {
			if let Err(e) = engine
				.recompute(job.tenant_id, &job.event_type, job.date)
				.await
			{
				tracing::error!(
					error = %e,
					tenant_id = %job.tenant_id,
					event_type = %job.event_type,
					date = %job.date,
					"aggregation recompute failed"
				);
			}
		}
		tracing::debug!("aggregation worker stopped");
	});

	(AggregationHandle { tx }, worker)
}
