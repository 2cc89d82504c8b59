// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-side queries over events and the summary cache.
//!
//! Single-event-type summary reads come straight from `event_summaries`;
//! queries across arbitrary filters aggregate ad hoc from the raw events.
//! The cache is an optimization for the common single-type case, not a
//! universal index. An empty result is the normal absent outcome, not an
//! error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use beacon_telemetry_core::{
	DateRange, Event, EventSummary, EventSummaryId, EventTypeCount, TenantId, UserStats,
	UNKNOWN_DEVICE_BUCKET,
};

use crate::aggregation::{day_bounds, SummaryRow, SUMMARY_COLUMNS};
use crate::error::{Result, TelemetryServerError};
use crate::event::{EventRow, EVENT_COLUMNS};

/// Hard cap on recent-event listings.
const MAX_RECENT_EVENTS: u32 = 100;

/// Read API over events and summaries.
#[derive(Clone)]
pub struct QueryService {
	pool: SqlitePool,
	user_recent_limit: u32,
}

/// `[start, end)` UTC datetime bounds of an inclusive date range.
fn range_bounds(range: DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
	(day_bounds(range.start).0, day_bounds(range.end).1)
}

impl QueryService {
	pub fn new(pool: SqlitePool, user_recent_limit: u32) -> Self {
		Self {
			pool,
			user_recent_limit,
		}
	}

	/// Daily summaries for a tenant, optionally restricted to one event type
	/// and a date range. Per-day rows are returned as stored in the cache;
	/// distinct-user counts are per day and are not mergeable across days.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn summaries(
		&self,
		tenant_id: TenantId,
		event_type: Option<&str>,
		range: Option<DateRange>,
	) -> Result<Vec<EventSummary>> {
		match event_type {
			Some(event_type) => self.summaries_from_cache(tenant_id, event_type, range).await,
			None => self.summaries_ad_hoc(tenant_id, range).await,
		}
	}

	async fn summaries_from_cache(
		&self,
		tenant_id: TenantId,
		event_type: &str,
		range: Option<DateRange>,
	) -> Result<Vec<EventSummary>> {
		let rows = if let Some(range) = range {
			sqlx::query_as::<_, SummaryRow>(&format!(
				r#"
				SELECT {SUMMARY_COLUMNS}
				FROM event_summaries
				WHERE tenant_id = ? AND event_type = ? AND date >= ? AND date <= ?
				ORDER BY date ASC
				"#
			))
			.bind(tenant_id.to_string())
			.bind(event_type)
			.bind(range.start.to_string())
			.bind(range.end.to_string())
			.fetch_all(&self.pool)
			.await?
		} else {
			sqlx::query_as::<_, SummaryRow>(&format!(
				r#"
				SELECT {SUMMARY_COLUMNS}
				FROM event_summaries
				WHERE tenant_id = ? AND event_type = ?
				ORDER BY date ASC
				"#
			))
			.bind(tenant_id.to_string())
			.bind(event_type)
			.fetch_all(&self.pool)
			.await?
		};

		rows.into_iter().map(TryInto::try_into).collect()
	}

	/// Recomputes per-day aggregates directly from the raw events.
	///
	/// Event timestamps are stored as UTC RFC 3339 text, so the first ten
	/// characters are the UTC calendar day.
	async fn summaries_ad_hoc(
		&self,
		tenant_id: TenantId,
		range: Option<DateRange>,
	) -> Result<Vec<EventSummary>> {
		let (time_filter, bounds) = match range {
			Some(range) => {
				let (start, end) = range_bounds(range);
				(
					"AND timestamp >= ? AND timestamp < ?",
					Some((start.to_rfc3339(), end.to_rfc3339())),
				)
			}
			None => ("", None),
		};

		let totals_sql = format!(
			r#"
			SELECT event_type, substr(timestamp, 1, 10) AS day, COUNT(*), COUNT(DISTINCT user_id)
			FROM events
			WHERE tenant_id = ? {time_filter}
			GROUP BY event_type, day
			ORDER BY day ASC, event_type ASC
			"#
		);
		let mut totals_query =
			sqlx::query_as::<_, (String, String, i64, i64)>(&totals_sql).bind(tenant_id.to_string());
		if let Some((start, end)) = &bounds {
			totals_query = totals_query.bind(start).bind(end);
		}
		let totals = totals_query.fetch_all(&self.pool).await?;

		let devices_sql = format!(
			r#"
			SELECT event_type, substr(timestamp, 1, 10) AS day, COALESCE(device, ?), COUNT(*)
			FROM events
			WHERE tenant_id = ? {time_filter}
			GROUP BY event_type, day, COALESCE(device, ?)
			"#
		);
		let mut devices_query = sqlx::query_as::<_, (String, String, String, i64)>(&devices_sql)
			.bind(UNKNOWN_DEVICE_BUCKET)
			.bind(tenant_id.to_string());
		if let Some((start, end)) = &bounds {
			devices_query = devices_query.bind(start).bind(end);
		}
		let mut device_maps: BTreeMap<(String, String), BTreeMap<String, u64>> = BTreeMap::new();
		for (event_type, day, device, count) in devices_query
			.bind(UNKNOWN_DEVICE_BUCKET)
			.fetch_all(&self.pool)
			.await?
		{
			device_maps
				.entry((event_type, day))
				.or_default()
				.insert(device, count as u64);
		}

		let now = Utc::now();
		totals
			.into_iter()
			.map(|(event_type, day, total_count, unique_users)| {
				let date = day
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid event day".into()))?;
				let device_data = device_maps
					.remove(&(event_type.clone(), day))
					.unwrap_or_default();
				Ok(EventSummary {
					id: EventSummaryId::new(),
					tenant_id,
					event_type,
					date,
					total_count: total_count as u64,
					unique_users: unique_users as u64,
					device_data,
					updated_at: now,
				})
			})
			.collect()
	}

	/// Activity profile for one user within a tenant. Absent when the user
	/// has no events there.
	#[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id))]
	pub async fn stats_for_user(
		&self,
		tenant_id: TenantId,
		user_id: &str,
	) -> Result<Option<UserStats>> {
		let (total_events, first_seen, last_seen): (i64, Option<String>, Option<String>) =
			sqlx::query_as(
				r#"
				SELECT COUNT(*), MIN(timestamp), MAX(timestamp)
				FROM events
				WHERE tenant_id = ? AND user_id = ?
				"#,
			)
			.bind(tenant_id.to_string())
			.bind(user_id)
			.fetch_one(&self.pool)
			.await?;

		if total_events == 0 {
			return Ok(None);
		}
		let (Some(first_seen), Some(last_seen)) = (first_seen, last_seen) else {
			return Ok(None);
		};

		let device_rows: Vec<(String, i64)> = sqlx::query_as(
			r#"
			SELECT COALESCE(device, ?), COUNT(*)
			FROM events
			WHERE tenant_id = ? AND user_id = ?
			GROUP BY COALESCE(device, ?)
			"#,
		)
		.bind(UNKNOWN_DEVICE_BUCKET)
		.bind(tenant_id.to_string())
		.bind(user_id)
		.bind(UNKNOWN_DEVICE_BUCKET)
		.fetch_all(&self.pool)
		.await?;

		let recent_rows = sqlx::query_as::<_, EventRow>(&format!(
			r#"
			SELECT {EVENT_COLUMNS}
			FROM events
			WHERE tenant_id = ? AND user_id = ?
			ORDER BY timestamp DESC
			LIMIT ?
			"#
		))
		.bind(tenant_id.to_string())
		.bind(user_id)
		.bind(self.user_recent_limit as i32)
		.fetch_all(&self.pool)
		.await?;
		let recent_events: Vec<Event> = recent_rows
			.into_iter()
			.map(TryInto::try_into)
			.collect::<Result<_>>()?;

		let ip_rows: Vec<(String,)> = sqlx::query_as(
			r#"
			SELECT DISTINCT ip_address
			FROM events
			WHERE tenant_id = ? AND user_id = ? AND ip_address IS NOT NULL
			ORDER BY ip_address ASC
			"#,
		)
		.bind(tenant_id.to_string())
		.bind(user_id)
		.fetch_all(&self.pool)
		.await?;

		Ok(Some(UserStats {
			user_id: user_id.to_string(),
			total_events: total_events as u64,
			device_data: device_rows
				.into_iter()
				.map(|(device, count)| (device, count as u64))
				.collect(),
			recent_events,
			first_seen: parse_event_time("first_seen", &first_seen)?,
			last_seen: parse_event_time("last_seen", &last_seen)?,
			ip_addresses: ip_rows.into_iter().map(|(ip,)| ip).collect(),
		}))
	}

	/// Most recent events for a tenant, newest first. `limit` is clamped to
	/// a hard cap.
	#[instrument(skip(self), fields(tenant_id = %tenant_id, limit))]
	pub async fn recent_events(&self, tenant_id: TenantId, limit: u32) -> Result<Vec<Event>> {
		let limit = limit.min(MAX_RECENT_EVENTS);

		let rows = sqlx::query_as::<_, EventRow>(&format!(
			r#"
			SELECT {EVENT_COLUMNS}
			FROM events
			WHERE tenant_id = ?
			ORDER BY timestamp DESC
			LIMIT ?
			"#
		))
		.bind(tenant_id.to_string())
		.bind(limit as i32)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	/// Event volume per event type, ordered by count descending.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn counts_by_type(
		&self,
		tenant_id: TenantId,
		range: Option<DateRange>,
	) -> Result<Vec<EventTypeCount>> {
		let rows: Vec<(String, i64, i64)> = if let Some(range) = range {
			let (start, end) = range_bounds(range);
			sqlx::query_as(
				r#"
				SELECT event_type, COUNT(*), COUNT(DISTINCT user_id)
				FROM events
				WHERE tenant_id = ? AND timestamp >= ? AND timestamp < ?
				GROUP BY event_type
				ORDER BY COUNT(*) DESC
				"#,
			)
			.bind(tenant_id.to_string())
			.bind(start.to_rfc3339())
			.bind(end.to_rfc3339())
			.fetch_all(&self.pool)
			.await?
		} else {
			sqlx::query_as(
				r#"
				SELECT event_type, COUNT(*), COUNT(DISTINCT user_id)
				FROM events
				WHERE tenant_id = ?
				GROUP BY event_type
				ORDER BY COUNT(*) DESC
				"#,
			)
			.bind(tenant_id.to_string())
			.fetch_all(&self.pool)
			.await?
		};

		Ok(rows
			.into_iter()
			.map(|(event_type, count, unique_users)| EventTypeCount {
				event_type,
				count: count as u64,
				unique_users: unique_users as u64,
			})
			.collect())
	}
}

fn parse_event_time(field: &str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| TelemetryServerError::InvalidData(format!("invalid {field}: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::aggregation::{AggregationEngine, AggregationHandle};
	use crate::event::EventIngestor;
	use crate::tenant::TenantRegistry;
	use crate::testing::create_telemetry_test_pool;
	use beacon_telemetry_core::{DeviceType, EventPayload, OwnerId};
	use chrono::{NaiveDate, TimeZone};

	struct Fixture {
		pool: SqlitePool,
		tenant_id: TenantId,
		ingestor: EventIngestor,
		engine: AggregationEngine,
		queries: QueryService,
		_rx: tokio::sync::mpsc::Receiver<crate::aggregation::AggregationJob>,
	}

	async fn setup() -> Fixture {
		let pool = create_telemetry_test_pool().await;
		let registry = TenantRegistry::new(pool.clone());
		let (tenant, _, _) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();
		let (handle, rx) = AggregationHandle::for_testing();
		Fixture {
			pool: pool.clone(),
			tenant_id: tenant.id,
			ingestor: EventIngestor::new(pool.clone(), handle),
			engine: AggregationEngine::new(pool.clone()),
			queries: QueryService::new(pool, 10),
			_rx: rx,
		}
	}

	fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
		Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
	}

	async fn seed(fixture: &Fixture) {
		// Two days of clicks and one page_view.
		for (event_type, user, device, ts, ip) in [
			("click", Some("u1"), Some(DeviceType::Mobile), at(2026, 3, 1, 9), Some("203.0.113.1")),
			("click", Some("u2"), Some(DeviceType::Mobile), at(2026, 3, 1, 10), Some("203.0.113.2")),
			("click", Some("u1"), Some(DeviceType::Desktop), at(2026, 3, 2, 11), Some("203.0.113.1")),
			("click", None, None, at(2026, 3, 2, 12), None),
			("page_view", Some("u1"), Some(DeviceType::Mobile), at(2026, 3, 1, 9), Some("203.0.113.3")),
		] {
			let mut payload = EventPayload::new(event_type).with_timestamp(ts);
			payload.user_id = user.map(String::from);
			payload.device = device;
			payload.ip_address = ip.map(String::from);
			fixture
				.ingestor
				.ingest(fixture.tenant_id, payload, None)
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn cache_path_reads_recomputed_rows() {
		let fixture = setup().await;
		seed(&fixture).await;

		let day1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
		let day2 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
		fixture.engine.recompute(fixture.tenant_id, "click", day1).await.unwrap();
		fixture.engine.recompute(fixture.tenant_id, "click", day2).await.unwrap();

		let rows = fixture
			.queries
			.summaries(fixture.tenant_id, Some("click"), None)
			.await
			.unwrap();
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[0].date, day1);
		assert_eq!(rows[0].total_count, 2);
		assert_eq!(rows[0].unique_users, 2);
		assert_eq!(rows[1].date, day2);
		assert_eq!(rows[1].total_count, 2);
		assert_eq!(rows[1].unique_users, 1);

		let ranged = fixture
			.queries
			.summaries(fixture.tenant_id, Some("click"), Some(DateRange::single(day2)))
			.await
			.unwrap();
		assert_eq!(ranged.len(), 1);
		assert_eq!(ranged[0].date, day2);
	}

	#[tokio::test]
	async fn ad_hoc_path_matches_recompute() {
		let fixture = setup().await;
		seed(&fixture).await;

		let rows = fixture
			.queries
			.summaries(fixture.tenant_id, None, None)
			.await
			.unwrap();
		// (click, day1), (page_view, day1), (click, day2)
		assert_eq!(rows.len(), 3);

		let day1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
		let click_day1 = rows
			.iter()
			.find(|s| s.event_type == "click" && s.date == day1)
			.unwrap();
		let recomputed = fixture
			.engine
			.recompute(fixture.tenant_id, "click", day1)
			.await
			.unwrap();
		assert_eq!(click_day1.aggregate_fields(), recomputed.aggregate_fields());

		let day2 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
		let click_day2 = rows
			.iter()
			.find(|s| s.event_type == "click" && s.date == day2)
			.unwrap();
		assert_eq!(click_day2.device_data.get("unknown"), Some(&1));
		assert_eq!(click_day2.device_total(), click_day2.total_count);
	}

	#[tokio::test]
	async fn summaries_absent_when_no_events_match() {
		let fixture = setup().await;
		assert!(fixture
			.queries
			.summaries(fixture.tenant_id, None, None)
			.await
			.unwrap()
			.is_empty());
		assert!(fixture
			.queries
			.summaries(fixture.tenant_id, Some("click"), None)
			.await
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn stats_for_user_profiles_activity() {
		let fixture = setup().await;
		seed(&fixture).await;

		let stats = fixture
			.queries
			.stats_for_user(fixture.tenant_id, "u1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stats.total_events, 3);
		assert_eq!(stats.device_data.get("mobile"), Some(&2));
		assert_eq!(stats.device_data.get("desktop"), Some(&1));
		assert_eq!(stats.first_seen, at(2026, 3, 1, 9));
		assert_eq!(stats.last_seen, at(2026, 3, 2, 11));
		assert_eq!(
			stats.ip_addresses,
			vec!["203.0.113.1".to_string(), "203.0.113.3".to_string()]
		);

		// Newest first.
		assert_eq!(stats.recent_events.len(), 3);
		assert_eq!(stats.recent_events[0].timestamp, at(2026, 3, 2, 11));
		assert!(stats
			.recent_events
			.windows(2)
			.all(|w| w[0].timestamp >= w[1].timestamp));
	}

	#[tokio::test]
	async fn stats_for_unknown_user_is_absent() {
		let fixture = setup().await;
		seed(&fixture).await;
		assert!(fixture
			.queries
			.stats_for_user(fixture.tenant_id, "nobody")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn stats_recent_events_honor_bound() {
		let fixture = setup().await;
		// Same storage, tighter bound.
		let bounded = QueryService::new(fixture.pool.clone(), 2);
		seed(&fixture).await;

		let stats = bounded
			.stats_for_user(fixture.tenant_id, "u1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(stats.total_events, 3);
		assert_eq!(stats.recent_events.len(), 2);
	}

	#[tokio::test]
	async fn recent_events_are_bounded_and_ordered() {
		let fixture = setup().await;
		seed(&fixture).await;

		let events = fixture
			.queries
			.recent_events(fixture.tenant_id, 3)
			.await
			.unwrap();
		assert_eq!(events.len(), 3);
		assert!(events.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

		let all = fixture
			.queries
			.recent_events(fixture.tenant_id, 1000)
			.await
			.unwrap();
		assert_eq!(all.len(), 5);
	}

	#[tokio::test]
	async fn counts_by_type_orders_by_volume() {
		let fixture = setup().await;
		seed(&fixture).await;

		let counts = fixture
			.queries
			.counts_by_type(fixture.tenant_id, None)
			.await
			.unwrap();
		assert_eq!(counts.len(), 2);
		assert_eq!(counts[0].event_type, "click");
		assert_eq!(counts[0].count, 4);
		assert_eq!(counts[0].unique_users, 2);
		assert_eq!(counts[1].event_type, "page_view");
		assert_eq!(counts[1].count, 1);

		let day1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
		let ranged = fixture
			.queries
			.counts_by_type(fixture.tenant_id, Some(DateRange::single(day1)))
			.await
			.unwrap();
		let click = ranged.iter().find(|c| c.event_type == "click").unwrap();
		assert_eq!(click.count, 2);
	}
}
