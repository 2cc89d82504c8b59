// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Daily summary types for the aggregation cache.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantId;

/// Unique identifier for a summary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSummaryId(pub Uuid);

impl EventSummaryId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for EventSummaryId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EventSummaryId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for EventSummaryId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Daily rollup of events for one (tenant, event type, UTC day).
///
/// Exactly one row exists per key. The row is a materialized cache: it is
/// always derivable by full recomputation from the event set and is never
/// the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
	pub id: EventSummaryId,
	pub tenant_id: TenantId,
	pub event_type: String,
	/// UTC day the summarized events fall on.
	pub date: NaiveDate,
	/// Total events for the key.
	pub total_count: u64,
	/// Distinct non-null user identifiers.
	pub unique_users: u64,
	/// Device class → event count; events without a device are bucketed
	/// under `"unknown"`. Ordered map so serialized forms are stable.
	pub device_data: BTreeMap<String, u64>,
	pub updated_at: DateTime<Utc>,
}

impl EventSummary {
	/// Sum of the device buckets. The buckets partition the event set, so
	/// this always equals [`EventSummary::total_count`].
	#[must_use]
	pub fn device_total(&self) -> u64 {
		self.device_data.values().sum()
	}

	/// The aggregate fields, without identity or write-time bookkeeping.
	///
	/// Two recomputations of the same key compare equal on this view even
	/// though their row ids and update timestamps differ.
	#[must_use]
	pub fn aggregate_fields(&self) -> (u64, u64, &BTreeMap<String, u64>) {
		(self.total_count, self.unique_users, &self.device_data)
	}
}

/// Inclusive calendar-date range for summary and count queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
	pub start: NaiveDate,
	pub end: NaiveDate,
}

impl DateRange {
	/// Creates a range; `start` and `end` are both included.
	pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
		Self { start, end }
	}

	/// A range covering a single day.
	pub fn single(day: NaiveDate) -> Self {
		Self { start: day, end: day }
	}

	/// Returns `true` if `day` falls within the range.
	pub fn contains(&self, day: NaiveDate) -> bool {
		self.start <= day && day <= self.end
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn sample_summary() -> EventSummary {
		let mut device_data = BTreeMap::new();
		device_data.insert("mobile".to_string(), 7);
		device_data.insert("desktop".to_string(), 2);
		device_data.insert("unknown".to_string(), 1);
		EventSummary {
			id: EventSummaryId::new(),
			tenant_id: TenantId::new(),
			event_type: "click".to_string(),
			date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
			total_count: 10,
			unique_users: 4,
			device_data,
			updated_at: Utc::now(),
		}
	}

	#[test]
	fn device_buckets_partition_total() {
		let summary = sample_summary();
		assert_eq!(summary.device_total(), summary.total_count);
	}

	#[test]
	fn aggregate_fields_ignore_identity() {
		let summary = sample_summary();
		let mut recomputed = summary.clone();
		recomputed.id = EventSummaryId::new();
		recomputed.updated_at = Utc::now();
		assert_eq!(summary.aggregate_fields(), recomputed.aggregate_fields());
	}

	#[test]
	fn device_data_serializes_in_key_order() {
		let summary = sample_summary();
		let json = serde_json::to_string(&summary.device_data).unwrap();
		assert_eq!(json, r#"{"desktop":2,"mobile":7,"unknown":1}"#);
	}

	#[test]
	fn date_range_contains_bounds() {
		let range = DateRange::new(
			NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
			NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
		);
		assert!(range.contains(range.start));
		assert!(range.contains(range.end));
		assert!(!range.contains(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));

		let single = DateRange::single(range.start);
		assert!(single.contains(range.start));
		assert!(!single.contains(range.end));
	}

	proptest! {
		#[test]
		fn summary_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = EventSummaryId(Uuid::from_bytes(uuid_bytes));
			let parsed: EventSummaryId = id.to_string().parse().unwrap();
			prop_assert_eq!(id, parsed);
		}
	}
}
