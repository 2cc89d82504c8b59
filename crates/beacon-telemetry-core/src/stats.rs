// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-side result records for the query APIs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Per-user activity within one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
	pub user_id: String,
	pub total_events: u64,
	/// Device class → event count for this user.
	pub device_data: BTreeMap<String, u64>,
	/// Most recent events, newest first, bounded by the service config.
	pub recent_events: Vec<Event>,
	pub first_seen: DateTime<Utc>,
	pub last_seen: DateTime<Utc>,
	/// Distinct IP addresses observed for this user.
	pub ip_addresses: Vec<String>,
}

/// Event volume for one event type, used by the counts-by-type listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeCount {
	pub event_type: String,
	pub count: u64,
	pub unique_users: u64,
}
