// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the telemetry service.
//!
//! Passed by construction; nothing reads ambient process state.

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::service::TelemetryService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
	/// SQLite connection string.
	#[serde(default = "default_database_url")]
	pub database_url: String,

	/// Bound of the background aggregation queue; submissions beyond it are
	/// dropped rather than blocking ingestion.
	#[serde(default = "default_aggregation_queue_capacity")]
	pub aggregation_queue_capacity: usize,

	/// How many recent events a per-user stats query returns.
	#[serde(default = "default_user_recent_events")]
	pub user_recent_events: u32,
}

fn default_database_url() -> String {
	"sqlite:./beacon.db".to_string()
}

fn default_aggregation_queue_capacity() -> usize {
	1024
}

fn default_user_recent_events() -> u32 {
	10
}

impl Default for TelemetryConfig {
	fn default() -> Self {
		Self {
			database_url: default_database_url(),
			aggregation_queue_capacity: default_aggregation_queue_capacity(),
			user_recent_events: default_user_recent_events(),
		}
	}
}
