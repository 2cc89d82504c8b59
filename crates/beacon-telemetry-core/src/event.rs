// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event types for captured telemetry occurrences.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_common_secret::SecretString;

use crate::error::TelemetryError;
use crate::tenant::TenantId;

/// Unique identifier for an event. UUIDv7 keeps inserts time-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EventId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for EventId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Device class reported with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	Mobile,
	Desktop,
	Tablet,
	Other,
}

/// Aggregation bucket for events that carry no device class.
pub const UNKNOWN_DEVICE_BUCKET: &str = "unknown";

impl DeviceType {
	/// Returns the string representation used on the wire and in storage.
	pub fn as_str(&self) -> &'static str {
		match self {
			DeviceType::Mobile => "mobile",
			DeviceType::Desktop => "desktop",
			DeviceType::Tablet => "tablet",
			DeviceType::Other => "other",
		}
	}
}

impl std::fmt::Display for DeviceType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl std::str::FromStr for DeviceType {
	type Err = TelemetryError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"mobile" => Ok(DeviceType::Mobile),
			"desktop" => Ok(DeviceType::Desktop),
			"tablet" => Ok(DeviceType::Tablet),
			"other" => Ok(DeviceType::Other),
			_ => Err(TelemetryError::InvalidDevice(s.to_string())),
		}
	}
}

/// One immutable captured occurrence attributed to a tenant.
///
/// Events are append-only; nothing updates an event row after the durable
/// write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub id: EventId,
	pub tenant_id: TenantId,
	pub event_type: String,
	pub url: Option<String>,
	pub referrer: Option<String>,
	pub device: Option<DeviceType>,
	pub ip_address: Option<SecretString>,
	/// Free-form structured metadata supplied by the client.
	pub metadata: serde_json::Value,
	pub session_id: Option<String>,
	pub user_id: Option<String>,
	/// Client-supplied event time, or capture time when omitted.
	pub timestamp: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

impl Event {
	/// Creates a minimal event captured now.
	pub fn new(tenant_id: TenantId, event_type: String) -> Self {
		let now = Utc::now();
		Self {
			id: EventId::new(),
			tenant_id,
			event_type,
			url: None,
			referrer: None,
			device: None,
			ip_address: None,
			metadata: serde_json::json!({}),
			session_id: None,
			user_id: None,
			timestamp: now,
			created_at: now,
		}
	}

	/// The UTC calendar day this event aggregates into.
	pub fn utc_day(&self) -> NaiveDate {
		self.timestamp.date_naive()
	}
}

fn default_metadata() -> serde_json::Value {
	serde_json::json!({})
}

/// A validated inbound event payload.
///
/// The boundary layer has already checked the event-type pattern, URL
/// well-formedness, and the device enum before this type is constructed;
/// ingestion fills in the capture-time defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
	pub event_type: String,
	pub url: Option<String>,
	pub referrer: Option<String>,
	pub device: Option<DeviceType>,
	/// Client-reported address; ingestion falls back to the transport origin.
	pub ip_address: Option<String>,
	#[serde(default = "default_metadata")]
	pub metadata: serde_json::Value,
	pub session_id: Option<String>,
	pub user_id: Option<String>,
	pub timestamp: Option<DateTime<Utc>>,
}

impl EventPayload {
	/// Creates a payload with only an event type set.
	pub fn new(event_type: impl Into<String>) -> Self {
		Self {
			event_type: event_type.into(),
			url: None,
			referrer: None,
			device: None,
			ip_address: None,
			metadata: default_metadata(),
			session_id: None,
			user_id: None,
			timestamp: None,
		}
	}

	/// Sets the user identifier (builder pattern).
	pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Sets the device class (builder pattern).
	pub fn with_device(mut self, device: DeviceType) -> Self {
		self.device = Some(device);
		self
	}

	/// Sets the event timestamp (builder pattern).
	pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = Some(timestamp);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use proptest::prelude::*;

	#[test]
	fn device_type_roundtrip() {
		for device in [
			DeviceType::Mobile,
			DeviceType::Desktop,
			DeviceType::Tablet,
			DeviceType::Other,
		] {
			let parsed: DeviceType = device.as_str().parse().unwrap();
			assert_eq!(parsed, device);
		}
		assert!("smartwatch".parse::<DeviceType>().is_err());
		assert!("".parse::<DeviceType>().is_err());
	}

	#[test]
	fn device_type_serde_uses_lowercase() {
		let json = serde_json::to_string(&DeviceType::Mobile).unwrap();
		assert_eq!(json, "\"mobile\"");
		let parsed: DeviceType = serde_json::from_str("\"tablet\"").unwrap();
		assert_eq!(parsed, DeviceType::Tablet);
	}

	#[test]
	fn utc_day_truncates_timestamp() {
		let mut event = Event::new(TenantId::new(), "click".to_string());
		event.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap();
		assert_eq!(event.utc_day(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
	}

	#[test]
	fn payload_defaults_metadata_to_empty_object() {
		let payload: EventPayload = serde_json::from_str(r#"{"event_type":"page_view"}"#).unwrap();
		assert_eq!(payload.metadata, serde_json::json!({}));
		assert!(payload.timestamp.is_none());
	}

	proptest! {
		#[test]
		fn event_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = EventId(Uuid::from_bytes(uuid_bytes));
			let parsed: EventId = id.to_string().parse().unwrap();
			prop_assert_eq!(id, parsed);
		}

		#[test]
		fn event_ids_are_unique(_seed: u64) {
			let a = EventId::new();
			let b = EventId::new();
			prop_assert_ne!(a, b);
		}
	}
}
