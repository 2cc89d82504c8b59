// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Beacon telemetry system.
//!
//! This crate holds the domain model shared by the server implementation and
//! any future SDKs: tenants, credentials and the API key scheme, events, and
//! the daily summary cache rows. It performs no I/O.

pub mod api_key;
pub mod credential;
pub mod error;
pub mod event;
pub mod stats;
pub mod summary;
pub mod tenant;

pub use api_key::{
	fingerprint, generate_key, key_prefix, mask_key, masked_display, parse_key,
	DISPLAY_PREFIX_LENGTH, KEY_LENGTH, SCHEME_PREFIX,
};
pub use credential::{Credential, CredentialId, CredentialMetadata};
pub use error::{Result, TelemetryError};
pub use event::{DeviceType, Event, EventId, EventPayload, UNKNOWN_DEVICE_BUCKET};
pub use stats::{EventTypeCount, UserStats};
pub use summary::{DateRange, EventSummary, EventSummaryId};
pub use tenant::{normalize_url, OwnerId, Tenant, TenantContext, TenantId};
