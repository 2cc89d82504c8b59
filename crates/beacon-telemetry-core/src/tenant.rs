// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant types for registered applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant (registered application).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for TenantId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for TenantId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for TenantId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Unique identifier for the user who owns a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for OwnerId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for OwnerId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for OwnerId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A registered application whose events are isolated from all other tenants.
///
/// `(owner_id, url)` is unique; `url` is always stored in canonical form
/// (see [`normalize_url`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
	pub id: TenantId,
	pub name: String,
	pub url: String,
	pub owner_id: OwnerId,
	pub created_at: DateTime<Utc>,
}

impl Tenant {
	/// Creates a new tenant record, normalizing the URL.
	pub fn new(name: String, url: &str, owner_id: OwnerId) -> Self {
		Self {
			id: TenantId::new(),
			name,
			url: normalize_url(url),
			owner_id,
			created_at: Utc::now(),
		}
	}
}

/// Canonical form of a tenant URL: trimmed and lower-cased.
///
/// Uniqueness per owner is defined over this form, so `HTTPS://X.com` and
/// `https://x.com ` are the same registration.
pub fn normalize_url(url: &str) -> String {
	url.trim().to_lowercase()
}

/// The resolved identity a credential authenticates as.
///
/// This is the only context the ingestion and query paths receive; they
/// never see the credential itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
	pub tenant_id: TenantId,
	pub tenant_name: String,
	pub owner_id: OwnerId,
}
