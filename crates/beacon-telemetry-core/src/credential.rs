// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential types for tenant API keys.
//!
//! A credential stores the SHA-256 fingerprint of its key and a non-secret
//! display prefix; the plaintext exists only in the return value of issuance.
//! Credentials are deactivated on revocation or rotation but never deleted,
//! so the full issuance history stays available for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_common_secret::SecretString;

use crate::api_key;
use crate::tenant::TenantId;

/// Unique identifier for a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub Uuid);

impl CredentialId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for CredentialId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for CredentialId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for CredentialId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A hashed, revocable API key belonging to exactly one tenant.
///
/// At most one credential per tenant is active at any time; the storage
/// layer backs this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
	pub id: CredentialId,
	pub tenant_id: TenantId,
	pub key_hash: String,
	pub key_prefix: String,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub revoked_at: Option<DateTime<Utc>>,
}

impl Credential {
	/// Generates a key and builds the active credential record for it.
	///
	/// The plaintext is returned exactly once and cannot be recovered from
	/// the record.
	pub fn issue(tenant_id: TenantId) -> (SecretString, Self) {
		let plaintext = api_key::generate_key();
		let credential = Self {
			id: CredentialId::new(),
			tenant_id,
			key_hash: api_key::fingerprint(plaintext.expose()),
			key_prefix: api_key::key_prefix(plaintext.expose()).to_string(),
			is_active: true,
			created_at: Utc::now(),
			expires_at: None,
			last_used_at: None,
			revoked_at: None,
		};
		(plaintext, credential)
	}

	/// Returns `true` if this credential has been revoked or rotated out.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Returns `true` if this credential has an expiry in the past.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}

	/// Masked display form reconstructed from the stored prefix.
	pub fn masked_display(&self) -> String {
		api_key::masked_display(&self.key_prefix)
	}

	/// Non-secret metadata view of this credential.
	pub fn metadata(&self) -> CredentialMetadata {
		CredentialMetadata {
			masked_key: self.masked_display(),
			is_active: self.is_active,
			created_at: self.created_at,
			expires_at: self.expires_at,
			last_used_at: self.last_used_at,
			revoked_at: self.revoked_at,
		}
	}
}

/// What a tenant owner may see about a credential: the masked display form
/// and lifecycle timestamps. Never the hash, never a usable secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialMetadata {
	pub masked_key: String,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub expires_at: Option<DateTime<Utc>>,
	pub last_used_at: Option<DateTime<Utc>>,
	pub revoked_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn issue_returns_plaintext_once() {
		let tenant_id = TenantId::new();
		let (plaintext, credential) = Credential::issue(tenant_id);

		assert_eq!(credential.tenant_id, tenant_id);
		assert!(credential.is_active);
		assert!(credential.revoked_at.is_none());
		assert_eq!(credential.key_hash, api_key::fingerprint(plaintext.expose()));
		assert_eq!(credential.key_prefix, api_key::key_prefix(plaintext.expose()));
		// The record never contains the plaintext.
		assert_ne!(credential.key_hash, plaintext.expose());
	}

	#[test]
	fn masked_display_matches_plaintext_mask() {
		let (plaintext, credential) = Credential::issue(TenantId::new());
		assert_eq!(credential.masked_display(), api_key::mask_key(plaintext.expose()));
		assert_eq!(credential.masked_display().len(), api_key::KEY_LENGTH);
	}

	#[test]
	fn expiry_check() {
		let (_, mut credential) = Credential::issue(TenantId::new());
		let now = Utc::now();
		assert!(!credential.is_expired(now));

		credential.expires_at = Some(now - Duration::seconds(1));
		assert!(credential.is_expired(now));

		credential.expires_at = Some(now + Duration::hours(1));
		assert!(!credential.is_expired(now));
	}

	#[test]
	fn metadata_exposes_no_hash() {
		let (_, credential) = Credential::issue(TenantId::new());
		let meta = credential.metadata();
		assert!(meta.is_active);
		assert!(!meta.masked_key.contains(&credential.key_hash));
		let json = serde_json::to_string(&meta).unwrap();
		assert!(!json.contains(&credential.key_hash));
	}
}
