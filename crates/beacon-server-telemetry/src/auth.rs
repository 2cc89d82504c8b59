// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential authentication for inbound requests.
//!
//! The boundary layer extracts the opaque credential string from the request
//! header; this component resolves it to a tenant context or nothing. The
//! boundary maps "nothing" to its unauthorized response.

use tracing::instrument;

use beacon_telemetry_core::{api_key, TenantContext};

use crate::credential::CredentialStore;
use crate::error::Result;

/// Resolves presented credentials to tenant identities.
#[derive(Clone)]
pub struct Authenticator {
	credentials: CredentialStore,
}

impl Authenticator {
	pub fn new(credentials: CredentialStore) -> Self {
		Self { credentials }
	}

	/// Resolves a presented credential string.
	///
	/// Strings that do not match the key scheme are rejected before any
	/// hashing or storage lookup.
	#[instrument(skip(self, presented))]
	pub async fn authenticate(&self, presented: &str) -> Result<Option<TenantContext>> {
		if api_key::parse_key(presented).is_none() {
			tracing::debug!("presented credential does not match key scheme");
			return Ok(None);
		}

		self.credentials.resolve(presented).await
	}
}
