// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant registry: application records and registration.
//!
//! Registration creates the tenant and its first credential in a single
//! transaction; a tenant never exists without having had a credential issued.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use beacon_common_secret::SecretString;
use beacon_telemetry_core::{Credential, OwnerId, Tenant, TenantId};

use crate::credential::insert_credential;
use crate::error::{Result, TelemetryServerError};

/// Registry for tenant (application) records.
#[derive(Clone)]
pub struct TenantRegistry {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct TenantRow {
	id: String,
	name: String,
	url: String,
	owner_id: String,
	created_at: String,
}

impl TryFrom<TenantRow> for Tenant {
	type Error = TelemetryServerError;

	fn try_from(row: TenantRow) -> Result<Self> {
		Ok(Tenant {
			id: TenantId(
				row
					.id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid tenant ID".into()))?,
			),
			name: row.name,
			url: row.url,
			owner_id: OwnerId(
				row
					.owner_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid owner ID".into()))?,
			),
			created_at: DateTime::parse_from_rfc3339(&row.created_at)
				.map_err(|e| TelemetryServerError::InvalidData(format!("invalid created_at: {e}")))?
				.with_timezone(&Utc),
		})
	}
}

pub(crate) const TENANT_COLUMNS: &str = "id, name, url, owner_id, created_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
	matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl TenantRegistry {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Registers a new application and issues its first credential.
	///
	/// The tenant and credential rows are written in one transaction;
	/// either both exist afterwards or neither does. The returned plaintext
	/// is shown to the caller once and is not recoverable.
	///
	/// # Errors
	/// `DuplicateRegistration` if this owner already registered the same
	/// normalized URL.
	#[instrument(skip(self, name, url), fields(owner_id = %owner_id))]
	pub async fn register(
		&self,
		name: String,
		url: &str,
		owner_id: OwnerId,
	) -> Result<(Tenant, SecretString, Credential)> {
		let tenant = Tenant::new(name, url, owner_id);
		let (plaintext, credential) = Credential::issue(tenant.id);

		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			INSERT INTO tenants (id, name, url, owner_id, created_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(tenant.id.to_string())
		.bind(&tenant.name)
		.bind(&tenant.url)
		.bind(tenant.owner_id.to_string())
		.bind(tenant.created_at.to_rfc3339())
		.execute(&mut *tx)
		.await
		.map_err(|e| {
			if is_unique_violation(&e) {
				TelemetryServerError::DuplicateRegistration
			} else {
				e.into()
			}
		})?;

		insert_credential(&mut tx, &credential).await?;

		tx.commit().await?;

		tracing::info!(tenant_id = %tenant.id, owner_id = %owner_id, "tenant registered");
		Ok((tenant, plaintext, credential))
	}

	/// Get a tenant by its ID.
	#[instrument(skip(self), fields(tenant_id = %id))]
	pub async fn get(&self, id: TenantId) -> Result<Option<Tenant>> {
		let row = sqlx::query_as::<_, TenantRow>(&format!(
			"SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	/// List all tenants registered by an owner, newest first.
	#[instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Tenant>> {
		let rows = sqlx::query_as::<_, TenantRow>(&format!(
			"SELECT {TENANT_COLUMNS} FROM tenants WHERE owner_id = ? ORDER BY created_at DESC"
		))
		.bind(owner_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}
}
