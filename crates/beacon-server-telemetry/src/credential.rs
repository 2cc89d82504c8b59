// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential store: issuance state, rotation, revocation, resolution.
//!
//! All lookups go through the deterministic key fingerprint; the plaintext
//! never reaches storage. Revocation and rotation deactivate rows rather
//! than deleting them, preserving the audit trail.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use beacon_common_secret::SecretString;
use beacon_telemetry_core::{
	api_key, Credential, CredentialId, CredentialMetadata, OwnerId, TenantContext, TenantId,
};

use crate::error::{Result, TelemetryServerError};

/// Store for credential lifecycle operations.
#[derive(Clone)]
pub struct CredentialStore {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
	id: String,
	tenant_id: String,
	key_hash: String,
	key_prefix: String,
	is_active: i64,
	created_at: String,
	expires_at: Option<String>,
	last_used_at: Option<String>,
	revoked_at: Option<String>,
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| TelemetryServerError::InvalidData(format!("invalid {field}: {e}")))
}

impl TryFrom<CredentialRow> for Credential {
	type Error = TelemetryServerError;

	fn try_from(row: CredentialRow) -> Result<Self> {
		Ok(Credential {
			id: CredentialId(
				row
					.id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid credential ID".into()))?,
			),
			tenant_id: TenantId(
				row
					.tenant_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid tenant ID".into()))?,
			),
			key_hash: row.key_hash,
			key_prefix: row.key_prefix,
			is_active: row.is_active != 0,
			created_at: parse_timestamp("created_at", &row.created_at)?,
			expires_at: row
				.expires_at
				.map(|s| parse_timestamp("expires_at", &s))
				.transpose()?,
			last_used_at: row
				.last_used_at
				.map(|s| parse_timestamp("last_used_at", &s))
				.transpose()?,
			revoked_at: row
				.revoked_at
				.map(|s| parse_timestamp("revoked_at", &s))
				.transpose()?,
		})
	}
}

const CREDENTIAL_COLUMNS: &str =
	"id, tenant_id, key_hash, key_prefix, is_active, created_at, expires_at, last_used_at, revoked_at";

/// Inserts a credential row inside an open transaction.
///
/// Used by registration and rotation so the insert shares their atomicity.
pub(crate) async fn insert_credential(
	tx: &mut Transaction<'_, Sqlite>,
	credential: &Credential,
) -> Result<()> {
	sqlx::query(
		r#"
		INSERT INTO credentials (
			id, tenant_id, key_hash, key_prefix, is_active,
			created_at, expires_at, last_used_at, revoked_at
		) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(credential.id.to_string())
	.bind(credential.tenant_id.to_string())
	.bind(&credential.key_hash)
	.bind(&credential.key_prefix)
	.bind(if credential.is_active { 1 } else { 0 })
	.bind(credential.created_at.to_rfc3339())
	.bind(credential.expires_at.map(|dt| dt.to_rfc3339()))
	.bind(credential.last_used_at.map(|dt| dt.to_rfc3339()))
	.bind(credential.revoked_at.map(|dt| dt.to_rfc3339()))
	.execute(&mut **tx)
	.await?;

	Ok(())
}

impl CredentialStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Rotates the tenant's credential: deactivates whatever is active and
	/// issues a replacement, atomically.
	///
	/// # Errors
	/// `NotFoundOrUnauthorized` when the tenant does not exist or is not
	/// owned by `requesting_owner`; the two cases are indistinguishable to
	/// the caller.
	#[instrument(skip(self), fields(tenant_id = %tenant_id, owner_id = %requesting_owner))]
	pub async fn rotate(
		&self,
		tenant_id: TenantId,
		requesting_owner: OwnerId,
	) -> Result<(SecretString, Credential)> {
		let owned: Option<(i64,)> =
			sqlx::query_as("SELECT 1 FROM tenants WHERE id = ? AND owner_id = ?")
				.bind(tenant_id.to_string())
				.bind(requesting_owner.to_string())
				.fetch_optional(&self.pool)
				.await?;
		if owned.is_none() {
			return Err(TelemetryServerError::NotFoundOrUnauthorized);
		}

		let (plaintext, credential) = Credential::issue(tenant_id);
		let now = Utc::now();

		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			UPDATE credentials
			SET is_active = 0, revoked_at = ?
			WHERE tenant_id = ? AND is_active = 1
			"#,
		)
		.bind(now.to_rfc3339())
		.bind(tenant_id.to_string())
		.execute(&mut *tx)
		.await?;

		insert_credential(&mut tx, &credential).await?;

		tx.commit().await?;

		tracing::info!(tenant_id = %tenant_id, credential_id = %credential.id, "credential rotated");
		Ok((plaintext, credential))
	}

	/// Revokes the credential matching the presented plaintext.
	///
	/// # Errors
	/// `NotFoundOrAlreadyInactive` when no active row matches; whether the
	/// key never existed or was already revoked is not observable.
	#[instrument(skip(self, presented))]
	pub async fn revoke(&self, presented: &str) -> Result<Credential> {
		let key_hash = api_key::fingerprint(presented);
		let now = Utc::now();

		let result = sqlx::query(
			r#"
			UPDATE credentials
			SET is_active = 0, revoked_at = ?
			WHERE key_hash = ? AND is_active = 1
			"#,
		)
		.bind(now.to_rfc3339())
		.bind(&key_hash)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(TelemetryServerError::NotFoundOrAlreadyInactive);
		}

		let row = sqlx::query_as::<_, CredentialRow>(&format!(
			"SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE key_hash = ?"
		))
		.bind(&key_hash)
		.fetch_one(&self.pool)
		.await?;

		let credential: Credential = row.try_into()?;
		tracing::info!(credential_id = %credential.id, tenant_id = %credential.tenant_id, "credential revoked");
		Ok(credential)
	}

	/// Metadata for the tenant's active credential.
	///
	/// # Errors
	/// `NoActiveCredential` if the tenant has none.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn describe(&self, tenant_id: TenantId) -> Result<CredentialMetadata> {
		let row = sqlx::query_as::<_, CredentialRow>(&format!(
			"SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE tenant_id = ? AND is_active = 1"
		))
		.bind(tenant_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		let credential: Credential = row
			.ok_or(TelemetryServerError::NoActiveCredential)?
			.try_into()?;
		Ok(credential.metadata())
	}

	/// Every credential ever issued for the tenant, newest first.
	///
	/// Rows are never deleted, so this is the full audit history.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn history(&self, tenant_id: TenantId) -> Result<Vec<CredentialMetadata>> {
		let rows = sqlx::query_as::<_, CredentialRow>(&format!(
			"SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE tenant_id = ? ORDER BY created_at DESC"
		))
		.bind(tenant_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|row| Credential::try_from(row).map(|c| c.metadata()))
			.collect()
	}

	/// Resolves a presented plaintext key to the tenant it authenticates as.
	///
	/// Returns `None` for unknown, inactive, or expired keys. On success a
	/// best-effort last-used update is spawned off the caller's path; its
	/// failure never affects resolution.
	#[instrument(skip(self, presented))]
	pub async fn resolve(&self, presented: &str) -> Result<Option<TenantContext>> {
		let key_hash = api_key::fingerprint(presented);
		let now = Utc::now();

		let row: Option<(String, String, String, String)> = sqlx::query_as(
			r#"
			SELECT c.id, t.id, t.name, t.owner_id
			FROM credentials c
			JOIN tenants t ON t.id = c.tenant_id
			WHERE c.key_hash = ? AND c.is_active = 1
			  AND (c.expires_at IS NULL OR c.expires_at > ?)
			"#,
		)
		.bind(&key_hash)
		.bind(now.to_rfc3339())
		.fetch_optional(&self.pool)
		.await?;

		let Some((credential_id, tenant_id, tenant_name, owner_id)) = row else {
			return Ok(None);
		};

		let context = TenantContext {
			tenant_id: TenantId(
				tenant_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid tenant ID".into()))?,
			),
			tenant_name,
			owner_id: OwnerId(
				owner_id
					.parse()
					.map_err(|_| TelemetryServerError::InvalidData("invalid owner ID".into()))?,
			),
		};

		let pool = self.pool.clone();
		tokio::spawn(async move {
			if let Err(e) = touch_last_used(&pool, &credential_id).await {
				tracing::warn!(error = %e, credential_id = %credential_id, "failed to update credential last_used_at");
			}
		});

		tracing::debug!(tenant_id = %context.tenant_id, "credential resolved");
		Ok(Some(context))
	}
}

async fn touch_last_used(pool: &SqlitePool, credential_id: &str) -> Result<()> {
	sqlx::query("UPDATE credentials SET last_used_at = ? WHERE id = ?")
		.bind(Utc::now().to_rfc3339())
		.bind(credential_id)
		.execute(pool)
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tenant::TenantRegistry;
	use crate::testing::create_telemetry_test_pool;
	use std::time::Duration;

	async fn setup() -> (SqlitePool, TenantRegistry, CredentialStore) {
		let pool = create_telemetry_test_pool().await;
		(
			pool.clone(),
			TenantRegistry::new(pool.clone()),
			CredentialStore::new(pool),
		)
	}

	#[tokio::test]
	async fn resolve_returns_tenant_context_for_valid_key() {
		let (_pool, registry, store) = setup().await;
		let owner = OwnerId::new();
		let (tenant, plaintext, _) = registry
			.register("T".to_string(), "https://x.com", owner)
			.await
			.unwrap();

		let context = store.resolve(plaintext.expose()).await.unwrap().unwrap();
		assert_eq!(context.tenant_id, tenant.id);
		assert_eq!(context.tenant_name, "T");
		assert_eq!(context.owner_id, owner);
	}

	#[tokio::test]
	async fn resolve_unknown_key_is_absent() {
		let (_pool, _registry, store) = setup().await;
		let unknown = api_key::generate_key();
		assert!(store.resolve(unknown.expose()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn resolve_records_last_used() {
		let (_pool, registry, store) = setup().await;
		let (tenant, plaintext, _) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();

		store.resolve(plaintext.expose()).await.unwrap().unwrap();

		// The touch runs off the caller's path; give it a moment.
		let mut last_used = None;
		for _ in 0..50 {
			let meta = store.describe(tenant.id).await.unwrap();
			if meta.last_used_at.is_some() {
				last_used = meta.last_used_at;
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert!(last_used.is_some());
	}

	#[tokio::test]
	async fn revoked_key_no_longer_resolves() {
		let (_pool, registry, store) = setup().await;
		let (_, plaintext, _) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();

		let revoked = store.revoke(plaintext.expose()).await.unwrap();
		assert!(!revoked.is_active);
		assert!(revoked.revoked_at.is_some());

		assert!(store.resolve(plaintext.expose()).await.unwrap().is_none());

		// A second revocation is indistinguishable from a key that never existed.
		let err = store.revoke(plaintext.expose()).await.unwrap_err();
		assert!(matches!(err, TelemetryServerError::NotFoundOrAlreadyInactive));
	}

	#[tokio::test]
	async fn revoking_garbage_collapses_to_same_error() {
		let (_pool, _registry, store) = setup().await;
		let never_issued = api_key::generate_key();
		let err = store.revoke(never_issued.expose()).await.unwrap_err();
		assert!(matches!(err, TelemetryServerError::NotFoundOrAlreadyInactive));
	}

	#[tokio::test]
	async fn rotation_leaves_exactly_one_active_credential() {
		let (pool, registry, store) = setup().await;
		let owner = OwnerId::new();
		let (tenant, old_plaintext, _) = registry
			.register("T".to_string(), "https://x.com", owner)
			.await
			.unwrap();

		let (new_plaintext, new_credential) = store.rotate(tenant.id, owner).await.unwrap();
		assert!(new_credential.is_active);
		assert_ne!(new_plaintext.expose(), old_plaintext.expose());

		let (active,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM credentials WHERE tenant_id = ? AND is_active = 1")
				.bind(tenant.id.to_string())
				.fetch_one(&pool)
				.await
				.unwrap();
		assert_eq!(active, 1);

		// Old key is deactivated with a revocation timestamp, and dead.
		let history = store.history(tenant.id).await.unwrap();
		assert_eq!(history.len(), 2);
		assert_eq!(history.iter().filter(|m| m.is_active).count(), 1);
		assert!(history.iter().any(|m| m.revoked_at.is_some()));
		assert!(store.resolve(old_plaintext.expose()).await.unwrap().is_none());

		// New key resolves.
		assert!(store.resolve(new_plaintext.expose()).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn repeated_rotation_keeps_single_active() {
		let (pool, registry, store) = setup().await;
		let owner = OwnerId::new();
		let (tenant, _, _) = registry
			.register("T".to_string(), "https://x.com", owner)
			.await
			.unwrap();

		for _ in 0..5 {
			store.rotate(tenant.id, owner).await.unwrap();
		}

		let (active,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM credentials WHERE tenant_id = ? AND is_active = 1")
				.bind(tenant.id.to_string())
				.fetch_one(&pool)
				.await
				.unwrap();
		assert_eq!(active, 1);
		assert_eq!(store.history(tenant.id).await.unwrap().len(), 6);
	}

	#[tokio::test]
	async fn rotate_by_non_owner_collapses_to_single_error() {
		let (_pool, registry, store) = setup().await;
		let (tenant, _, _) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();

		let wrong_owner = store.rotate(tenant.id, OwnerId::new()).await.unwrap_err();
		assert!(matches!(wrong_owner, TelemetryServerError::NotFoundOrUnauthorized));

		let missing_tenant = store.rotate(TenantId::new(), OwnerId::new()).await.unwrap_err();
		assert!(matches!(missing_tenant, TelemetryServerError::NotFoundOrUnauthorized));
	}

	#[tokio::test]
	async fn describe_masks_and_never_exposes_hash() {
		let (_pool, registry, store) = setup().await;
		let (tenant, plaintext, credential) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();

		let meta = store.describe(tenant.id).await.unwrap();
		assert_eq!(meta.masked_key, api_key::mask_key(plaintext.expose()));
		assert!(meta.is_active);
		assert!(!meta.masked_key.contains(&credential.key_hash));
	}

	#[tokio::test]
	async fn describe_without_active_credential_fails() {
		let (_pool, registry, store) = setup().await;
		let (tenant, plaintext, _) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();
		store.revoke(plaintext.expose()).await.unwrap();

		let err = store.describe(tenant.id).await.unwrap_err();
		assert!(matches!(err, TelemetryServerError::NoActiveCredential));
	}

	#[tokio::test]
	async fn expired_credential_does_not_resolve() {
		let (pool, registry, store) = setup().await;
		let (_, plaintext, credential) = registry
			.register("T".to_string(), "https://x.com", OwnerId::new())
			.await
			.unwrap();

		sqlx::query("UPDATE credentials SET expires_at = ? WHERE id = ?")
			.bind((Utc::now() - chrono::Duration::hours(1)).to_rfc3339())
			.bind(credential.id.to_string())
			.execute(&pool)
			.await
			.unwrap();

		assert!(store.resolve(plaintext.expose()).await.unwrap().is_none());
	}
}
