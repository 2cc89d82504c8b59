// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema bootstrap for the four telemetry relations.
//!
//! All statements are idempotent (`IF NOT EXISTS`), so calling this on every
//! startup is safe. The partial unique index on `credentials` is the
//! storage-layer backstop for the one-active-credential-per-tenant invariant;
//! the application enforces it transactionally as well.

use sqlx::SqlitePool;

use crate::error::Result;

/// Creates the telemetry tables and indexes if they do not exist.
#[tracing::instrument(skip(pool))]
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS tenants (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL,
			url TEXT NOT NULL,
			owner_id TEXT NOT NULL,
			created_at TEXT NOT NULL,
			UNIQUE (owner_id, url)
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS credentials (
			id TEXT PRIMARY KEY,
			tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
			key_hash TEXT NOT NULL UNIQUE,
			key_prefix TEXT NOT NULL,
			is_active INTEGER NOT NULL DEFAULT 1,
			created_at TEXT NOT NULL,
			expires_at TEXT,
			last_used_at TEXT,
			revoked_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	// At most one active credential per tenant, enforced by the storage layer.
	sqlx::query(
		r#"
		CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_one_active
		ON credentials(tenant_id) WHERE is_active = 1
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS events (
			id TEXT PRIMARY KEY,
			tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
			event_type TEXT NOT NULL,
			url TEXT,
			referrer TEXT,
			device TEXT,
			ip_address TEXT,
			metadata TEXT NOT NULL DEFAULT '{}',
			session_id TEXT,
			user_id TEXT,
			timestamp TEXT NOT NULL,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_events_tenant_type_time ON events(tenant_id, event_type, timestamp)",
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_tenant_user ON events(tenant_id, user_id)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS event_summaries (
			id TEXT PRIMARY KEY,
			tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
			event_type TEXT NOT NULL,
			date TEXT NOT NULL,
			total_count INTEGER NOT NULL,
			unique_users INTEGER NOT NULL,
			device_data TEXT NOT NULL,
			updated_at TEXT NOT NULL,
			UNIQUE (tenant_id, event_type, date)
		)
		"#,
	)
	.execute(pool)
	.await?;

	tracing::debug!("telemetry schema initialized");
	Ok(())
}
