// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry server.
//!
//! The not-found/unauthorized and not-found/already-inactive pairs are each
//! collapsed into a single variant on purpose: callers must not be able to
//! distinguish "never existed" from "exists but you may not touch it", which
//! would otherwise act as an existence oracle for keys and tenants.

use thiserror::Error;

/// Errors that can occur in the telemetry server.
#[derive(Debug, Error)]
pub enum TelemetryServerError {
	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// A tenant with the same owner and normalized URL already exists
	#[error("application already registered for this owner and URL")]
	DuplicateRegistration,

	/// Tenant missing or not owned by the requesting user
	#[error("tenant not found or not owned by requester")]
	NotFoundOrUnauthorized,

	/// Credential missing or already inactive
	#[error("credential not found or already inactive")]
	NotFoundOrAlreadyInactive,

	/// Tenant has no active credential
	#[error("no active credential for tenant")]
	NoActiveCredential,

	/// Invalid stored data
	#[error("invalid data: {0}")]
	InvalidData(String),

	/// JSON serialization error
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	/// Core error
	#[error("telemetry core error: {0}")]
	Core(#[from] beacon_telemetry_core::TelemetryError),
}

/// Result type for telemetry server operations.
pub type Result<T> = std::result::Result<T, TelemetryServerError>;
