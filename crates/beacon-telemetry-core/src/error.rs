// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry core.

use thiserror::Error;

/// Errors that can occur in the telemetry core types.
#[derive(Debug, Error)]
pub enum TelemetryError {
	/// Invalid device type string
	#[error("invalid device type: {0}")]
	InvalidDevice(String),
}

/// Result type for telemetry core operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
