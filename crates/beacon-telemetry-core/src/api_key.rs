// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! API key scheme for tenant credentials.
//!
//! Keys use the format `bcn_<32 hex chars>`: a constant 4-character scheme
//! marker followed by a 128-bit random body, for a fixed total length of 36.
//! The plaintext is shown once at issuance; storage only ever sees the
//! SHA-256 fingerprint and the non-secret display prefix.
//!
//! The fingerprint is deliberately unsalted: lookup-by-hash requires a
//! deterministic digest, and the input space is uniformly random at 122 bits,
//! which is what salting exists to compensate for in low-entropy secrets.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use beacon_common_secret::SecretString;

/// Constant scheme marker at the start of every key.
pub const SCHEME_PREFIX: &str = "bcn_";

/// Fixed total length of a plaintext key.
pub const KEY_LENGTH: usize = 36;

/// Length of the non-secret display prefix (`bcn_` plus four body chars).
pub const DISPLAY_PREFIX_LENGTH: usize = 8;

const BODY_LENGTH: usize = KEY_LENGTH - SCHEME_PREFIX.len();
const MASK_CHAR: char = '*';

/// Generates a new random API key.
///
/// The returned plaintext must be shown to the caller once and then
/// discarded; only [`fingerprint`] and [`key_prefix`] derivations are stored.
pub fn generate_key() -> SecretString {
	let random = Uuid::new_v4().to_string().replace('-', "");
	SecretString::new(format!("{}{}", SCHEME_PREFIX, random))
}

/// Validates a presented key against the scheme, returning the random body.
///
/// Returns `None` if the marker, length, or body alphabet is wrong. Callers
/// use this to reject malformed input before any hashing or storage lookup.
pub fn parse_key(key: &str) -> Option<&str> {
	let body = key.strip_prefix(SCHEME_PREFIX)?;
	if body.len() != BODY_LENGTH || !body.chars().all(|c| c.is_ascii_hexdigit()) {
		return None;
	}
	Some(body)
}

/// Deterministic one-way fingerprint of a plaintext key (lower-case hex
/// SHA-256), used for storage and lookup. Never store the plaintext.
pub fn fingerprint(key: &str) -> String {
	hex::encode(Sha256::digest(key.as_bytes()))
}

/// The non-secret display prefix of a plaintext key.
///
/// Key bodies are ASCII hex, so slicing at a byte offset is safe.
pub fn key_prefix(key: &str) -> &str {
	&key[..DISPLAY_PREFIX_LENGTH.min(key.len())]
}

/// Masked display form of a plaintext key: the display prefix followed by a
/// placeholder run padding to the full key length.
///
/// All generated keys share one fixed length, so the mask leaks nothing the
/// scheme itself does not already reveal.
pub fn mask_key(key: &str) -> String {
	masked_display(key_prefix(key))
}

/// Reconstructs the masked display form from a stored display prefix.
pub fn masked_display(prefix: &str) -> String {
	let mut masked = String::with_capacity(KEY_LENGTH);
	masked.push_str(prefix);
	while masked.len() < KEY_LENGTH {
		masked.push(MASK_CHAR);
	}
	masked
}
