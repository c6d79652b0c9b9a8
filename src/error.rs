// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Error types for key management and field encryption.

use std::time::Duration;

/// Errors produced by key providers, the key manager and the field cipher.
///
/// Messages never carry key material or plaintext.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The key provider (KMS) was unreachable, throttled, or returned
    /// malformed data.
    #[error("key provider error: {0}")]
    KeyProvider(String),

    /// A key provider call did not complete in time.
    #[error("key provider timed out after {0:?}")]
    ProviderTimeout(Duration),

    /// The tenant key store collaborator failed.
    #[error("tenant key store error: {0}")]
    KeyStore(String),

    /// No cached or derivable key exists for the tenant.
    #[error("no data key for tenant {0}")]
    KeyNotFound(String),

    /// Random key or nonce generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// AEAD sealing failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD opening failed or the encrypted value is malformed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// Configuration could not be turned into a working provider.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CryptoError {
    /// Returns true if retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CryptoError::KeyProvider(_) | CryptoError::ProviderTimeout(_) | CryptoError::KeyStore(_)
        )
    }

    /// Returns true for failures that come from obtaining the tenant key
    /// rather than from a single field's ciphertext.
    pub fn is_key_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::KeyProvider(_)
                | CryptoError::ProviderTimeout(_)
                | CryptoError::KeyStore(_)
                | CryptoError::KeyNotFound(_)
                | CryptoError::KeyGeneration(_)
                | CryptoError::InvalidKeyLength { .. }
        )
    }
}

/// A failure attributed to one named field of a record.
#[derive(Debug, thiserror::Error)]
#[error("field `{field}`: {source}")]
pub struct FieldError {
    /// Name of the field that failed.
    pub field: String,
    /// The underlying failure.
    #[source]
    pub source: CryptoError,
}

impl FieldError {
    pub fn new(field: impl Into<String>, source: CryptoError) -> Self {
        Self {
            field: field.into(),
            source,
        }
    }
}
