// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Key material types shared by providers and the key manager.

use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::aead::{Nonce, NonceSequence, NONCE_LEN};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of AES-256 keys in bytes.
pub const AES_256_KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tag in bytes.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Yields one caller-chosen nonce.
pub(crate) struct SingleNonce(pub(crate) Option<[u8; NONCE_LEN]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// A tenant's data encryption key (DEK).
///
/// Holds 256 bits of raw key material. The bytes are zeroized when the
/// value is dropped and never appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataEncryptionKey {
    key: [u8; AES_256_KEY_SIZE],
    #[zeroize(skip)]
    tenant_id: String,
    #[zeroize(skip)]
    created_at: SystemTime,
}

impl DataEncryptionKey {
    /// Creates a DEK for the given tenant from raw key material.
    pub fn new(key: [u8; AES_256_KEY_SIZE], tenant_id: String) -> Self {
        Self {
            key,
            tenant_id,
            created_at: SystemTime::now(),
        }
    }

    /// Creates a DEK from a slice, checking its length.
    pub fn from_slice(bytes: &[u8], tenant_id: String) -> Result<Self, CryptoError> {
        if bytes.len() != AES_256_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self::new(key, tenant_id))
    }

    /// Returns the key material.
    ///
    /// Do not copy the returned bytes into long-lived storage.
    #[inline]
    pub fn key(&self) -> &[u8; AES_256_KEY_SIZE] {
        &self.key
    }

    /// Returns the tenant this key belongs to.
    #[inline]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[inline]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl std::fmt::Debug for DataEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataEncryptionKey")
            .field("tenant_id", &self.tenant_id)
            .field("created_at", &self.created_at)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A DEK in its provider-wrapped, storable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Provider ciphertext of the DEK.
    ciphertext: Vec<u8>,
    /// Identifier of the key-encryption key that wrapped this DEK.
    kek_id: String,
}

impl WrappedKey {
    pub fn new(ciphertext: Vec<u8>, kek_id: String) -> Self {
        Self { ciphertext, kek_id }
    }

    #[inline]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    #[inline]
    pub fn kek_id(&self) -> &str {
        &self.kek_id
    }

    /// Encodes the ciphertext as standard base64 for persistence.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    /// Restores a wrapped key from its persisted base64 ciphertext and KEK id.
    pub fn from_base64(encoded: &str, kek_id: impl Into<String>) -> Result<Self, CryptoError> {
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::KeyProvider(format!("wrapped key is not base64: {}", e)))?;
        if ciphertext.is_empty() {
            return Err(CryptoError::KeyProvider("wrapped key is empty".into()));
        }
        Ok(Self::new(ciphertext, kek_id.into()))
    }
}

/// One tenant's DEK: the persisted wrapped form plus, in memory only, the
/// unwrapped key.
pub struct TenantKeyRecord {
    tenant_id: String,
    wrapped_key: WrappedKey,
    unwrapped_key: Option<DataEncryptionKey>,
}

impl TenantKeyRecord {
    pub fn new(
        tenant_id: impl Into<String>,
        wrapped_key: WrappedKey,
        unwrapped_key: Option<DataEncryptionKey>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            wrapped_key,
            unwrapped_key,
        }
    }

    #[inline]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[inline]
    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }

    #[inline]
    pub fn unwrapped_key(&self) -> Option<&DataEncryptionKey> {
        self.unwrapped_key.as_ref()
    }

    /// Drops the unwrapped key, keeping only the persistable part.
    pub fn into_wrapped(self) -> WrappedKey {
        self.wrapped_key
    }
}

impl std::fmt::Debug for TenantKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantKeyRecord")
            .field("tenant_id", &self.tenant_id)
            .field("wrapped_key", &self.wrapped_key)
            .field("unwrapped_key", &self.unwrapped_key)
            .finish()
    }
}
