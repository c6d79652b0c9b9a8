// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Key provider trait.

use async_trait::async_trait;

use super::key::{DataEncryptionKey, WrappedKey};
use crate::error::CryptoError;

/// Kind of backend behind a [`KeyProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// An external KMS reached over the network.
    Cloud,
    /// In-process key generation. Not for production.
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Cloud => "cloud",
            ProviderKind::Local => "local",
        }
    }
}

/// A backend that creates and unwraps per-tenant data encryption keys.
///
/// Cloud implementations perform network I/O and may fail transiently;
/// those failures are reported as [`CryptoError::KeyProvider`]. The tenant
/// id is passed as provider-side context so a wrapped key cannot be
/// unwrapped on behalf of another tenant where the backend supports it.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Generates a fresh 256-bit DEK and returns its wrapped form alongside
    /// the plaintext key.
    async fn wrap(&self, tenant_id: &str) -> Result<(WrappedKey, DataEncryptionKey), CryptoError>;

    /// Recovers the DEK from its wrapped form.
    async fn unwrap(
        &self,
        tenant_id: &str,
        wrapped: &WrappedKey,
    ) -> Result<DataEncryptionKey, CryptoError>;

    /// Returns the backend kind.
    fn kind(&self) -> ProviderKind;

    /// Returns the id of the key-encryption key new DEKs are wrapped under.
    fn kek_id(&self) -> &str;
}
