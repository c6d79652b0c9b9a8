// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Persistence interface for tenants' wrapped keys.
//!
//! The database that actually stores wrapped keys (typically a column on
//! the tenant row) lives outside this crate. It plugs in through
//! [`TenantKeyStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::CryptoError;
use crate::kms::WrappedKey;

/// Storage for one wrapped DEK per tenant.
#[async_trait]
pub trait TenantKeyStore: Send + Sync {
    /// Loads the tenant's wrapped key, if one has been persisted.
    async fn load(&self, tenant_id: &str) -> Result<Option<WrappedKey>, CryptoError>;

    /// Persists `wrapped` unless the tenant already has a key.
    ///
    /// Must be atomic. Returns the key that is stored after the call:
    /// `wrapped` if it was inserted, otherwise the existing key.
    async fn insert_if_absent(
        &self,
        tenant_id: &str,
        wrapped: WrappedKey,
    ) -> Result<WrappedKey, CryptoError>;
}

/// A [`TenantKeyStore`] held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    wrapped_keys: RwLock<HashMap<String, WrappedKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: &str) -> Option<WrappedKey> {
        self.wrapped_keys.read().get(tenant_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.wrapped_keys.read().len()
    }
}

#[async_trait]
impl TenantKeyStore for InMemoryKeyStore {
    async fn load(&self, tenant_id: &str) -> Result<Option<WrappedKey>, CryptoError> {
        Ok(self.get(tenant_id))
    }

    async fn insert_if_absent(
        &self,
        tenant_id: &str,
        wrapped: WrappedKey,
    ) -> Result<WrappedKey, CryptoError> {
        Ok(self
            .wrapped_keys
            .write()
            .entry(tenant_id.to_string())
            .or_insert(wrapped)
            .clone())
    }
}
