// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Tenant key manager: provider calls, caching and lazy provisioning.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::cache::KeyCache;
use super::store::TenantKeyStore;
use crate::error::CryptoError;
use crate::kms::{DataEncryptionKey, KeyProvider, ProviderKind, TenantKeyRecord, WrappedKey};

/// Default deadline for a single key provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the key cache and mediates every key provider call.
///
/// The cache is written only after a provider call has succeeded, so a
/// failed, timed-out or cancelled call never leaves an entry behind.
pub struct KeyManager {
    provider: Arc<dyn KeyProvider>,
    cache: KeyCache,
    store: Option<Arc<dyn TenantKeyStore>>,
    provider_timeout: Duration,
    /// Serializes lazy generation per tenant. Entries live only while a
    /// resolution is in flight.
    generation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Wrapped form of every key seen by this process. Survives
    /// `clear_cache` so an evicted key is re-fetched, never replaced.
    known_wrapped: Mutex<HashMap<String, WrappedKey>>,
}

impl KeyManager {
    /// Creates a manager over the given provider with an empty cache.
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            cache: KeyCache::new(),
            store: None,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            generation_locks: Mutex::new(HashMap::new()),
            known_wrapped: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the store that persists tenants' wrapped keys.
    ///
    /// With a store attached, cache misses are served by unwrapping the
    /// persisted key and lazily generated keys are persisted atomically.
    pub fn with_key_store(mut self, store: Arc<dyn TenantKeyStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the deadline applied to every provider call.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    /// Generates a new DEK for the tenant and caches it.
    ///
    /// Never checks for an existing key. Callers provisioning tenants must
    /// call this once per tenant, persist the returned wrapped key, and use
    /// [`KeyManager::decrypt_key`] from then on.
    #[instrument(skip(self))]
    pub async fn generate_tenant_key(&self, tenant_id: &str) -> Result<TenantKeyRecord, CryptoError> {
        let (wrapped, dek) = self.call_provider(self.provider.wrap(tenant_id)).await?;
        self.cache.insert(dek.clone());
        self.remember_wrapped(tenant_id, &wrapped);

        info!(kek_id = %wrapped.kek_id(), "Generated tenant data key");

        Ok(TenantKeyRecord::new(tenant_id, wrapped, Some(dek)))
    }

    /// Returns the tenant's cached key without any I/O.
    pub fn get_cached_key(&self, tenant_id: &str) -> Option<Arc<DataEncryptionKey>> {
        self.cache.get(tenant_id)
    }

    /// Returns the tenant's DEK, unwrapping `wrapped` only on a cache miss.
    #[instrument(skip(self, wrapped), fields(kek_id = %wrapped.kek_id()))]
    pub async fn decrypt_key(
        &self,
        wrapped: &WrappedKey,
        tenant_id: &str,
    ) -> Result<Arc<DataEncryptionKey>, CryptoError> {
        if let Some(dek) = self.cache.get(tenant_id) {
            debug!("Tenant key cache hit");
            return Ok(dek);
        }

        let dek = self
            .call_provider(self.provider.unwrap(tenant_id, wrapped))
            .await?;
        if dek.tenant_id() != tenant_id {
            return Err(CryptoError::KeyProvider(
                "provider returned a key for another tenant".into(),
            ));
        }

        debug!("Unwrapped tenant key");
        self.remember_wrapped(tenant_id, wrapped);
        Ok(self.cache.insert(dek))
    }

    /// Drops every cached key.
    ///
    /// Operations already holding a key finish with it; later calls go back
    /// to the provider, unwrapping the tenant's existing key again rather
    /// than generating a new one.
    pub fn clear_cache(&self) {
        let evicted = self.cache.clear();
        info!(evicted, "Cleared tenant key cache");
    }

    /// Resolves the key used to encrypt for a tenant, generating one if the
    /// tenant has none yet.
    ///
    /// Lookup order: cache, then the key store, then generation. Generation
    /// is serialized per tenant, and with a key store attached the new key
    /// is persisted with `insert_if_absent`; if another process won the
    /// race, its key is unwrapped and used instead. A tenant whose key was
    /// evicted by [`KeyManager::clear_cache`] gets that key back.
    #[instrument(skip(self))]
    pub async fn key_for_encrypt(&self, tenant_id: &str) -> Result<Arc<DataEncryptionKey>, CryptoError> {
        if let Some(dek) = self.cache.get(tenant_id) {
            return Ok(dek);
        }

        let lock = self.generation_lock(tenant_id);
        let guard = lock.lock().await;
        let result = self.resolve_or_generate(tenant_id).await;
        self.release_generation_lock(tenant_id, &lock);
        drop(guard);
        result
    }

    async fn resolve_or_generate(&self, tenant_id: &str) -> Result<Arc<DataEncryptionKey>, CryptoError> {
        if let Some(dek) = self.cache.get(tenant_id) {
            return Ok(dek);
        }

        if let Some(wrapped) = self.load_wrapped(tenant_id).await? {
            return self.decrypt_key(&wrapped, tenant_id).await;
        }

        let (wrapped, dek) = self.call_provider(self.provider.wrap(tenant_id)).await?;

        if let Some(store) = &self.store {
            let stored = store.insert_if_absent(tenant_id, wrapped.clone()).await?;
            if stored != wrapped {
                warn!("Tenant key was provisioned concurrently; using the stored key");
                drop(dek);
                return self.decrypt_key(&stored, tenant_id).await;
            }
        }

        info!(kek_id = %wrapped.kek_id(), "Lazily generated tenant data key");
        self.remember_wrapped(tenant_id, &wrapped);
        Ok(self.cache.insert(dek))
    }

    /// Resolves the key used to decrypt for a tenant. Never generates.
    #[instrument(skip(self))]
    pub async fn key_for_decrypt(&self, tenant_id: &str) -> Result<Arc<DataEncryptionKey>, CryptoError> {
        if let Some(dek) = self.cache.get(tenant_id) {
            return Ok(dek);
        }

        match self.load_wrapped(tenant_id).await? {
            Some(wrapped) => self.decrypt_key(&wrapped, tenant_id).await,
            None => {
                warn!("Decrypt requested for tenant without a data key");
                Err(CryptoError::KeyNotFound(tenant_id.to_string()))
            }
        }
    }

    async fn load_wrapped(&self, tenant_id: &str) -> Result<Option<WrappedKey>, CryptoError> {
        if let Some(store) = &self.store {
            if let Some(wrapped) = store.load(tenant_id).await? {
                return Ok(Some(wrapped));
            }
        }
        Ok(self.known_wrapped.lock().get(tenant_id).cloned())
    }

    fn remember_wrapped(&self, tenant_id: &str, wrapped: &WrappedKey) {
        self.known_wrapped
            .lock()
            .insert(tenant_id.to_string(), wrapped.clone());
    }

    /// Drops the tenant's lock entry unless another caller still holds a
    /// handle to it.
    fn release_generation_lock(&self, tenant_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.generation_locks.lock();
        if let Some(current) = locks.get(tenant_id) {
            // ours plus the map's
            if Arc::ptr_eq(current, lock) && Arc::strong_count(lock) == 2 {
                locks.remove(tenant_id);
            }
        }
    }

    fn generation_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.generation_locks
                .lock()
                .entry(tenant_id.to_string())
                .or_default(),
        )
    }

    async fn call_provider<T, F>(&self, call: F) -> Result<T, CryptoError>
    where
        F: Future<Output = Result<T, CryptoError>>,
    {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result.inspect_err(|e| warn!(error = %e, "Key provider call failed")),
            Err(_) => {
                warn!(timeout = ?self.provider_timeout, "Key provider call timed out");
                Err(CryptoError::ProviderTimeout(self.provider_timeout))
            }
        }
    }
}
