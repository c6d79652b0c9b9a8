// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-process cache of unwrapped tenant DEKs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kms::DataEncryptionKey;

/// Map of tenant id to unwrapped DEK.
///
/// Readers run concurrently; inserts take the write lock briefly. Two
/// callers racing to insert the same tenant both succeed and the later
/// insert wins with an equivalent key. Entries are handed out as `Arc`s,
/// so clearing the cache never invalidates a key an in-flight operation
/// already holds; the key bytes are zeroized when the last holder drops.
#[derive(Default)]
pub struct KeyCache {
    keys: RwLock<HashMap<String, Arc<DataEncryptionKey>>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached key for a tenant.
    pub fn get(&self, tenant_id: &str) -> Option<Arc<DataEncryptionKey>> {
        self.keys.read().get(tenant_id).cloned()
    }

    /// Caches a key under its tenant id and returns the shared handle.
    pub fn insert(&self, dek: DataEncryptionKey) -> Arc<DataEncryptionKey> {
        let dek = Arc::new(dek);
        self.keys
            .write()
            .insert(dek.tenant_id().to_string(), Arc::clone(&dek));
        dek
    }

    /// Evicts one tenant's key.
    pub fn remove(&self, tenant_id: &str) -> Option<Arc<DataEncryptionKey>> {
        self.keys.write().remove(tenant_id)
    }

    /// Drops every cached key. Returns how many were evicted.
    pub fn clear(&self) -> usize {
        let mut keys = self.keys.write();
        let evicted = keys.len();
        keys.clear();
        evicted
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.keys.read().contains_key(tenant_id)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
