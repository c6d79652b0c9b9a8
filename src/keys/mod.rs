// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-tenant key management.
//!
//! [`KeyManager`] sits between callers and a [`crate::kms::KeyProvider`]:
//! it caches unwrapped DEKs by tenant id, bounds every provider call with a
//! timeout, and lazily provisions a key the first time a tenant writes.

mod cache;
mod manager;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::KeyCache;
pub use manager::{KeyManager, DEFAULT_PROVIDER_TIMEOUT};
pub use store::{InMemoryKeyStore, TenantKeyStore};
