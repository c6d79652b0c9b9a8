// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Provider doubles for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CryptoError;
use crate::kms::{DataEncryptionKey, KeyProvider, LocalKeyProvider, ProviderKind, WrappedKey};

/// Wraps a local provider and counts calls, optionally delaying or failing
/// each one.
pub(crate) struct CountingProvider {
    inner: LocalKeyProvider,
    wraps: AtomicUsize,
    unwraps: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl CountingProvider {
    pub(crate) fn new() -> Self {
        Self {
            inner: LocalKeyProvider::generate().unwrap(),
            wraps: AtomicUsize::new(0),
            unwraps: AtomicUsize::new(0),
            delay: None,
            fail: false,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn wraps(&self) -> usize {
        self.wraps.load(Ordering::SeqCst)
    }

    pub(crate) fn unwraps(&self) -> usize {
        self.unwraps.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.wraps() + self.unwraps()
    }

    async fn before_call(&self) -> Result<(), CryptoError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CryptoError::KeyProvider("service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for CountingProvider {
    async fn wrap(&self, tenant_id: &str) -> Result<(WrappedKey, DataEncryptionKey), CryptoError> {
        self.wraps.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        self.inner.wrap(tenant_id).await
    }

    async fn unwrap(
        &self,
        tenant_id: &str,
        wrapped: &WrappedKey,
    ) -> Result<DataEncryptionKey, CryptoError> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        self.inner.unwrap(tenant_id, wrapped).await
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn kek_id(&self) -> &str {
        self.inner.kek_id()
    }
}

/// Routes `tracing` output to the test harness. Filter with `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
