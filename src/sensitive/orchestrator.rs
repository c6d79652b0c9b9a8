// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Record-level encryption on the read and write paths.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │              SensitiveFieldOrchestrator               │
//! │   write: plain sensitive fields ──► EncryptedField    │
//! │   read:  EncryptedField ──► plain (per DecryptPolicy) │
//! │  ┌─────────────────────┐   ┌───────────────────────┐  │
//! │  │     FieldCipher     │   │      KeyManager       │  │
//! │  │ AES-256-GCM, AAD =  │◄──│ KeyCache + KeyProvider│  │
//! │  │     tenant id       │   │  (+ TenantKeyStore)   │  │
//! │  └─────────────────────┘   └───────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, instrument};

use super::fields::SensitiveFieldSet;
use crate::error::{CryptoError, FieldError};
use crate::field::{DecryptPolicy, DecryptedRecord, FieldCipher, FieldValue, Record};
use crate::keys::KeyManager;
use crate::kms::WrappedKey;

/// Applies field encryption to whole records for the persistence layer.
///
/// Both entry points take the record by reference and return a new one.
/// Both are safe to run over records mixing plaintext and ciphertext:
/// encryption skips values that are already encrypted and decryption only
/// touches encrypted values.
pub struct SensitiveFieldOrchestrator {
    fields: SensitiveFieldSet,
    cipher: FieldCipher,
    keys: Arc<KeyManager>,
    policy: DecryptPolicy,
}

impl SensitiveFieldOrchestrator {
    /// Creates an orchestrator with the default sensitive fields and the
    /// fail-the-read policy.
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            fields: SensitiveFieldSet::default(),
            cipher: FieldCipher::new(),
            keys,
            policy: DecryptPolicy::default(),
        }
    }

    pub fn with_sensitive_fields(mut self, fields: SensitiveFieldSet) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_decrypt_policy(mut self, policy: DecryptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sensitive_fields(&self) -> &SensitiveFieldSet {
        &self.fields
    }

    pub fn decrypt_policy(&self) -> DecryptPolicy {
        self.policy
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypts every sensitive field that holds a non-empty plain string.
    ///
    /// Fails without returning a record if any of them cannot be
    /// encrypted; plaintext is never passed through for a sensitive field.
    #[instrument(skip(self, record), fields(field_count = record.len()))]
    pub async fn encrypt_record(&self, record: &Record, tenant_id: &str) -> Result<Record, FieldError> {
        let targets: Vec<&str> = record
            .iter()
            .filter(|(name, value)| {
                self.fields.contains(name)
                    && matches!(value, FieldValue::Plain(s) if !s.is_empty())
            })
            .map(|(name, _)| name.as_str())
            .collect();

        if targets.is_empty() {
            return Ok(record.clone());
        }

        debug!(encrypted = targets.len(), "Encrypting sensitive fields");
        self.cipher
            .encrypt_fields(record, &targets, tenant_id, &self.keys)
            .await
    }

    /// Decrypts every encrypted field in the record, sensitive or not.
    #[instrument(skip(self, record), fields(field_count = record.len()))]
    pub async fn decrypt_record(
        &self,
        record: &Record,
        tenant_id: &str,
    ) -> Result<DecryptedRecord, FieldError> {
        let targets: Vec<&str> = record
            .iter()
            .filter(|(_, value)| FieldCipher::is_field_encrypted(value))
            .map(|(name, _)| name.as_str())
            .collect();

        if targets.is_empty() {
            return Ok(DecryptedRecord {
                record: record.clone(),
                failures: Vec::new(),
            });
        }

        debug!(encrypted = targets.len(), "Decrypting fields");
        self.cipher
            .decrypt_fields(record, &targets, tenant_id, &self.keys, self.policy)
            .await
    }

    /// Provisions a new key for a tenant and returns the wrapped form for
    /// the caller to persist with the tenant.
    pub async fn generate_tenant_key(&self, tenant_id: &str) -> Result<WrappedKey, CryptoError> {
        Ok(self.keys.generate_tenant_key(tenant_id).await?.into_wrapped())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::keys::{InMemoryKeyStore, TenantKeyStore};
    use crate::kms::{KeyProvider, LocalKeyProvider};

    fn orchestrator() -> SensitiveFieldOrchestrator {
        let provider = LocalKeyProvider::generate().unwrap();
        SensitiveFieldOrchestrator::new(Arc::new(KeyManager::new(Arc::new(provider))))
    }

    fn employee() -> Record {
        serde_json::from_value(json!({
            "display_name": "Ada Lovelace",
            "phone": "+1-555-123-4567",
            "personal_email": "ada@example.com",
            "home_address": "",
            "date_of_birth": null,
            "employee_number": 1815
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_encrypt_record_targets_sensitive_non_empty_strings() {
        let orch = orchestrator();
        let input = employee();

        let stored = orch.encrypt_record(&input, "tenant-a").await.unwrap();

        assert!(stored["phone"].is_encrypted());
        assert!(stored["personal_email"].is_encrypted());
        assert_eq!(stored["display_name"], input["display_name"]);
        assert_eq!(stored["home_address"], FieldValue::from(""));
        assert_eq!(stored["date_of_birth"], FieldValue::null());
        assert_eq!(stored["employee_number"], input["employee_number"]);

        // input untouched
        assert_eq!(input, employee());
    }

    #[tokio::test]
    async fn test_round_trip_for_same_tenant() {
        crate::keys::testing::init_tracing();
        let orch = orchestrator();
        let stored = orch.encrypt_record(&employee(), "tenant-a").await.unwrap();

        let read = orch.decrypt_record(&stored, "tenant-a").await.unwrap();
        assert!(read.is_complete());
        assert_eq!(read.record, employee());
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_read() {
        let orch = orchestrator();
        let mut record = Record::new();
        record.insert("phone".into(), "+1-555-123-4567".into());

        let stored = orch.encrypt_record(&record, "tenant-a").await.unwrap();
        orch.encrypt_record(&record, "tenant-b").await.unwrap();

        let err = orch.decrypt_record(&stored, "tenant-b").await.unwrap_err();
        assert_eq!(err.field, "phone");
        assert!(matches!(err.source, CryptoError::Decryption(_)));
    }

    #[tokio::test]
    async fn test_encrypt_is_idempotent_over_mixed_records() {
        let orch = orchestrator();
        let once = orch.encrypt_record(&employee(), "tenant-a").await.unwrap();

        let mut mixed = once.clone();
        mixed.insert("mobile_phone".into(), "+44 20 7946 0000".into());
        let twice = orch.encrypt_record(&mixed, "tenant-a").await.unwrap();

        assert_eq!(twice["phone"], once["phone"]);
        assert_eq!(twice["personal_email"], once["personal_email"]);
        assert!(twice["mobile_phone"].is_encrypted());

        let read = orch.decrypt_record(&twice, "tenant-a").await.unwrap();
        assert_eq!(read.record["mobile_phone"], FieldValue::from("+44 20 7946 0000"));
        assert_eq!(read.record["phone"], FieldValue::from("+1-555-123-4567"));
    }

    #[tokio::test]
    async fn test_decrypt_passes_legacy_plaintext_through() {
        let orch = orchestrator();
        let legacy = employee();

        let read = orch.decrypt_record(&legacy, "tenant-a").await.unwrap();
        assert_eq!(read.record, legacy);
        assert!(orch.key_manager().get_cached_key("tenant-a").is_none());
    }

    #[tokio::test]
    async fn test_custom_sensitive_fields() {
        let orch = orchestrator().with_sensitive_fields(SensitiveFieldSet::new(["ssn"]));
        let mut record = Record::new();
        record.insert("ssn".into(), "078-05-1120".into());
        record.insert("phone".into(), "555".into());

        let stored = orch.encrypt_record(&record, "tenant-a").await.unwrap();
        assert!(stored["ssn"].is_encrypted());
        assert_eq!(stored["phone"], FieldValue::from("555"));
    }

    #[tokio::test]
    async fn test_null_on_error_policy() {
        let orch = orchestrator().with_decrypt_policy(DecryptPolicy::NullOnError);
        let mut stored = orch.encrypt_record(&employee(), "tenant-a").await.unwrap();

        let Some(FieldValue::Encrypted(email)) = stored.get("personal_email").cloned() else {
            panic!("personal_email should be encrypted");
        };
        let mut truncated = email.ciphertext().to_string();
        truncated.truncate(8);
        stored.insert(
            "personal_email".into(),
            crate::field::EncryptedField::from_parts(truncated, email.iv()).into(),
        );

        let read = orch.decrypt_record(&stored, "tenant-a").await.unwrap();
        assert_eq!(read.record["phone"], FieldValue::from("+1-555-123-4567"));
        assert_eq!(read.record["personal_email"], FieldValue::null());
        assert_eq!(read.failures.len(), 1);
        assert_eq!(read.failures[0].field, "personal_email");
    }

    #[tokio::test]
    async fn test_write_aborts_when_key_unavailable() {
        let provider: Arc<dyn KeyProvider> = Arc::new(crate::keys::testing::CountingProvider::new().failing());
        let orch = SensitiveFieldOrchestrator::new(Arc::new(KeyManager::new(provider)));

        let err = orch.encrypt_record(&employee(), "tenant-a").await.unwrap_err();
        assert!(err.source.is_retryable());
    }

    #[tokio::test]
    async fn test_provisioned_key_survives_cache_clear() {
        let store = Arc::new(InMemoryKeyStore::new());
        let provider = LocalKeyProvider::generate().unwrap();
        let keys = KeyManager::new(Arc::new(provider))
            .with_key_store(Arc::clone(&store) as Arc<dyn TenantKeyStore>);
        let orch = SensitiveFieldOrchestrator::new(Arc::new(keys));

        let stored = orch.encrypt_record(&employee(), "tenant-a").await.unwrap();
        orch.key_manager().clear_cache();

        let read = orch.decrypt_record(&stored, "tenant-a").await.unwrap();
        assert_eq!(read.record, employee());
    }

    #[tokio::test]
    async fn test_generate_tenant_key_returns_wrapped_key() {
        let orch = orchestrator();
        let wrapped = orch.generate_tenant_key("tenant-a").await.unwrap();

        assert!(!wrapped.ciphertext().is_empty());
        let cached = orch.key_manager().get_cached_key("tenant-a").unwrap();
        let rewrapped = orch
            .key_manager()
            .decrypt_key(&wrapped, "tenant-a")
            .await
            .unwrap();
        assert_eq!(cached.key(), rewrapped.key());
    }
}
