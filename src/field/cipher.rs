// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! AES-256-GCM encryption of individual string fields.
//!
//! # Format
//!
//! ```text
//! EncryptedField
//! ├── iv:         base64(nonce[12])
//! └── ciphertext: base64(ciphertext || tag[16])
//! AAD = tenant id bytes
//! ```
//!
//! Binding the tenant id as associated data means a value copied into
//! another tenant's record fails authentication there, even if the wrong
//! key were somehow available.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::aead::{self, Aad, BoundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;
use zeroize::Zeroize;

use super::value::{EncryptedField, FieldValue, Record};
use crate::error::{CryptoError, FieldError};
use crate::keys::KeyManager;
use crate::kms::{DataEncryptionKey, SingleNonce, AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE};

/// What to do when a single field fails to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptPolicy {
    /// Fail the whole read.
    #[default]
    FailRecord,
    /// Replace the field with null and report the failure alongside the
    /// record.
    NullOnError,
}

/// The result of decrypting a record's fields.
#[derive(Debug)]
pub struct DecryptedRecord {
    /// The record with decrypted values in place.
    pub record: Record,
    /// Fields that were nulled under [`DecryptPolicy::NullOnError`].
    pub failures: Vec<FieldError>,
}

impl DecryptedRecord {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Stateless field encryption engine.
///
/// Holds only a random source; keys come from a [`KeyManager`] per call.
pub struct FieldCipher {
    rng: SystemRandom,
}

impl Default for FieldCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldCipher {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Encrypts `plaintext` under `key` with a fresh random IV.
    ///
    /// The empty string encrypts to [`EncryptedField::empty`].
    pub fn seal(
        &self,
        key: &DataEncryptionKey,
        plaintext: &str,
        tenant_id: &str,
    ) -> Result<EncryptedField, CryptoError> {
        if plaintext.is_empty() {
            return Ok(EncryptedField::empty());
        }

        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::KeyGeneration("failed to generate IV".into()))?;

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, key.key())
            .map_err(|_| CryptoError::Encryption("AES-GCM key setup failed".into()))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce(Some(nonce_bytes)));

        let mut in_out = plaintext.as_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(tenant_id.as_bytes()), &mut in_out)
            .map_err(|_| CryptoError::Encryption("AES-GCM seal failed".into()))?;

        Ok(EncryptedField::from_parts(
            STANDARD.encode(&in_out),
            STANDARD.encode(nonce_bytes),
        ))
    }

    /// Decrypts a value sealed for `tenant_id` under `key`.
    ///
    /// Any authentication or format problem is a [`CryptoError::Decryption`];
    /// corrupted input never yields plaintext.
    pub fn open(
        &self,
        key: &DataEncryptionKey,
        encrypted: &EncryptedField,
        tenant_id: &str,
    ) -> Result<String, CryptoError> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }

        let nonce_bytes = STANDARD
            .decode(encrypted.iv())
            .map_err(|_| CryptoError::Decryption("IV is not valid base64".into()))?;
        let nonce_arr: [u8; AES_GCM_NONCE_SIZE] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Decryption("IV has wrong length".into()))?;

        let mut in_out = STANDARD
            .decode(encrypted.ciphertext())
            .map_err(|_| CryptoError::Decryption("ciphertext is not valid base64".into()))?;
        if in_out.len() < AES_GCM_TAG_SIZE {
            return Err(CryptoError::Decryption("ciphertext too short".into()));
        }

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, key.key())
            .map_err(|_| CryptoError::Decryption("AES-GCM key setup failed".into()))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce(Some(nonce_arr)));

        let plaintext = opening_key
            .open_in_place(Aad::from(tenant_id.as_bytes()), &mut in_out)
            .map_err(|_| CryptoError::Decryption("AES-GCM open failed".into()))?;
        let result = String::from_utf8(plaintext.to_vec())
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".into()));
        in_out.zeroize();
        result
    }

    /// Encrypts one value for a tenant, provisioning the tenant's key on
    /// first use. Empty input returns the empty value without touching keys.
    pub async fn encrypt_field(
        &self,
        plaintext: &str,
        tenant_id: &str,
        keys: &KeyManager,
    ) -> Result<EncryptedField, CryptoError> {
        if plaintext.is_empty() {
            return Ok(EncryptedField::empty());
        }
        let key = keys.key_for_encrypt(tenant_id).await?;
        self.seal(&key, plaintext, tenant_id)
    }

    /// Decrypts one value for a tenant. The tenant's key must already exist;
    /// it is never generated here.
    pub async fn decrypt_field(
        &self,
        encrypted: &EncryptedField,
        tenant_id: &str,
        keys: &KeyManager,
    ) -> Result<String, CryptoError> {
        if encrypted.is_empty() {
            return Ok(String::new());
        }
        let key = keys.key_for_decrypt(tenant_id).await?;
        self.open(&key, encrypted, tenant_id)
    }

    /// Returns true if `value` has the encrypted shape with both components
    /// present.
    pub fn is_field_encrypted(value: &FieldValue) -> bool {
        matches!(value, FieldValue::Encrypted(e) if !e.is_empty())
    }

    /// Encrypts the named fields of `record` that hold plain strings.
    ///
    /// Other fields and values that are already encrypted or not strings
    /// are copied unchanged. Stops at the first failure, naming the field;
    /// no partially encrypted record is returned.
    pub async fn encrypt_fields<S: AsRef<str>>(
        &self,
        record: &Record,
        fields: &[S],
        tenant_id: &str,
        keys: &KeyManager,
    ) -> Result<Record, FieldError> {
        let mut out = record.clone();
        for field in fields {
            let field = field.as_ref();
            let Some(FieldValue::Plain(plaintext)) = record.get(field) else {
                continue;
            };
            let encrypted = self
                .encrypt_field(plaintext, tenant_id, keys)
                .await
                .map_err(|e| FieldError::new(field, e))?;
            out.insert(field.to_string(), FieldValue::Encrypted(encrypted));
        }
        Ok(out)
    }

    /// Decrypts the named fields of `record` that hold encrypted values.
    ///
    /// Each field is handled on its own. A field whose ciphertext fails to
    /// decrypt is handled per `policy`. Failures to obtain the tenant key
    /// are returned as errors under either policy.
    pub async fn decrypt_fields<S: AsRef<str>>(
        &self,
        record: &Record,
        fields: &[S],
        tenant_id: &str,
        keys: &KeyManager,
        policy: DecryptPolicy,
    ) -> Result<DecryptedRecord, FieldError> {
        let mut out = record.clone();
        let mut failures = Vec::new();

        for field in fields {
            let field = field.as_ref();
            let Some(FieldValue::Encrypted(encrypted)) = record.get(field) else {
                continue;
            };
            match self.decrypt_field(encrypted, tenant_id, keys).await {
                Ok(plaintext) => {
                    out.insert(field.to_string(), FieldValue::Plain(plaintext));
                }
                Err(e) if policy == DecryptPolicy::NullOnError && !e.is_key_failure() => {
                    warn!(field, error = %e, "Field failed to decrypt; returning null");
                    out.insert(field.to_string(), FieldValue::null());
                    failures.push(FieldError::new(field, e));
                }
                Err(e) => return Err(FieldError::new(field, e)),
            }
        }

        Ok(DecryptedRecord {
            record: out,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::keys::testing::CountingProvider;
    use crate::kms::{KeyProvider, AES_256_KEY_SIZE};

    fn test_key(tenant: &str) -> DataEncryptionKey {
        let mut key = [0u8; AES_256_KEY_SIZE];
        SystemRandom::new().fill(&mut key).unwrap();
        DataEncryptionKey::new(key, tenant.to_string())
    }

    fn manager() -> (Arc<CountingProvider>, KeyManager) {
        let provider = Arc::new(CountingProvider::new());
        let manager = KeyManager::new(Arc::clone(&provider) as Arc<dyn KeyProvider>);
        (provider, manager)
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_seal_open() {
        let cipher = FieldCipher::new();
        let key = test_key("t1");

        let encrypted = cipher.seal(&key, "+1-555-123-4567", "t1").unwrap();
        assert_ne!(encrypted.ciphertext(), "+1-555-123-4567");
        assert_eq!(STANDARD.decode(encrypted.iv()).unwrap().len(), AES_GCM_NONCE_SIZE);

        let decrypted = cipher.open(&key, &encrypted, "t1").unwrap();
        assert_eq!(decrypted, "+1-555-123-4567");
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let cipher = FieldCipher::new();
        let key = test_key("t1");

        let a = cipher.seal(&key, "alice@example.com", "t1").unwrap();
        let b = cipher.seal(&key, "alice@example.com", "t1").unwrap();
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn test_wrong_tenant_aad_fails() {
        let cipher = FieldCipher::new();
        let key = test_key("t1");

        let encrypted = cipher.seal(&key, "secret", "t1").unwrap();
        let result = cipher.open(&key, &encrypted, "t2");
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = FieldCipher::new();
        let encrypted = cipher.seal(&test_key("t1"), "secret", "t1").unwrap();

        let result = cipher.open(&test_key("t1"), &encrypted, "t1");
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = FieldCipher::new();
        let key = test_key("t1");
        let encrypted = cipher.seal(&key, "secret", "t1").unwrap();

        let mut bytes = STANDARD.decode(encrypted.ciphertext()).unwrap();
        bytes[0] ^= 0x01;
        let tampered = EncryptedField::from_parts(STANDARD.encode(&bytes), encrypted.iv());
        assert!(matches!(
            cipher.open(&key, &tampered, "t1"),
            Err(CryptoError::Decryption(_))
        ));

        bytes.truncate(bytes.len() - 1);
        let truncated = EncryptedField::from_parts(STANDARD.encode(&bytes), encrypted.iv());
        assert!(matches!(
            cipher.open(&key, &truncated, "t1"),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_malformed_components_fail() {
        let cipher = FieldCipher::new();
        let key = test_key("t1");
        let encrypted = cipher.seal(&key, "secret", "t1").unwrap();

        let cases = [
            EncryptedField::from_parts("not base64!", encrypted.iv()),
            EncryptedField::from_parts(encrypted.ciphertext(), "not base64!"),
            EncryptedField::from_parts(encrypted.ciphertext(), STANDARD.encode([0u8; 8])),
            EncryptedField::from_parts(STANDARD.encode([0u8; 4]), encrypted.iv()),
        ];
        for case in &cases {
            assert!(
                matches!(cipher.open(&key, case, "t1"), Err(CryptoError::Decryption(_))),
                "expected decryption failure for {:?}",
                case
            );
        }
    }

    #[tokio::test]
    async fn test_either_component_empty_is_no_value() {
        let (provider, keys) = manager();
        let cipher = FieldCipher::new();
        let encrypted = cipher.encrypt_field("secret", "t1", &keys).await.unwrap();
        keys.clear_cache();

        let missing_iv = EncryptedField::from_parts(encrypted.ciphertext(), "");
        let missing_ct = EncryptedField::from_parts("", encrypted.iv());
        for case in [missing_iv, missing_ct] {
            assert_eq!(cipher.decrypt_field(&case, "t1", &keys).await.unwrap(), "");
            assert_eq!(cipher.open(&test_key("t1"), &case, "t1").unwrap(), "");
            assert!(!FieldCipher::is_field_encrypted(&FieldValue::Encrypted(case)));
        }
        assert_eq!(provider.unwraps(), 0);
    }

    #[tokio::test]
    async fn test_old_values_readable_after_clear_cache_and_new_write() {
        let (provider, keys) = manager();
        let cipher = FieldCipher::new();

        let old = cipher.encrypt_field("+1-555-123-4567", "t1", &keys).await.unwrap();
        keys.clear_cache();
        let new = cipher.encrypt_field("other", "t1", &keys).await.unwrap();

        assert_eq!(cipher.decrypt_field(&old, "t1", &keys).await.unwrap(), "+1-555-123-4567");
        assert_eq!(cipher.decrypt_field(&new, "t1", &keys).await.unwrap(), "other");
        assert_eq!(provider.wraps(), 1);
    }

    #[tokio::test]
    async fn test_empty_value_is_identity_without_key_lookup() {
        let (provider, keys) = manager();
        let cipher = FieldCipher::new();

        let encrypted = cipher.encrypt_field("", "t1", &keys).await.unwrap();
        assert_eq!(encrypted, EncryptedField::empty());
        assert_eq!(encrypted.ciphertext(), "");
        assert_eq!(encrypted.iv(), "");

        let decrypted = cipher.decrypt_field(&encrypted, "t1", &keys).await.unwrap();
        assert_eq!(decrypted, "");

        assert_eq!(provider.calls(), 0);
        assert!(keys.get_cached_key("t1").is_none());
    }

    #[tokio::test]
    async fn test_encrypt_field_provisions_key_lazily() {
        let (provider, keys) = manager();
        let cipher = FieldCipher::new();

        let encrypted = cipher.encrypt_field("555", "t1", &keys).await.unwrap();
        assert!(keys.get_cached_key("t1").is_some());
        assert_eq!(provider.wraps(), 1);

        let decrypted = cipher.decrypt_field(&encrypted, "t1", &keys).await.unwrap();
        assert_eq!(decrypted, "555");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_decrypt_field_without_key_is_not_found() {
        let (provider, keys) = manager();
        let cipher = FieldCipher::new();
        let foreign = cipher.seal(&test_key("t1"), "secret", "t1").unwrap();

        let result = cipher.decrypt_field(&foreign, "t1", &keys).await;
        assert!(matches!(result, Err(CryptoError::KeyNotFound(_))));
        assert_eq!(provider.wraps(), 0);
    }

    #[tokio::test]
    async fn test_cross_tenant_decrypt_fails() {
        let (_, keys) = manager();
        let cipher = FieldCipher::new();

        let encrypted = cipher.encrypt_field("+1-555-123-4567", "tenant-a", &keys).await.unwrap();
        cipher.encrypt_field("anything", "tenant-b", &keys).await.unwrap();

        let result = cipher.decrypt_field(&encrypted, "tenant-b", &keys).await;
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_is_field_encrypted() {
        let cipher = FieldCipher::new();
        let encrypted = cipher.seal(&test_key("t1"), "x", "t1").unwrap();

        assert!(FieldCipher::is_field_encrypted(&FieldValue::Encrypted(encrypted)));
        assert!(!FieldCipher::is_field_encrypted(&FieldValue::from("555")));
        assert!(!FieldCipher::is_field_encrypted(&FieldValue::null()));
        assert!(!FieldCipher::is_field_encrypted(&FieldValue::Encrypted(EncryptedField::empty())));
    }

    #[tokio::test]
    async fn test_encrypt_fields_only_named() {
        let (_, keys) = manager();
        let cipher = FieldCipher::new();
        let input = record(&[("phone", "555"), ("note", "x")]);

        let out = cipher
            .encrypt_fields(&input, &["phone"], "t1", &keys)
            .await
            .unwrap();

        assert!(out["phone"].is_encrypted());
        assert_eq!(out["note"], FieldValue::from("x"));
        assert_eq!(input["phone"], FieldValue::from("555"));
    }

    #[tokio::test]
    async fn test_encrypt_fields_reports_failing_field() {
        let provider = Arc::new(CountingProvider::new().failing());
        let keys = KeyManager::new(provider as Arc<dyn KeyProvider>);
        let cipher = FieldCipher::new();
        let input = record(&[("note", "x"), ("phone", "555")]);

        let err = cipher
            .encrypt_fields(&input, &["phone"], "t1", &keys)
            .await
            .unwrap_err();
        assert_eq!(err.field, "phone");
        assert!(matches!(err.source, CryptoError::KeyProvider(_)));
    }

    #[tokio::test]
    async fn test_decrypt_fields_policies() {
        let (_, keys) = manager();
        let cipher = FieldCipher::new();
        let input = record(&[("phone", "555"), ("email", "a@b.c")]);
        let mut encrypted = cipher
            .encrypt_fields(&input, &["phone", "email"], "t1", &keys)
            .await
            .unwrap();
        encrypted.insert(
            "email".into(),
            EncryptedField::from_parts(STANDARD.encode([0u8; 32]), STANDARD.encode([0u8; 12]))
                .into(),
        );

        let err = cipher
            .decrypt_fields(&encrypted, &["phone", "email"], "t1", &keys, DecryptPolicy::FailRecord)
            .await
            .unwrap_err();
        assert_eq!(err.field, "email");

        let out = cipher
            .decrypt_fields(&encrypted, &["phone", "email"], "t1", &keys, DecryptPolicy::NullOnError)
            .await
            .unwrap();
        assert_eq!(out.record["phone"], FieldValue::from("555"));
        assert_eq!(out.record["email"], FieldValue::null());
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].field, "email");
        assert!(!out.is_complete());
    }

    #[tokio::test]
    async fn test_null_on_error_still_fails_on_missing_key() {
        let (_, keys) = manager();
        let cipher = FieldCipher::new();
        let mut input = Record::new();
        input.insert(
            "phone".into(),
            cipher.seal(&test_key("t9"), "555", "t9").unwrap().into(),
        );

        let err = cipher
            .decrypt_fields(&input, &["phone"], "t9", &keys, DecryptPolicy::NullOnError)
            .await
            .unwrap_err();
        assert!(matches!(err.source, CryptoError::KeyNotFound(_)));
    }

    proptest! {
        #[test]
        fn round_trip_any_string(plaintext in ".{1,256}", tenant in "[a-z0-9-]{1,36}") {
            let cipher = FieldCipher::new();
            let key = test_key(&tenant);
            let encrypted = cipher.seal(&key, &plaintext, &tenant).unwrap();
            prop_assert_eq!(cipher.open(&key, &encrypted, &tenant).unwrap(), plaintext);
        }

        #[test]
        fn other_tenant_never_decrypts(
            plaintext in ".{1,64}",
            t1 in "[a-z]{1,12}",
            t2 in "[a-z]{1,12}"
        ) {
            prop_assume!(t1 != t2);
            let cipher = FieldCipher::new();
            let key = test_key(&t1);
            let encrypted = cipher.seal(&key, &plaintext, &t1).unwrap();
            let result = cipher.open(&key, &encrypted, &t2);
            prop_assert!(matches!(result, Err(CryptoError::Decryption(_))));
        }
    }
}
