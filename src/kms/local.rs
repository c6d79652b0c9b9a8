// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-process key provider for development and single-node use.
//!
//! Two modes are available:
//!
//! - [`LocalKeyProvider::insecure`]: the "wrapped" key is the raw key
//!   itself. Anyone holding the persisted blob holds the key. Development
//!   only.
//! - [`LocalKeyProvider::with_master_key`]: DEKs are wrapped with
//!   AES-256-GCM under an in-memory master key, using the tenant id as
//!   associated data.

use async_trait::async_trait;
use ring::aead::{self, Aad, BoundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::key::{
    DataEncryptionKey, SingleNonce, WrappedKey, AES_256_KEY_SIZE, AES_GCM_NONCE_SIZE,
    AES_GCM_TAG_SIZE,
};
use super::provider::{KeyProvider, ProviderKind};
use crate::error::CryptoError;

/// KEK id recorded on keys produced by the insecure mode.
pub const INSECURE_KEK_ID: &str = "local-insecure";

#[derive(Zeroize, ZeroizeOnDrop)]
#[allow(unused_assignments)]
struct MasterKey {
    key: [u8; AES_256_KEY_SIZE],
    #[zeroize(skip)]
    id: String,
}

/// Local key provider.
pub struct LocalKeyProvider {
    master_key: Option<MasterKey>,
    rng: SystemRandom,
}

impl LocalKeyProvider {
    /// Creates a provider whose wrapped form is the raw key.
    ///
    /// This offers no protection at rest. Do not use in production.
    pub fn insecure() -> Self {
        warn!("local key provider running without a master key; wrapped keys are NOT protected");
        Self {
            master_key: None,
            rng: SystemRandom::new(),
        }
    }

    /// Creates a provider that wraps DEKs under the given master key.
    pub fn with_master_key(master_key: [u8; AES_256_KEY_SIZE], kek_id: String) -> Self {
        Self {
            master_key: Some(MasterKey {
                key: master_key,
                id: kek_id,
            }),
            rng: SystemRandom::new(),
        }
    }

    /// Creates a provider with a random master key.
    ///
    /// Keys wrapped by it cannot be recovered once the process exits.
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let mut key = [0u8; AES_256_KEY_SIZE];
        rng.fill(&mut key)
            .map_err(|_| CryptoError::KeyGeneration("failed to generate master key".into()))?;

        let id = format!("local-{}", uuid::Uuid::new_v4());
        let provider = Self::with_master_key(key, id);
        key.zeroize();
        Ok(provider)
    }

    /// Creates a provider from a hex-encoded 256-bit master key.
    pub fn from_hex(hex_key: &str, kek_id: String) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidConfig(format!("master key is not hex: {}", e)))?;
        if bytes.len() != AES_256_KEY_SIZE {
            let got = bytes.len();
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got,
            });
        }

        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        let provider = Self::with_master_key(key, kek_id);
        key.zeroize();
        Ok(provider)
    }

    /// Returns true when wrapped keys are protected by a master key.
    pub fn is_protected(&self) -> bool {
        self.master_key.is_some()
    }

    fn random_key(&self) -> Result<[u8; AES_256_KEY_SIZE], CryptoError> {
        let mut key = [0u8; AES_256_KEY_SIZE];
        self.rng
            .fill(&mut key)
            .map_err(|_| CryptoError::KeyGeneration("entropy source failed".into()))?;
        Ok(key)
    }

    /// Wraps key bytes: nonce || ciphertext || tag.
    fn seal(
        &self,
        master: &MasterKey,
        tenant_id: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::KeyGeneration("failed to generate nonce".into()))?;

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, &master.key)
            .map_err(|_| CryptoError::Encryption("invalid master key".into()))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce(Some(nonce_bytes)));

        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(tenant_id.as_bytes()), &mut in_out)
            .map_err(|_| CryptoError::Encryption("AES-GCM seal failed".into()))?;

        let mut result = Vec::with_capacity(AES_GCM_NONCE_SIZE + in_out.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&in_out);
        in_out.zeroize();
        Ok(result)
    }

    fn open(
        &self,
        master: &MasterKey,
        tenant_id: &str,
        wrapped: &[u8],
    ) -> Result<DataEncryptionKey, CryptoError> {
        if wrapped.len() != AES_GCM_NONCE_SIZE + AES_256_KEY_SIZE + AES_GCM_TAG_SIZE {
            return Err(CryptoError::KeyProvider(
                "wrapped key has unexpected length".into(),
            ));
        }

        let (nonce_bytes, encrypted) = wrapped.split_at(AES_GCM_NONCE_SIZE);
        let mut nonce_arr = [0u8; AES_GCM_NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce_bytes);

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, &master.key)
            .map_err(|_| CryptoError::KeyProvider("invalid master key".into()))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce(Some(nonce_arr)));

        let mut in_out = encrypted.to_vec();
        let result = opening_key
            .open_in_place(Aad::from(tenant_id.as_bytes()), &mut in_out)
            .map_err(|_| {
                CryptoError::KeyProvider("wrapped key failed authentication".into())
            })
            .and_then(|plaintext| DataEncryptionKey::from_slice(plaintext, tenant_id.to_string()));
        in_out.zeroize();
        result
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    async fn wrap(&self, tenant_id: &str) -> Result<(WrappedKey, DataEncryptionKey), CryptoError> {
        let mut key = self.random_key()?;
        let wrapped = match &self.master_key {
            Some(master) => WrappedKey::new(self.seal(master, tenant_id, &key)?, master.id.clone()),
            None => WrappedKey::new(key.to_vec(), INSECURE_KEK_ID.to_string()),
        };
        let dek = DataEncryptionKey::new(key, tenant_id.to_string());
        key.zeroize();
        Ok((wrapped, dek))
    }

    async fn unwrap(
        &self,
        tenant_id: &str,
        wrapped: &WrappedKey,
    ) -> Result<DataEncryptionKey, CryptoError> {
        match &self.master_key {
            Some(master) => {
                if wrapped.kek_id() != master.id {
                    return Err(CryptoError::KeyProvider(format!(
                        "wrapped under KEK {}, active KEK is {}",
                        wrapped.kek_id(),
                        master.id
                    )));
                }
                self.open(master, tenant_id, wrapped.ciphertext())
            }
            None => {
                if wrapped.kek_id() != INSECURE_KEK_ID {
                    return Err(CryptoError::KeyProvider(format!(
                        "wrapped under KEK {}, provider has no master key",
                        wrapped.kek_id()
                    )));
                }
                DataEncryptionKey::from_slice(wrapped.ciphertext(), tenant_id.to_string())
                    .map_err(|_| CryptoError::KeyProvider("wrapped key has unexpected length".into()))
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn kek_id(&self) -> &str {
        match &self.master_key {
            Some(master) => &master.id,
            None => INSECURE_KEK_ID,
        }
    }
}
