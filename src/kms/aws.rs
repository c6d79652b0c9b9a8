// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! AWS KMS key provider.
//!
//! Data keys are produced with `GenerateDataKey` and recovered with
//! `Decrypt`. The master key never leaves AWS KMS. Every call carries a
//! `tenant_id` encryption context, so KMS refuses to unwrap a data key on
//! behalf of a tenant other than the one it was generated for.

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use aws_sdk_kms::Client as KmsClient;
use tracing::{info, instrument, warn};
use zeroize::Zeroize;

use super::key::{DataEncryptionKey, WrappedKey};
use super::provider::{KeyProvider, ProviderKind};
use crate::error::CryptoError;

/// Encryption context key bound to every data key.
const TENANT_CONTEXT_KEY: &str = "tenant_id";

/// AWS KMS-backed key provider.
pub struct AwsKmsProvider {
    client: KmsClient,
    key_id: String,
}

impl AwsKmsProvider {
    /// Connects to AWS KMS and verifies access to the master key.
    ///
    /// # Arguments
    /// * `key_id` - ARN, key id or alias of the KMS key used as KEK
    /// * `region` - Region override; the default provider chain is used when `None`
    /// * `endpoint` - Endpoint override, e.g. for LocalStack
    pub async fn connect(
        key_id: String,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self, CryptoError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let client = KmsClient::new(&config);

        client
            .describe_key()
            .key_id(&key_id)
            .send()
            .await
            .map_err(|e| CryptoError::KeyProvider(format!("AWS KMS key {}: {}", key_id, e)))?;

        info!(key_id = %key_id, "Connected to AWS KMS");

        Ok(Self { client, key_id })
    }

    /// Creates from an existing AWS SDK config without verifying the key.
    pub fn from_config(config: &aws_config::SdkConfig, key_id: String) -> Self {
        Self {
            client: KmsClient::new(config),
            key_id,
        }
    }
}

/// Copies the KMS plaintext into a DEK and zeroizes the response buffer.
fn dek_from_plaintext(plaintext: Blob, tenant_id: &str) -> Result<DataEncryptionKey, CryptoError> {
    let mut bytes = plaintext.into_inner();
    let dek = DataEncryptionKey::from_slice(&bytes, tenant_id.to_string())
        .map_err(|e| CryptoError::KeyProvider(format!("malformed data key: {}", e)));
    bytes.zeroize();
    dek
}

#[async_trait]
impl KeyProvider for AwsKmsProvider {
    #[instrument(skip(self), fields(kms = "aws"))]
    async fn wrap(&self, tenant_id: &str) -> Result<(WrappedKey, DataEncryptionKey), CryptoError> {
        let mut output = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .key_spec(DataKeySpec::Aes256)
            .encryption_context(TENANT_CONTEXT_KEY, tenant_id)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "AWS KMS GenerateDataKey failed");
                CryptoError::KeyProvider(format!("AWS KMS GenerateDataKey: {}", e))
            })?;

        let plaintext = output
            .plaintext
            .take()
            .ok_or_else(|| CryptoError::KeyProvider("no plaintext from KMS".into()))?;
        let dek = dek_from_plaintext(plaintext, tenant_id)?;

        let ciphertext = output
            .ciphertext_blob()
            .ok_or_else(|| CryptoError::KeyProvider("no ciphertext from KMS".into()))?
            .as_ref()
            .to_vec();

        info!(ciphertext_len = ciphertext.len(), "Generated data key with AWS KMS");

        Ok((WrappedKey::new(ciphertext, self.key_id.clone()), dek))
    }

    #[instrument(skip(self, wrapped), fields(kms = "aws"))]
    async fn unwrap(
        &self,
        tenant_id: &str,
        wrapped: &WrappedKey,
    ) -> Result<DataEncryptionKey, CryptoError> {
        let mut output = self
            .client
            .decrypt()
            .key_id(wrapped.kek_id())
            .ciphertext_blob(Blob::new(wrapped.ciphertext().to_vec()))
            .encryption_context(TENANT_CONTEXT_KEY, tenant_id)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "AWS KMS Decrypt failed");
                CryptoError::KeyProvider(format!("AWS KMS Decrypt: {}", e))
            })?;

        let plaintext = output
            .plaintext
            .take()
            .ok_or_else(|| CryptoError::KeyProvider("no plaintext from KMS".into()))?;

        let dek = dek_from_plaintext(plaintext, tenant_id)?;

        info!("Unwrapped data key with AWS KMS");

        Ok(dek)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    fn kek_id(&self) -> &str {
        &self.key_id
    }
}
