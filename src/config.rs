// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration and construction of the encryption stack.
//!
//! ```rust,no_run
//! use tenantcrypt::config::{build_orchestrator, EncryptionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EncryptionConfig::from_env().expect("invalid configuration");
//!     let orchestrator = build_orchestrator(&config, None)
//!         .await
//!         .expect("failed to build encryption stack");
//!     # let _ = orchestrator;
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::CryptoError;
use crate::field::DecryptPolicy;
use crate::keys::{KeyManager, TenantKeyStore, DEFAULT_PROVIDER_TIMEOUT};
use crate::kms::{KeyProvider, LocalKeyProvider};
use crate::sensitive::{SensitiveFieldOrchestrator, SensitiveFieldSet};

const ENV_PROVIDER: &str = "TENANTCRYPT_PROVIDER";
const ENV_KMS_KEY_ID: &str = "TENANTCRYPT_KMS_KEY_ID";
const ENV_KMS_REGION: &str = "TENANTCRYPT_KMS_REGION";
const ENV_KMS_ENDPOINT: &str = "TENANTCRYPT_KMS_ENDPOINT";
const ENV_LOCAL_MASTER_KEY: &str = "TENANTCRYPT_LOCAL_MASTER_KEY";
const ENV_LOCAL_KEK_ID: &str = "TENANTCRYPT_LOCAL_KEK_ID";
const ENV_PROVIDER_TIMEOUT_MS: &str = "TENANTCRYPT_PROVIDER_TIMEOUT_MS";
const ENV_SENSITIVE_FIELDS: &str = "TENANTCRYPT_SENSITIVE_FIELDS";
const ENV_DECRYPT_POLICY: &str = "TENANTCRYPT_DECRYPT_POLICY";

/// KEK id used for a local master key when none is configured.
pub const DEFAULT_LOCAL_KEK_ID: &str = "local-master";

/// Which key backend to use.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// In-process keys. Without a master key the wrapped form is the raw
    /// key and offers no protection.
    Local {
        #[serde(default)]
        master_key_hex: Option<String>,
        #[serde(default)]
        kek_id: Option<String>,
    },
    /// AWS KMS. Credentials come from the default AWS provider chain.
    Cloud {
        key_id: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Local {
                master_key_hex,
                kek_id,
            } => f
                .debug_struct("Local")
                .field(
                    "master_key_hex",
                    &master_key_hex.as_ref().map(|_| "[REDACTED]"),
                )
                .field("kek_id", kek_id)
                .finish(),
            ProviderConfig::Cloud {
                key_id,
                region,
                endpoint,
            } => f
                .debug_struct("Cloud")
                .field("key_id", key_id)
                .field("region", region)
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

/// Configuration for the encryption stack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EncryptionConfig {
    #[serde(flatten)]
    pub provider: ProviderConfig,
    /// Deadline for each key provider call, in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Overrides the default sensitive field names.
    #[serde(default)]
    pub sensitive_fields: Option<Vec<String>>,
    #[serde(default)]
    pub decrypt_policy: DecryptPolicy,
}

fn default_provider_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT.as_millis() as u64
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self::local_insecure()
    }
}

impl EncryptionConfig {
    /// Local provider without a master key. Development only.
    pub fn local_insecure() -> Self {
        Self::with_provider(ProviderConfig::Local {
            master_key_hex: None,
            kek_id: None,
        })
    }

    /// AWS KMS provider using the given key.
    pub fn cloud(key_id: impl Into<String>) -> Self {
        Self::with_provider(ProviderConfig::Cloud {
            key_id: key_id.into(),
            region: None,
            endpoint: None,
        })
    }

    fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            provider,
            provider_timeout_ms: default_provider_timeout_ms(),
            sensitive_fields: None,
            decrypt_policy: DecryptPolicy::default(),
        }
    }

    /// Sets the provider call deadline.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Overrides the sensitive field names.
    pub fn with_sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_decrypt_policy(mut self, policy: DecryptPolicy) -> Self {
        self.decrypt_policy = policy;
        self
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn sensitive_field_set(&self) -> SensitiveFieldSet {
        match &self.sensitive_fields {
            Some(fields) => SensitiveFieldSet::new(fields),
            None => SensitiveFieldSet::default(),
        }
    }

    /// Reads configuration from `TENANTCRYPT_*` environment variables.
    pub fn from_env() -> Result<Self, CryptoError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CryptoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match var(ENV_PROVIDER).as_deref().map(str::trim) {
            None | Some("local") => ProviderConfig::Local {
                master_key_hex: var(ENV_LOCAL_MASTER_KEY),
                kek_id: var(ENV_LOCAL_KEK_ID),
            },
            Some("cloud") => ProviderConfig::Cloud {
                key_id: var(ENV_KMS_KEY_ID).ok_or_else(|| {
                    CryptoError::InvalidConfig(format!(
                        "{} is required for the cloud provider",
                        ENV_KMS_KEY_ID
                    ))
                })?,
                region: var(ENV_KMS_REGION),
                endpoint: var(ENV_KMS_ENDPOINT),
            },
            Some(other) => {
                return Err(CryptoError::InvalidConfig(format!(
                    "unknown provider {:?}, expected \"cloud\" or \"local\"",
                    other
                )))
            }
        };

        let mut config = Self::with_provider(provider);

        if let Some(ms) = var(ENV_PROVIDER_TIMEOUT_MS) {
            config.provider_timeout_ms = ms.trim().parse().map_err(|_| {
                CryptoError::InvalidConfig(format!("{} must be an integer", ENV_PROVIDER_TIMEOUT_MS))
            })?;
        }

        if let Some(fields) = var(ENV_SENSITIVE_FIELDS) {
            config.sensitive_fields = Some(fields.split(',').map(|f| f.trim().to_string()).collect());
        }

        if let Some(policy) = var(ENV_DECRYPT_POLICY) {
            config.decrypt_policy = match policy.trim() {
                "fail_record" => DecryptPolicy::FailRecord,
                "null_on_error" => DecryptPolicy::NullOnError,
                other => {
                    return Err(CryptoError::InvalidConfig(format!(
                        "unknown decrypt policy {:?}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.provider_timeout_ms == 0 {
            return Err(CryptoError::InvalidConfig(
                "provider timeout must be greater than zero".into(),
            ));
        }
        if let ProviderConfig::Cloud { key_id, .. } = &self.provider {
            if key_id.trim().is_empty() {
                return Err(CryptoError::InvalidConfig("KMS key id is empty".into()));
            }
        }
        if self.sensitive_field_set().is_empty() {
            return Err(CryptoError::InvalidConfig(
                "sensitive field list is empty".into(),
            ));
        }
        Ok(())
    }
}

/// Creates the key provider described by `config`.
pub async fn build_provider(config: &EncryptionConfig) -> Result<Arc<dyn KeyProvider>, CryptoError> {
    match &config.provider {
        ProviderConfig::Local {
            master_key_hex: Some(hex_key),
            kek_id,
        } => {
            let kek_id = kek_id.clone().unwrap_or_else(|| DEFAULT_LOCAL_KEK_ID.to_string());
            info!(kek_id = %kek_id, "Using local key provider with master key");
            Ok(Arc::new(LocalKeyProvider::from_hex(hex_key, kek_id)?))
        }
        ProviderConfig::Local {
            master_key_hex: None,
            ..
        } => Ok(Arc::new(LocalKeyProvider::insecure())),
        #[cfg(feature = "aws-kms")]
        ProviderConfig::Cloud {
            key_id,
            region,
            endpoint,
        } => {
            let provider =
                crate::kms::AwsKmsProvider::connect(key_id.clone(), region.clone(), endpoint.clone())
                    .await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "aws-kms"))]
        ProviderConfig::Cloud { .. } => Err(CryptoError::InvalidConfig(
            "cloud provider requires the `aws-kms` feature".into(),
        )),
    }
}

/// Creates the full stack: provider, key manager and orchestrator.
///
/// `store` persists wrapped keys so tenants keep their key across restarts.
pub async fn build_orchestrator(
    config: &EncryptionConfig,
    store: Option<Arc<dyn TenantKeyStore>>,
) -> Result<SensitiveFieldOrchestrator, CryptoError> {
    config.validate()?;

    let provider = build_provider(config).await?;
    let mut keys = KeyManager::new(provider).with_provider_timeout(config.provider_timeout());
    if let Some(store) = store {
        keys = keys.with_key_store(store);
    }

    Ok(SensitiveFieldOrchestrator::new(Arc::new(keys))
        .with_sensitive_fields(config.sensitive_field_set())
        .with_decrypt_policy(config.decrypt_policy))
}
