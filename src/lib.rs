// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! tenantcrypt: per-tenant field-level encryption with envelope-wrapped data keys
//!
//! Each tenant gets its own AES-256 data encryption key, wrapped by a key
//! provider (AWS KMS or a local master key). Sensitive string fields are
//! encrypted with AES-256-GCM bound to the tenant id before they reach
//! storage and decrypted on the way back.

pub mod config;
pub mod error;
pub mod field;
pub mod keys;
pub mod kms;
pub mod sensitive;

pub use config::{build_orchestrator, build_provider, EncryptionConfig, ProviderConfig};
pub use error::{CryptoError, FieldError};
pub use field::{DecryptPolicy, DecryptedRecord, EncryptedField, FieldCipher, FieldValue, Record};
pub use keys::{InMemoryKeyStore, KeyCache, KeyManager, TenantKeyStore};
pub use kms::{DataEncryptionKey, KeyProvider, LocalKeyProvider, ProviderKind, WrappedKey};
pub use sensitive::{SensitiveFieldOrchestrator, SensitiveFieldSet};

#[cfg(feature = "aws-kms")]
pub use kms::AwsKmsProvider;
