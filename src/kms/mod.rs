// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Key providers for per-tenant data encryption keys.
//!
//! # Key Hierarchy
//!
//! - **KEK (Key Encryption Key)**: master key held by the provider (AWS KMS
//!   or a local master key), used to wrap DEKs
//! - **DEK (Data Encryption Key)**: one 256-bit key per tenant, used to
//!   encrypt that tenant's sensitive fields
//!
//! Only the wrapped DEK is persisted. Unwrapped DEKs live in memory and are
//! zeroized on drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use tenantcrypt::kms::{KeyProvider, LocalKeyProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = LocalKeyProvider::generate().expect("failed to create provider");
//!
//!     // Generate a tenant DEK and its wrapped form
//!     let (wrapped, dek) = provider.wrap("tenant-42").await.expect("wrap failed");
//!
//!     // Later, recover the DEK from the persisted wrapped form
//!     let unwrapped = provider.unwrap("tenant-42", &wrapped).await.expect("unwrap failed");
//!     assert_eq!(dek.key(), unwrapped.key());
//! }
//! ```

#[cfg(feature = "aws-kms")]
mod aws;
mod key;
mod local;
mod provider;

#[cfg(feature = "aws-kms")]
pub use aws::AwsKmsProvider;
pub(crate) use key::SingleNonce;
pub use key::{
    DataEncryptionKey, TenantKeyRecord, WrappedKey, AES_256_KEY_SIZE, AES_GCM_NONCE_SIZE,
    AES_GCM_TAG_SIZE,
};
pub use local::{LocalKeyProvider, INSECURE_KEK_ID};
pub use provider::{KeyProvider, ProviderKind};
