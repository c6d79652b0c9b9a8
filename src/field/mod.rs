// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Field-level encryption under a tenant's data key.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tenantcrypt::field::FieldCipher;
//! use tenantcrypt::keys::KeyManager;
//! use tenantcrypt::kms::LocalKeyProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = LocalKeyProvider::generate().expect("failed to create provider");
//!     let keys = KeyManager::new(Arc::new(provider));
//!     let cipher = FieldCipher::new();
//!
//!     let stored = cipher
//!         .encrypt_field("+1-555-123-4567", "tenant-a", &keys)
//!         .await
//!         .expect("encrypt failed");
//!     let phone = cipher
//!         .decrypt_field(&stored, "tenant-a", &keys)
//!         .await
//!         .expect("decrypt failed");
//!     assert_eq!(phone, "+1-555-123-4567");
//! }
//! ```

mod cipher;
mod value;

pub use cipher::{DecryptPolicy, DecryptedRecord, FieldCipher};
pub use value::{EncryptedField, FieldValue, Record};
