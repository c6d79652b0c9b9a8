// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! At-rest field representations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A record passed between the persistence layer and the cipher: field
/// name to value.
pub type Record = BTreeMap<String, FieldValue>;

/// One encrypted string value as persisted.
///
/// Serializes to exactly `{"ciphertext": "...", "iv": "..."}`, both
/// standard base64. `ciphertext` carries the AES-GCM tag at its end. A
/// value with either component empty means "no value".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedField {
    ciphertext: String,
    iv: String,
}

impl EncryptedField {
    /// Restores a value from its two persisted components.
    pub fn from_parts(ciphertext: impl Into<String>, iv: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            iv: iv.into(),
        }
    }

    /// The encryption of the empty string.
    pub fn empty() -> Self {
        Self {
            ciphertext: String::new(),
            iv: String::new(),
        }
    }

    /// Returns true if this value stands for "no value".
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty() || self.iv.is_empty()
    }

    #[inline]
    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    #[inline]
    pub fn iv(&self) -> &str {
        &self.iv
    }
}

/// A field value as stored in a [`Record`].
///
/// Deserializing tries the variants in order: an object with exactly the
/// `ciphertext` and `iv` string keys is `Encrypted`, a JSON string is
/// `Plain`, and anything else is carried through as `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Encrypted(EncryptedField),
    Plain(String),
    Other(serde_json::Value),
}

impl FieldValue {
    /// A JSON null.
    pub fn null() -> Self {
        FieldValue::Other(serde_json::Value::Null)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, FieldValue::Encrypted(_))
    }

    pub fn as_plain(&self) -> Option<&str> {
        match self {
            FieldValue::Plain(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_encrypted(&self) -> Option<&EncryptedField> {
        match self {
            FieldValue::Encrypted(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Plain(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Plain(s)
    }
}

impl From<EncryptedField> for FieldValue {
    fn from(e: EncryptedField) -> Self {
        FieldValue::Encrypted(e)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => FieldValue::Plain(s),
            other => match serde_json::from_value::<EncryptedField>(other.clone()) {
                Ok(encrypted) => FieldValue::Encrypted(encrypted),
                Err(_) => FieldValue::Other(other),
            },
        }
    }
}
