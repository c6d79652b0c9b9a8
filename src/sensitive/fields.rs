// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The process-wide set of field names treated as sensitive.

use std::collections::BTreeSet;

/// Field names encrypted when no override is configured.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "phone",
    "mobile_phone",
    "personal_email",
    "home_address",
    "date_of_birth",
    "emergency_contact_name",
    "emergency_contact_phone",
];

/// A fixed set of sensitive field names.
///
/// Built once at startup and shared read-only. Not tenant-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveFieldSet {
    names: BTreeSet<String>,
}

impl Default for SensitiveFieldSet {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS.iter().copied())
    }
}

impl SensitiveFieldSet {
    /// Builds a set from field names. Names are trimmed; blanks are ignored.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.names.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
