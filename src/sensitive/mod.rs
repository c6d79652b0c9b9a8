// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Sensitive-field handling for whole records.

mod fields;
mod orchestrator;

pub use fields::{SensitiveFieldSet, DEFAULT_SENSITIVE_FIELDS};
pub use orchestrator::SensitiveFieldOrchestrator;
