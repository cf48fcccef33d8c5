/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Legacy-to-canonical service migration outcomes and instance resolution.

use serde_json::Value;

/// Result of one migration attempt for a legacy address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MigrationOutcome {
    /// Address was canonical or carried no legacy instance.
    NotApplicable,
    /// The bus returned no usable device instance; the legacy key stays authoritative.
    Unresolved,
    /// No legacy subscription was left to move.
    AlreadyMigrated { new_key: String },
    Migrated {
        old_key: String,
        new_key: String,
        moved: usize,
    },
}

/// Accepts non-negative integers, integral floats and all-digit strings.
pub(crate) fn resolve_device_instance(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|float| *float >= 0.0 && float.fract() == 0.0)
                    .map(|float| float as u64)
            })
            .and_then(|instance| u32::try_from(instance).ok()),
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse().ok()
        }
        _ => None,
    }
}
