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

//! Canonical structured field keys and value-format helpers.

use serde_json::Value;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const KEY: &str = "key";
pub const OLD_KEY: &str = "old_key";
pub const NEW_KEY: &str = "new_key";
pub const SERVICE: &str = "service";
pub const PATH: &str = "path";
pub const LISTENER_ID: &str = "listener_id";
pub const TOKEN: &str = "token";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const REASON_ONLY_CHANGES: &str = "only_changes";
pub const REASON_DUPLICATE_VALUE: &str = "duplicate_value";
pub const REASON_PATH_DISABLED: &str = "path_disabled";
pub const REASON_MISSING_COORDINATE: &str = "missing_coordinate";

/// Renders a bus value the way it appears in status text: strings without quotes.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Renders an enum value with its label, e.g. `1 (On)`.
pub fn format_enum_value(value: &Value, label: Option<&str>) -> String {
    format!("{} ({})", format_value(value), label.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_render_without_quotes() {
        assert_eq!(format_value(&json!("Bulk")), "Bulk");
        assert_eq!(format_value(&json!(12.5)), "12.5");
    }

    #[test]
    fn enum_values_render_with_label() {
        assert_eq!(format_enum_value(&json!(1), Some("On")), "1 (On)");
        assert_eq!(format_enum_value(&json!(9), None), "9 ()");
    }
}
