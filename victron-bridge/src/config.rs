/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
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

//! Adapter and bridge configuration, validated once at construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MIGRATION_DELAY_MS: u64 = 1000;
/// Largest accepted `round_values`.
pub const MAX_ROUND_PRECISION: i32 = 100;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConfigError {
    #[error("adapter is missing a service")]
    MissingService,
    #[error("adapter is missing a path")]
    MissingPath,
    #[error("initial value `{0}` is not an integer")]
    InvalidInitialValue(String),
    #[error("enum table key `{0}` is not an integer")]
    InvalidEnumKey(String),
    #[error("rounding precision {0} exceeds 100 digits")]
    RoundingPrecisionTooLarge(i32),
}

/// Declared type of a bus path.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    #[default]
    Float,
    Integer,
    String,
    Enum,
    #[serde(other)]
    Other,
}

/// UI metadata attached to a bus path.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub path_type: PathType,
    /// Labels keyed by the decimal rendering of the numeric value.
    #[serde(rename = "enum", default)]
    pub enum_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
}

impl PathMetadata {
    pub fn is_enum(&self) -> bool {
        self.path_type == PathType::Enum
    }

    pub fn enum_label(&self, value: &Value) -> Option<&str> {
        enum_key(value).and_then(|key| self.enum_labels.get(&key).map(String::as_str))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for key in self.enum_labels.keys() {
            if key.parse::<i64>().is_err() {
                return Err(ConfigError::InvalidEnumKey(key.clone()));
            }
        }
        Ok(())
    }
}

fn enum_key(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Some(integer.to_string())
            } else if let Some(integer) = number.as_u64() {
                Some(integer.to_string())
            } else {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0 && float.is_finite())
                    .map(|float| format!("{float:.0}"))
            }
        }
        Value::String(text) => Some(text.trim().to_string()),
        _ => None,
    }
}

/// Options shared by every adapter created from one bridge.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeOptions {
    /// Mirror forwarded values into the context sink.
    #[serde(default = "enabled")]
    pub context_store: bool,
    /// Reflect forwarded and written values in node status badges.
    #[serde(default = "enabled")]
    pub show_values: bool,
    #[serde(default = "default_migration_delay_ms")]
    pub migration_delay_ms: u64,
}

impl BridgeOptions {
    pub fn migration_delay(&self) -> Duration {
        Duration::from_millis(self.migration_delay_ms)
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            context_store: true,
            show_values: true,
            migration_delay_ms: DEFAULT_MIGRATION_DELAY_MS,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_migration_delay_ms() -> u64 {
    DEFAULT_MIGRATION_DELAY_MS
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InputAdapterConfig {
    pub service: String,
    pub path: String,
    #[serde(default)]
    pub path_metadata: PathMetadata,
    /// Human-readable service label used in the default topic.
    #[serde(default)]
    pub service_label: String,
    /// Explicit topic override.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub only_changes: bool,
    /// Decimal digits to round numeric values to; negative or absent disables rounding.
    #[serde(default)]
    pub round_values: Option<i32>,
}

impl InputAdapterConfig {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            path_metadata: PathMetadata::default(),
            service_label: String::new(),
            name: None,
            only_changes: false,
            round_values: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.trim().is_empty() {
            return Err(ConfigError::MissingService);
        }
        if self.path.trim().is_empty() {
            return Err(ConfigError::MissingPath);
        }
        if let Some(precision) = self.round_values.filter(|p| *p > MAX_ROUND_PRECISION) {
            return Err(ConfigError::RoundingPrecisionTooLarge(precision));
        }
        self.path_metadata.validate()
    }

    pub fn round_precision(&self) -> Option<usize> {
        self.round_values
            .filter(|precision| *precision >= 0)
            .map(|precision| precision as usize)
    }

    pub fn default_topic(&self) -> String {
        format!("{} - {}", self.service_label, self.path_metadata.name)
    }

    pub fn topic(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.default_topic(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputAdapterConfig {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub path_metadata: PathMetadata,
    /// Value written once at startup, parsed as an integer.
    #[serde(default)]
    pub initial: Option<String>,
}

impl OutputAdapterConfig {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            path_metadata: PathMetadata::default(),
            initial: None,
        }
    }

    /// Empty services or paths are accepted here and dropped at write time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.initial_value()?;
        self.path_metadata.validate()
    }

    pub fn initial_value(&self) -> Result<Option<i64>, ConfigError> {
        match self.initial.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidInitialValue(raw.to_string())),
        }
    }
}
