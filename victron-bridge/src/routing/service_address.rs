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

//! Bus coordinate value type and legacy/canonical key derivation.

use std::fmt::{Display, Formatter};

const SERVICE_ROOT_SEGMENTS: usize = 3;

/// Service name split from its legacy `.N` instance suffix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LegacyService {
    pub service: String,
    pub instance: Option<u32>,
}

/// A `(service, path)` coordinate on the bus.
///
/// Legacy services (`name.N`) are stored with the suffix stripped and the instance kept
/// aside; canonical services (`name/N`) are stored verbatim and never migrated.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ServiceAddress {
    service: String,
    instance: Option<u32>,
    path: String,
    canonical: bool,
}

impl ServiceAddress {
    pub fn parse(raw_service: &str, path: &str) -> Self {
        let path = normalize_path(path);
        if is_canonical(raw_service) {
            let instance = raw_service
                .rsplit_once('/')
                .and_then(|(_, digits)| digits.parse().ok());
            return Self {
                service: raw_service.to_string(),
                instance,
                path,
                canonical: true,
            };
        }

        let LegacyService { service, instance } = parse_legacy(raw_service);
        Self {
            service,
            instance,
            path,
            canonical: false,
        }
    }

    /// Address without any instance handling, as used by status fan-out.
    pub fn for_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            instance: None,
            path: String::new(),
            canonical: is_canonical(service),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn instance(&self) -> Option<u32> {
        self.instance
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Only legacy addresses that carried an instance suffix are candidates for migration.
    pub fn needs_migration(&self) -> bool {
        !self.canonical && self.instance.is_some()
    }

    pub fn service_root(&self) -> String {
        service_root(&self.service)
    }

    /// Registry key for the address as written.
    pub fn key(&self) -> String {
        subscription_key(&self.service, &self.path)
    }

    /// Registry key once the bus reports `instance` for this service.
    pub fn canonical_key(&self, instance: u32) -> String {
        canonical_key(&self.service, Some(instance), &self.path)
    }
}

impl Display for ServiceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.service, self.path)
    }
}

/// Returns `true` when `raw` ends in a canonical `/<digits>` instance suffix.
pub fn is_canonical(raw: &str) -> bool {
    match raw.rsplit_once('/') {
        Some((_, digits)) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Splits a trailing legacy `.<digits>` suffix off `raw`.
///
/// Canonical input is returned untouched with no instance.
pub fn parse_legacy(raw: &str) -> LegacyService {
    if is_canonical(raw) {
        return LegacyService {
            service: raw.to_string(),
            instance: None,
        };
    }

    match raw.rsplit_once('.') {
        Some((service, digits))
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            match digits.parse() {
                Ok(instance) => LegacyService {
                    service: service.to_string(),
                    instance: Some(instance),
                },
                Err(_) => LegacyService {
                    service: service.to_string(),
                    instance: None,
                },
            }
        }
        _ => LegacyService {
            service: raw.to_string(),
            instance: None,
        },
    }
}

/// First three dot-separated segments, e.g. `com.victronenergy.battery`.
pub fn service_root(service: &str) -> String {
    service
        .split('.')
        .take(SERVICE_ROOT_SEGMENTS)
        .collect::<Vec<_>>()
        .join(".")
}

pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub fn subscription_key(service: &str, path: &str) -> String {
    format!("{service}:{}", normalize_path(path))
}

/// Service name in canonical `root/N` form; without an instance the root alone.
pub fn canonical_service(service: &str, instance: Option<u32>) -> String {
    match instance {
        Some(instance) => format!("{}/{instance}", service_root(service)),
        None => service_root(service),
    }
}

pub fn canonical_key(service: &str, instance: Option<u32>, path: &str) -> String {
    subscription_key(&canonical_service(service, instance), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_suffix_is_split_into_instance() {
        assert_eq!(
            parse_legacy("com.victronenergy.battery.256"),
            LegacyService {
                service: "com.victronenergy.battery".to_string(),
                instance: Some(256),
            }
        );
    }

    #[test]
    fn legacy_without_digits_has_no_instance() {
        assert_eq!(
            parse_legacy("com.victronenergy.system"),
            LegacyService {
                service: "com.victronenergy.system".to_string(),
                instance: None,
            }
        );
    }

    #[test]
    fn canonical_service_is_not_treated_as_legacy() {
        let address = ServiceAddress::parse("com.victronenergy.battery/256", "Dc/0/Voltage");

        assert!(address.is_canonical());
        assert!(!address.needs_migration());
        assert_eq!(address.instance(), Some(256));
        assert_eq!(address.key(), "com.victronenergy.battery/256:/Dc/0/Voltage");
    }

    #[test]
    fn legacy_address_keys_by_stripped_service() {
        let address = ServiceAddress::parse("com.victronenergy.battery.0", "/Soc");

        assert!(address.needs_migration());
        assert_eq!(address.key(), "com.victronenergy.battery:/Soc");
        assert_eq!(address.canonical_key(256), "com.victronenergy.battery/256:/Soc");
        assert_eq!(address.service_root(), "com.victronenergy.battery");
    }

    #[test]
    fn canonical_key_truncates_to_service_root() {
        assert_eq!(
            canonical_key("com.victronenergy.vebus.ttyO1", Some(276), "/Mode"),
            "com.victronenergy.vebus/276:/Mode"
        );
        assert_eq!(
            canonical_key("com.victronenergy.vebus.ttyO1", None, "Mode"),
            "com.victronenergy.vebus:/Mode"
        );
    }

    #[test]
    fn canonical_detection_requires_trailing_digits() {
        assert!(is_canonical("com.victronenergy.tank/20"));
        assert!(!is_canonical("com.victronenergy.tank/"));
        assert!(!is_canonical("com.victronenergy.tank.20"));
    }
}
