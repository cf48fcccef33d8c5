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

//! Derivation of the context-store key a forwarded value is mirrored under.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INSTANCE_QUALIFIED: Regex =
        Regex::new(r"com\.victronenergy\.(.+?)\.(\d+)\.(\w+)").expect("valid context key pattern");
}

/// Dotted key for `service` + `path`, with the first instance-qualified segment
/// rewritten to `victronenergy.<category>._<instance>.<leaf>`.
pub(crate) fn context_key(service: &str, path: &str) -> String {
    let dotted = format!("{service}{path}").replace('/', ".");
    INSTANCE_QUALIFIED
        .replace(&dotted, "victronenergy.${1}._${2}.${3}")
        .into_owned()
}
