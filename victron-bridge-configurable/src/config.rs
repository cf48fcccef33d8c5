/********************************************************************************
 * Copyright (c) 2025 Contributors to the Eclipse Foundation
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

use serde::{Deserialize, Serialize};
use victron_bridge::{BridgeOptions, InputAdapterConfig, OutputAdapterConfig};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub(crate) bridge: BridgeConfig,
    pub(crate) bus: BusConfig,
    #[serde(default)]
    pub(crate) inputs: Vec<InputNodeConfig>,
    #[serde(default)]
    pub(crate) outputs: Vec<OutputNodeConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) options: BridgeOptions,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    pub(crate) file_path: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct InputNodeConfig {
    pub(crate) node: String,
    pub(crate) adapter: InputAdapterConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutputNodeConfig {
    pub(crate) node: String,
    pub(crate) adapter: OutputAdapterConfig,
}
