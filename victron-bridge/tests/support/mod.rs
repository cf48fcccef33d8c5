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

use integration_test_utils::{RecordingBus, RecordingContext};
use std::sync::Arc;
use victron_bridge::{BridgeOptions, InputAdapterConfig, OutputAdapterConfig, VictronBridge};

pub(crate) struct Harness {
    pub(crate) bus: Arc<RecordingBus>,
    #[allow(dead_code)]
    pub(crate) context: Arc<RecordingContext>,
    pub(crate) bridge: VictronBridge,
}

pub(crate) fn make_harness(name: &str) -> Harness {
    make_harness_with(name, BridgeOptions::default())
}

#[allow(dead_code)]
pub(crate) fn make_harness_with(name: &str, options: BridgeOptions) -> Harness {
    integration_test_utils::init_logging();

    let bus = Arc::new(RecordingBus::new());
    let context = Arc::new(RecordingContext::new());
    let bridge = VictronBridge::new(name, bus.clone(), options).with_context_sink(context.clone());
    Harness {
        bus,
        context,
        bridge,
    }
}

#[allow(dead_code)]
pub(crate) fn input_config(service: &str, path: &str) -> InputAdapterConfig {
    let mut config = InputAdapterConfig::new(service, path);
    config.service_label = "Battery Monitor".to_string();
    config.path_metadata.name = "State of charge".to_string();
    config
}

#[allow(dead_code)]
pub(crate) fn output_config(service: &str, path: &str) -> OutputAdapterConfig {
    OutputAdapterConfig::new(service, path)
}
