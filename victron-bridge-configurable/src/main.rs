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

mod config;

use crate::config::Config;
use bus_static_file::StaticFileBus;
use clap::Parser;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};
use victron_bridge::{
    BridgeError, BusError, ContextSink, NodeStatus, OutboundMessage, PipelineNode, VictronBridge,
};

#[derive(Parser)]
#[command()]
struct BridgeArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[derive(Debug, Error)]
enum RunnerError {
    #[error("unable to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("unable to parse config file: {0}")]
    Parse(#[from] json5::Error),
    #[error("unable to load static bus: {0}")]
    Bus(#[from] BusError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("duplicate node name found: {0}")]
    DuplicateNode(String),
}

/// Pipeline node that logs what it would hand to the next node.
struct LoggingNode {
    name: String,
}

impl PipelineNode for LoggingNode {
    fn send(&self, message: OutboundMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => info!(node = self.name.as_str(), message = json.as_str(), "send"),
            Err(err) => warn!(node = self.name.as_str(), err = %err, "unable to render message"),
        }
    }

    fn status(&self, status: NodeStatus) {
        info!(
            node = self.name.as_str(),
            fill = ?status.fill,
            shape = ?status.shape,
            text = status.text.as_str(),
            "status"
        );
    }
}

#[derive(Default)]
struct LoggingContext {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl ContextSink for LoggingContext {
    fn put(&self, key: &str, value: Value) {
        debug!(key, value = %value, "context put");
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }
}

fn load_config(path: &str) -> Result<Config, RunnerError> {
    let contents = fs::read_to_string(path)?;
    Ok(json5::from_str(&contents)?)
}

#[tokio::main]
async fn main() -> Result<(), RunnerError> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started victron-bridge-configurable");

    let args = BridgeArgs::parse();
    let config = load_config(&args.config)?;

    let bus = Arc::new(StaticFileBus::from_file(&config.bus.file_path)?);
    let context = Arc::new(LoggingContext::default());
    let bridge = VictronBridge::new(&config.bridge.name, bus, config.bridge.options.clone())
        .with_context_sink(context.clone());

    let mut node_names = Vec::new();
    let mut claim_name = |name: &str| {
        if node_names.iter().any(|known| known == name) {
            return Err(RunnerError::DuplicateNode(name.to_string()));
        }
        node_names.push(name.to_string());
        Ok(())
    };

    let mut inputs = Vec::new();
    for input in config.inputs {
        claim_name(&input.node)?;
        let node = Arc::new(LoggingNode { name: input.node });
        inputs.push(bridge.add_input(input.adapter, node).await?);
    }

    let mut outputs = Vec::new();
    for output in config.outputs {
        claim_name(&output.node)?;
        let node = Arc::new(LoggingNode { name: output.node });
        outputs.push(bridge.add_output(output.adapter, node).await?);
    }

    info!(
        inputs = inputs.len(),
        outputs = outputs.len(),
        subscriptions = bridge.subscription_registry().subscription_count(),
        "bridge running, press Ctrl-C to stop"
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(err = %err, "unable to listen for Ctrl-C, shutting down");
    }

    for input in inputs {
        input.close().await;
    }
    for output in outputs {
        output.close();
    }

    info!(
        keys = ?bridge.subscription_registry().keys(),
        context_entries = context.entries.lock().map(|entries| entries.len()).unwrap_or_default(),
        "bridge stopped"
    );
    Ok(())
}
