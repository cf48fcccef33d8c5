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

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use victron_bridge::{ContextSink, NodeStatus, OutboundMessage, PipelineNode};

/// Pipeline node that keeps everything it was asked to send or show.
#[derive(Default)]
pub struct RecordingNode {
    sent: Mutex<Vec<OutboundMessage>>,
    statuses: Mutex<Vec<NodeStatus>>,
}

impl RecordingNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.payload.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<NodeStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

impl PipelineNode for RecordingNode {
    fn send(&self, message: OutboundMessage) {
        self.sent.lock().unwrap().push(message);
    }

    fn status(&self, status: NodeStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}

/// Context store backed by an ordered map.
#[derive(Default)]
pub struct RecordingContext {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

impl ContextSink for RecordingContext {
    fn put(&self, key: &str, value: Value) {
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }
}
