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

//! Host pipeline surface: message shapes, status badges and injected sinks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message accepted by an output adapter.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InboundMessage {
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl InboundMessage {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            path: None,
        }
    }

    pub fn with_path(payload: Value, path: impl Into<String>) -> Self {
        Self {
            payload,
            path: Some(path.into()),
        }
    }
}

/// Message emitted by an input adapter.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub payload: Value,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textvalue: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Green,
    Yellow,
    Red,
    Grey,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    Dot,
    Ring,
}

/// Visual status badge shown on a pipeline node.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeStatus {
    pub fill: StatusFill,
    pub shape: StatusShape,
    pub text: String,
}

impl NodeStatus {
    pub fn new(fill: StatusFill, shape: StatusShape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }
}

/// One node of the host pipeline an adapter is bound to.
pub trait PipelineNode: Send + Sync {
    fn send(&self, message: OutboundMessage);

    fn status(&self, status: NodeStatus);
}

/// Process-wide key-value namespace other pipeline segments read by convention.
pub trait ContextSink: Send + Sync {
    fn put(&self, key: &str, value: Value);
}
