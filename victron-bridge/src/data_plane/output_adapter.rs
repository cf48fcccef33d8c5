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

//! Output adapter: pipeline messages written through to a bus coordinate.

use crate::bridge::{BridgeError, VictronBridge};
use crate::bus::{BusClient, BusError};
use crate::config::OutputAdapterConfig;
use crate::control_plane::status_registry::{
    NodeStatusListener, StatusHandlerId, StatusListenerRegistry,
};
use crate::host::{InboundMessage, NodeStatus, PipelineNode, StatusFill, StatusShape};
use crate::observability::{events, fields};
use crate::routing::service_address::normalize_path;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "output_adapter";

/// Result of one write request.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Published { service: String, path: String },
    /// Nothing was sent; carries the reason field logged with the drop.
    Dropped(&'static str),
    Failed(BusError),
}

impl WriteOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, WriteOutcome::Published { .. })
    }
}

pub struct OutputAdapter {
    config: OutputAdapterConfig,
    bus: Arc<dyn BusClient>,
    node: Arc<dyn PipelineNode>,
    status_registry: Arc<StatusListenerRegistry>,
    status_handler: StatusHandlerId,
    show_values: bool,
}

impl OutputAdapter {
    pub(crate) async fn start(
        bridge: &VictronBridge,
        config: OutputAdapterConfig,
        node: Arc<dyn PipelineNode>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let initial = config.initial_value()?;

        let status_registry = bridge.status_registry().clone();
        let status_handler = status_registry.add_listener(
            Arc::new(NodeStatusListener::new(node.clone())),
            &config.service,
            &normalize_path(&config.path),
        );

        let adapter = Self {
            config,
            bus: bridge.bus().clone(),
            node,
            status_registry,
            status_handler,
            show_values: bridge.options().show_values,
        };

        if let Some(initial) = initial {
            info!(
                event = events::OUTPUT_INITIAL_WRITE,
                component = COMPONENT,
                service = adapter.config.service.as_str(),
                path = adapter.config.path.as_str(),
                initial,
                "writing initial value"
            );
            adapter.write(Value::from(initial), None).await;
        }

        Ok(adapter)
    }

    pub fn config(&self) -> &OutputAdapterConfig {
        &self.config
    }

    /// Host "input" event: writes the payload, honouring a per-message path override.
    pub async fn on_input(&self, message: InboundMessage) -> WriteOutcome {
        self.write(message.payload, message.path.as_deref()).await
    }

    /// Publishes `value` to the configured coordinate, or to `override_path` when it names
    /// a different path. Overridden writes are reflected with a ring badge.
    pub async fn write(&self, value: Value, override_path: Option<&str>) -> WriteOutcome {
        let (raw_path, shape) = match override_path {
            Some(path) if !path.is_empty() && path != self.config.path => {
                (path, StatusShape::Ring)
            }
            _ => (self.config.path.as_str(), StatusShape::Dot),
        };
        let service = self.config.service.as_str();

        let dropped = if self.config.path_metadata.disabled {
            Some(fields::REASON_PATH_DISABLED)
        } else if service.trim().is_empty() || raw_path.trim().is_empty() {
            Some(fields::REASON_MISSING_COORDINATE)
        } else {
            None
        };
        if let Some(reason) = dropped {
            debug!(
                event = events::OUTPUT_WRITE_DROPPED,
                component = COMPONENT,
                service,
                path = raw_path,
                reason,
                "dropping output write"
            );
            return WriteOutcome::Dropped(reason);
        }

        let path = normalize_path(raw_path);
        let text = if self.config.path_metadata.is_enum() {
            fields::format_enum_value(&value, self.config.path_metadata.enum_label(&value))
        } else {
            fields::format_value(&value)
        };

        match self.bus.publish(service, &path, value).await {
            Ok(()) => {
                debug!(
                    event = events::OUTPUT_WRITE_OK,
                    component = COMPONENT,
                    service,
                    path = path.as_str(),
                    value = text.as_str(),
                    "published value"
                );
                if self.show_values {
                    self.node
                        .status(NodeStatus::new(StatusFill::Green, shape, text));
                }
                WriteOutcome::Published {
                    service: service.to_string(),
                    path,
                }
            }
            Err(err) => {
                warn!(
                    event = events::OUTPUT_WRITE_FAILED,
                    component = COMPONENT,
                    service,
                    path = path.as_str(),
                    err = %err,
                    "unable to publish value"
                );
                WriteOutcome::Failed(err)
            }
        }
    }

    pub fn close(self) {
        self.status_registry.remove_listener(self.status_handler);
        debug!(
            event = events::ADAPTER_CLOSE,
            component = COMPONENT,
            service = self.config.service.as_str(),
            path = self.config.path.as_str(),
            "closed output adapter"
        );
    }
}
