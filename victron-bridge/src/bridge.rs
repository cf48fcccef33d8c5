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

use crate::bus::{BusClient, BusError};
use crate::config::{BridgeOptions, ConfigError, InputAdapterConfig, OutputAdapterConfig};
use crate::control_plane::status_registry::{StatusKind, StatusListenerRegistry};
use crate::control_plane::subscription_registry::SubscriptionRegistry;
use crate::data_plane::input_adapter::InputAdapter;
use crate::data_plane::output_adapter::OutputAdapter;
use crate::host::{ContextSink, PipelineNode};
use crate::observability::events;
use crate::routing::service_address::ServiceAddress;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const COMPONENT: &str = "bridge";

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum BridgeError {
    #[error("invalid adapter configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("bus operation failed: {0}")]
    Bus(#[from] BusError),
}

/// Shared connection to one bus, handing out input and output adapters.
///
/// All adapters created from the same bridge share one subscription registry, so
/// identical `(service, path)` inputs collapse into a single upstream subscription.
pub struct VictronBridge {
    name: String,
    bus: Arc<dyn BusClient>,
    registry: Arc<SubscriptionRegistry>,
    status_registry: Arc<StatusListenerRegistry>,
    options: BridgeOptions,
    context: Option<Arc<dyn ContextSink>>,
}

impl VictronBridge {
    pub fn new(name: &str, bus: Arc<dyn BusClient>, options: BridgeOptions) -> Self {
        let status_registry = Arc::new(StatusListenerRegistry::new());
        let registry = Arc::new(SubscriptionRegistry::new(
            bus.clone(),
            status_registry.clone(),
        ));
        info!(
            event = events::BRIDGE_CREATE,
            component = COMPONENT,
            name,
            context_store = options.context_store,
            show_values = options.show_values,
            migration_delay_ms = options.migration_delay_ms,
            "created bridge"
        );
        Self {
            name: name.to_string(),
            bus,
            registry,
            status_registry,
            options,
            context: None,
        }
    }

    /// Sink that forwarded input values are mirrored into when `context_store` is on.
    pub fn with_context_sink(mut self, context: Arc<dyn ContextSink>) -> Self {
        self.context = Some(context);
        self
    }

    pub async fn add_input(
        &self,
        config: InputAdapterConfig,
        node: Arc<dyn PipelineNode>,
    ) -> Result<InputAdapter, BridgeError> {
        InputAdapter::start(self, config, node).await
    }

    pub async fn add_output(
        &self,
        config: OutputAdapterConfig,
        node: Arc<dyn PipelineNode>,
    ) -> Result<OutputAdapter, BridgeError> {
        OutputAdapter::start(self, config, node).await
    }

    /// Raises `kind` to every adapter registered for the address, e.g. on bus
    /// connect/disconnect. Returns the number of adapters reached.
    pub fn notify_status(&self, address: &ServiceAddress, kind: StatusKind) -> usize {
        self.status_registry.notify(address, kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn bus(&self) -> &Arc<dyn BusClient> {
        &self.bus
    }

    pub fn subscription_registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn status_registry(&self) -> &Arc<StatusListenerRegistry> {
        &self.status_registry
    }

    pub(crate) fn context_sink(&self) -> Option<Arc<dyn ContextSink>> {
        self.context.clone()
    }
}

impl Debug for VictronBridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VictronBridge")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("subscriptions", &self.registry.subscription_count())
            .field("status_listeners", &self.status_registry.len())
            .finish()
    }
}
