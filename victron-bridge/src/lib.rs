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

//! # victron-bridge
//!
//! `victron-bridge` connects dataflow pipeline nodes to a Victron-style system data bus.
//! Input adapters subscribe to `(service, path)` coordinates and emit messages on every
//! value change; output adapters write pipeline values back to the bus.
//!
//! Typical usage is API-first and centered on [`VictronBridge`], which owns one
//! [`BusClient`] and hands out [`InputAdapter`]s and [`OutputAdapter`]s.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use victron_bridge::{
//!     BridgeOptions, BusClient, BusError, BusListener, BusUpdate, InputAdapterConfig,
//!     NodeStatus, OutboundMessage, PipelineNode, SubscriptionToken, VictronBridge,
//! };
//!
//! # #[derive(Default)]
//! # struct ImmediateBus {
//! #     listeners: Mutex<Vec<Arc<dyn BusListener>>>,
//! # }
//! #
//! # #[async_trait]
//! # impl BusClient for ImmediateBus {
//! #     async fn subscribe(
//! #         &self,
//! #         _service: &str,
//! #         _path: &str,
//! #         listener: Arc<dyn BusListener>,
//! #     ) -> Result<SubscriptionToken, BusError> {
//! #         let mut listeners = self.listeners.lock().unwrap();
//! #         listeners.push(listener);
//! #         Ok(SubscriptionToken(listeners.len() as u64))
//! #     }
//! #     async fn unsubscribe(&self, _token: SubscriptionToken) -> Result<(), BusError> {
//! #         Ok(())
//! #     }
//! #     async fn get_value(&self, _service: &str, _path: &str) -> Result<Option<Value>, BusError> {
//! #         Ok(None)
//! #     }
//! #     async fn publish(&self, _service: &str, _path: &str, _value: Value) -> Result<(), BusError> {
//! #         Ok(())
//! #     }
//! #     async fn invalidate_snapshot(&self, _service_root: &str) {}
//! # }
//! #
//! # #[derive(Default)]
//! # struct PrintNode {
//! #     sent: Mutex<Vec<OutboundMessage>>,
//! # }
//! #
//! # impl PipelineNode for PrintNode {
//! #     fn send(&self, message: OutboundMessage) {
//! #         self.sent.lock().unwrap().push(message);
//! #     }
//! #     fn status(&self, _status: NodeStatus) {}
//! # }
//! #
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bus = Arc::new(ImmediateBus::default());
//! let bridge = VictronBridge::new("quick-start", bus.clone(), BridgeOptions::default());
//!
//! let node = Arc::new(PrintNode::default());
//! let mut config = InputAdapterConfig::new("com.victronenergy.battery/256", "/Soc");
//! config.name = Some("soc".to_string());
//! let input = bridge.add_input(config, node.clone()).await.unwrap();
//!
//! let dispatcher = bus.listeners.lock().unwrap()[0].clone();
//! dispatcher.on_update(BusUpdate::changed(json!(87.5))).await;
//! assert_eq!(node.sent.lock().unwrap()[0].topic, "soc");
//!
//! input.close().await;
//! assert_eq!(bridge.subscription_registry().subscription_count(), 0);
//! # });
//! ```
//!
//! ## Legacy service migration
//!
//! Services addressed in legacy form (`com.victronenergy.battery.0`) are re-bound to their
//! canonical form (`com.victronenergy.battery/256`) once the bus reports the device
//! instance. Listeners keep their identity; only the registry key changes. Adapters are
//! notified with [`StatusKind::ServiceMigrate`].
//!
//! ## Internal architecture map
//!
//! - API facade: [`VictronBridge`] and the adapter handles it returns
//! - Routing: service address parsing, registry keys and context-store keys
//! - Control plane: subscription registry, migration splicing and status fan-out
//! - Data plane: per-listener value pipeline and the input/output adapters
//! - Runtime: the deferred migration task with a cancellable delay
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries/tests are responsible for one-time `tracing_subscriber` initialization at
//! process boundaries.

mod bridge;
pub use bridge::{BridgeError, VictronBridge};

mod bus;
pub use bus::{
    BusClient, BusError, BusErrorKind, BusListener, BusUpdate, SubscriptionToken,
    DEVICE_INSTANCE_PATH,
};

mod config;
pub use config::{
    BridgeOptions, ConfigError, InputAdapterConfig, OutputAdapterConfig, PathMetadata, PathType,
};

mod host;
pub use host::{
    ContextSink, InboundMessage, NodeStatus, OutboundMessage, PipelineNode, StatusFill,
    StatusShape,
};

mod control_plane;
pub use control_plane::migration::MigrationOutcome;
pub use control_plane::status_registry::{
    StatusHandlerId, StatusKind, StatusListener, StatusListenerRegistry,
};
pub use control_plane::subscription_registry::{SubscriptionHandle, SubscriptionRegistry};

mod data_plane;
pub use data_plane::input_adapter::InputAdapter;
pub use data_plane::output_adapter::{OutputAdapter, WriteOutcome};

#[doc(hidden)]
pub mod observability;

mod routing;
pub use routing::service_address::{
    canonical_key, canonical_service, is_canonical, normalize_path, parse_legacy, service_root,
    subscription_key, LegacyService, ServiceAddress,
};

mod runtime;
