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

//! Bus-client contract the bridge is built against.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

/// Path queried on a service to resolve its numeric device instance.
pub const DEVICE_INSTANCE_PATH: &str = "/DeviceInstance";

/// One value-changed notification delivered by the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct BusUpdate {
    pub value: Value,
    /// `false` when the bus re-announces a value it already delivered.
    pub changed: bool,
}

impl BusUpdate {
    pub fn new(value: Value, changed: bool) -> Self {
        Self { value, changed }
    }

    pub fn changed(value: Value) -> Self {
        Self::new(value, true)
    }

    pub fn unchanged(value: Value) -> Self {
        Self::new(value, false)
    }
}

/// Opaque token identifying one upstream subscription on the bus.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionToken(pub u64);

impl Display for SubscriptionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BusErrorKind {
    NotFound,
    InvalidArgument,
    Unavailable,
    Internal,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct BusError {
    pub kind: BusErrorKind,
    pub message: String,
}

impl BusError {
    pub fn fail_with_kind(kind: BusErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Receives updates for one upstream subscription.
#[async_trait]
pub trait BusListener: Send + Sync {
    async fn on_update(&self, update: BusUpdate);
}

/// Low-level client for the data bus.
///
/// Implementations own connectivity and retries; the bridge calls each operation at most
/// once per request and reports failures through its own logging.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn subscribe(
        &self,
        service: &str,
        path: &str,
        listener: Arc<dyn BusListener>,
    ) -> Result<SubscriptionToken, BusError>;

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError>;

    /// Returns the current value, `None` when the bus has no value for the coordinate.
    async fn get_value(&self, service: &str, path: &str) -> Result<Option<Value>, BusError>;

    async fn publish(&self, service: &str, path: &str, value: Value) -> Result<(), BusError>;

    /// Drops any cached snapshot held for a service root such as `com.victronenergy.battery`.
    async fn invalidate_snapshot(&self, service_root: &str);
}
