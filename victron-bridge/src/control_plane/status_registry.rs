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

//! Status fan-out to adapters interested in a service/path.

use crate::host::{NodeStatus, PipelineNode, StatusFill, StatusShape};
use crate::observability::events;
use crate::routing::service_address::ServiceAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const COMPONENT: &str = "status_registry";

/// Status vocabulary shared with the host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    ServiceMigrate,
    Connected,
    Disconnected,
    Error(String),
}

impl Display for StatusKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKind::ServiceMigrate => write!(f, "SERVICE_MIGRATE"),
            StatusKind::Connected => write!(f, "CONNECTED"),
            StatusKind::Disconnected => write!(f, "DISCONNECTED"),
            StatusKind::Error(message) => write!(f, "ERROR({message})"),
        }
    }
}

pub trait StatusListener: Send + Sync {
    fn on_status(&self, address: &ServiceAddress, kind: &StatusKind);
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StatusHandlerId(u64);

struct StatusRegistration {
    owner: Arc<dyn StatusListener>,
    service: String,
    path: String,
}

impl StatusRegistration {
    fn matches(&self, address: &ServiceAddress) -> bool {
        self.service == address.service()
            && (address.path().is_empty() || self.path == address.path())
    }
}

/// Registered status listeners, notified in registration order.
pub struct StatusListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<StatusHandlerId, StatusRegistration>>,
}

impl StatusListenerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn add_listener(
        &self,
        owner: Arc<dyn StatusListener>,
        service: &str,
        path: &str,
    ) -> StatusHandlerId {
        let handler_id = StatusHandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            event = events::STATUS_LISTENER_ADD,
            component = COMPONENT,
            service,
            path,
            handler_id = handler_id.0,
            "registered status listener"
        );
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                handler_id,
                StatusRegistration {
                    owner,
                    service: service.to_string(),
                    path: path.to_string(),
                },
            );
        handler_id
    }

    /// Unknown ids are ignored.
    pub fn remove_listener(&self, handler_id: StatusHandlerId) {
        let removed = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handler_id)
            .is_some();
        debug!(
            event = events::STATUS_LISTENER_REMOVE,
            component = COMPONENT,
            handler_id = handler_id.0,
            removed,
            "removed status listener"
        );
    }

    /// Fans `kind` out to every listener registered for the address's service, narrowed
    /// to its path when the address carries one. Returns the number of listeners reached.
    pub fn notify(&self, address: &ServiceAddress, kind: StatusKind) -> usize {
        let owners: Vec<Arc<dyn StatusListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|registration| registration.matches(address))
            .map(|registration| registration.owner.clone())
            .collect();

        debug!(
            event = events::STATUS_NOTIFY,
            component = COMPONENT,
            service = address.service(),
            path = address.path(),
            kind = %kind,
            listeners = owners.len(),
            "status notification"
        );

        for owner in &owners {
            owner.on_status(address, &kind);
        }
        owners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatusListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reflects status notifications as badges on a pipeline node.
pub(crate) struct NodeStatusListener {
    node: Arc<dyn PipelineNode>,
}

impl NodeStatusListener {
    pub(crate) fn new(node: Arc<dyn PipelineNode>) -> Self {
        Self { node }
    }

    fn badge(kind: &StatusKind) -> NodeStatus {
        match kind {
            StatusKind::ServiceMigrate => {
                NodeStatus::new(StatusFill::Yellow, StatusShape::Ring, "migrated")
            }
            StatusKind::Connected => {
                NodeStatus::new(StatusFill::Green, StatusShape::Dot, "connected")
            }
            StatusKind::Disconnected => {
                NodeStatus::new(StatusFill::Red, StatusShape::Ring, "disconnected")
            }
            StatusKind::Error(message) => {
                NodeStatus::new(StatusFill::Red, StatusShape::Dot, message.clone())
            }
        }
    }
}

impl StatusListener for NodeStatusListener {
    fn on_status(&self, _address: &ServiceAddress, kind: &StatusKind) {
        self.node.status(Self::badge(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<StatusKind>>,
    }

    impl StatusListener for RecordingListener {
        fn on_status(&self, _address: &ServiceAddress, kind: &StatusKind) {
            self.seen.lock().expect("lock seen").push(kind.clone());
        }
    }

    #[test]
    fn notify_reaches_only_matching_service() {
        let registry = StatusListenerRegistry::new();
        let battery = Arc::new(RecordingListener::default());
        let solar = Arc::new(RecordingListener::default());
        registry.add_listener(battery.clone(), "com.victronenergy.battery", "/Soc");
        registry.add_listener(solar.clone(), "com.victronenergy.solarcharger", "/Yield");

        let reached = registry.notify(
            &ServiceAddress::for_service("com.victronenergy.battery"),
            StatusKind::ServiceMigrate,
        );

        assert_eq!(reached, 1);
        assert_eq!(
            *battery.seen.lock().unwrap(),
            vec![StatusKind::ServiceMigrate]
        );
        assert!(solar.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn notify_with_path_narrows_to_path() {
        let registry = StatusListenerRegistry::new();
        let soc = Arc::new(RecordingListener::default());
        let voltage = Arc::new(RecordingListener::default());
        registry.add_listener(soc.clone(), "com.victronenergy.battery", "/Soc");
        registry.add_listener(voltage.clone(), "com.victronenergy.battery", "/Dc/0/Voltage");

        registry.notify(
            &ServiceAddress::parse("com.victronenergy.battery", "/Soc"),
            StatusKind::Disconnected,
        );

        assert_eq!(soc.seen.lock().unwrap().len(), 1);
        assert!(voltage.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn removed_listener_is_not_notified_and_double_remove_is_noop() {
        let registry = StatusListenerRegistry::new();
        let listener = Arc::new(RecordingListener::default());
        let handler_id = registry.add_listener(listener.clone(), "com.victronenergy.vebus", "");

        registry.remove_listener(handler_id);
        registry.remove_listener(handler_id);

        assert!(registry.is_empty());
        assert_eq!(
            registry.notify(
                &ServiceAddress::for_service("com.victronenergy.vebus"),
                StatusKind::Connected
            ),
            0
        );
        assert!(listener.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn status_kind_serializes_in_host_vocabulary() {
        assert_eq!(
            serde_json::to_string(&StatusKind::ServiceMigrate).unwrap(),
            "\"SERVICE_MIGRATE\""
        );
        assert_eq!(StatusKind::Error("bus down".to_string()).to_string(), "ERROR(bus down)");
    }
}
