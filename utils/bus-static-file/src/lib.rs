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

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, canonicalize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use victron_bridge::{
    service_root, BusClient, BusError, BusErrorKind, BusListener, BusUpdate, SubscriptionToken,
};

type ServiceValues = BTreeMap<String, Value>;

struct StaticSubscription {
    service: String,
    path: String,
    listener: Arc<dyn BusListener>,
}

/// In-memory bus seeded from a JSON file of `{ "<service>": { "<path>": <value> } }`.
///
/// Writes are kept in memory and fanned out to subscribers of the written coordinate.
pub struct StaticFileBus {
    values: Mutex<BTreeMap<String, ServiceValues>>,
    subscriptions: Mutex<BTreeMap<u64, StaticSubscription>>,
    /// Services whose values have been read through `get_value` since their last invalidation.
    snapshot: Mutex<BTreeSet<String>>,
    next_token: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StaticFileBus {
    pub fn new() -> Self {
        Self::with_values(BTreeMap::new())
    }

    fn with_values(values: BTreeMap<String, ServiceValues>) -> Self {
        Self {
            values: Mutex::new(values),
            subscriptions: Mutex::new(BTreeMap::new()),
            snapshot: Mutex::new(BTreeSet::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn from_file(static_file: &str) -> Result<Self, BusError> {
        let static_file = PathBuf::from(static_file);
        debug!("static bus file: {static_file:?}");

        let static_file = canonicalize(&static_file).map_err(|e| {
            BusError::fail_with_kind(
                BusErrorKind::InvalidArgument,
                format!("Static bus file not found: {e:?}"),
            )
        })?;

        let data = fs::read_to_string(static_file).map_err(|e| {
            BusError::fail_with_kind(
                BusErrorKind::InvalidArgument,
                format!("Unable to read file: {e:?}"),
            )
        })?;

        let parsed: Value = serde_json::from_str(&data).map_err(|e| {
            BusError::fail_with_kind(
                BusErrorKind::InvalidArgument,
                format!("Unable to parse JSON: {e:?}"),
            )
        })?;

        Self::from_value(parsed)
    }

    pub fn from_value(root: Value) -> Result<Self, BusError> {
        let Value::Object(services) = root else {
            return Err(BusError::fail_with_kind(
                BusErrorKind::InvalidArgument,
                "static bus data must be an object keyed by service",
            ));
        };

        let mut values = BTreeMap::new();
        for (service, paths) in services {
            match paths {
                Value::Object(paths) => {
                    debug!(service = service.as_str(), paths = paths.len(), "loaded service");
                    values.insert(service, normalized_paths(paths));
                }
                other => warn!("Ignoring service '{service}' with non-object value {other}"),
            }
        }
        Ok(Self::with_values(values))
    }

    pub fn services(&self) -> Vec<String> {
        lock(&self.values).keys().cloned().collect()
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    pub fn is_snapshotted(&self, service: &str) -> bool {
        lock(&self.snapshot).contains(service)
    }

    fn listeners_for(&self, service: &str, path: &str) -> Vec<Arc<dyn BusListener>> {
        lock(&self.subscriptions)
            .values()
            .filter(|subscription| subscription.service == service && subscription.path == path)
            .map(|subscription| subscription.listener.clone())
            .collect()
    }
}

impl Default for StaticFileBus {
    fn default() -> Self {
        Self::new()
    }
}

fn normalized_paths(paths: Map<String, Value>) -> ServiceValues {
    paths
        .into_iter()
        .map(|(path, value)| (victron_bridge::normalize_path(&path), value))
        .collect()
}

#[async_trait]
impl BusClient for StaticFileBus {
    async fn subscribe(
        &self,
        service: &str,
        path: &str,
        listener: Arc<dyn BusListener>,
    ) -> Result<SubscriptionToken, BusError> {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).insert(
            token.0,
            StaticSubscription {
                service: service.to_string(),
                path: path.to_string(),
                listener: listener.clone(),
            },
        );
        debug!(service, path, token = %token, "static subscription added");

        let current = lock(&self.values)
            .get(service)
            .and_then(|paths| paths.get(path))
            .cloned();
        if let Some(value) = current {
            listener.on_update(BusUpdate::changed(value)).await;
        }
        Ok(token)
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError> {
        match lock(&self.subscriptions).remove(&token.0) {
            Some(_) => Ok(()),
            None => Err(BusError::fail_with_kind(
                BusErrorKind::NotFound,
                format!("unknown subscription {token}"),
            )),
        }
    }

    async fn get_value(&self, service: &str, path: &str) -> Result<Option<Value>, BusError> {
        let value = lock(&self.values)
            .get(service)
            .and_then(|paths| paths.get(path))
            .cloned();
        lock(&self.snapshot).insert(service.to_string());
        Ok(value)
    }

    async fn publish(&self, service: &str, path: &str, value: Value) -> Result<(), BusError> {
        let previous = lock(&self.values)
            .entry(service.to_string())
            .or_default()
            .insert(path.to_string(), value.clone());
        let changed = previous.as_ref() != Some(&value);

        let listeners = self.listeners_for(service, path);
        debug!(
            service,
            path,
            changed,
            listeners = listeners.len(),
            "static value written"
        );
        for listener in listeners {
            listener
                .on_update(BusUpdate::new(value.clone(), changed))
                .await;
        }
        Ok(())
    }

    async fn invalidate_snapshot(&self, root: &str) {
        lock(&self.snapshot).retain(|service| service_root(service) != root);
    }
}
