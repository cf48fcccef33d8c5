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
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use victron_bridge::{
    BusClient, BusError, BusErrorKind, BusListener, BusUpdate, SubscriptionToken,
    DEVICE_INSTANCE_PATH,
};

/// One upstream subscription as seen by the bus.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedSubscription {
    pub token: SubscriptionToken,
    pub service: String,
    pub path: String,
}

struct ActiveSubscription {
    service: String,
    path: String,
    listener: Arc<dyn BusListener>,
}

/// In-memory `BusClient` that records every call and lets tests push updates by hand.
#[derive(Default)]
pub struct RecordingBus {
    next_token: AtomicU64,
    active: Mutex<BTreeMap<u64, ActiveSubscription>>,
    subscribed: Mutex<Vec<RecordedSubscription>>,
    unsubscribed: Mutex<Vec<SubscriptionToken>>,
    published: Mutex<Vec<(String, String, Value)>>,
    invalidated: Mutex<Vec<String>>,
    values: Mutex<HashMap<(String, String), Value>>,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
    yield_on_subscribe: AtomicBool,
    unsubscribe_delay: Mutex<Option<Duration>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the answer to a `/DeviceInstance` lookup on `service`.
    pub fn set_device_instance(&self, service: &str, instance: Value) {
        self.set_value(service, DEVICE_INSTANCE_PATH, instance);
    }

    pub fn set_value(&self, service: &str, path: &str, value: Value) {
        self.values
            .lock()
            .unwrap()
            .insert((service.to_string(), path.to_string()), value);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes `subscribe` yield to the runtime once before answering, so concurrent
    /// callers overlap.
    pub fn yield_on_subscribe(&self, enabled: bool) {
        self.yield_on_subscribe.store(enabled, Ordering::SeqCst);
    }

    /// Makes every `unsubscribe` take `delay` before it completes.
    pub fn delay_unsubscribe(&self, delay: Duration) {
        *self.unsubscribe_delay.lock().unwrap() = Some(delay);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribed.lock().unwrap().len()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.lock().unwrap().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn subscriptions(&self) -> Vec<RecordedSubscription> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, String, Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    /// Delivers `update` to every live subscription on `service` + `path`, in
    /// subscription order. Returns the number of upstream listeners reached.
    pub async fn emit(&self, service: &str, path: &str, update: BusUpdate) -> usize {
        let listeners: Vec<Arc<dyn BusListener>> = self
            .active
            .lock()
            .unwrap()
            .values()
            .filter(|subscription| subscription.service == service && subscription.path == path)
            .map(|subscription| subscription.listener.clone())
            .collect();
        debug!(service, path, listeners = listeners.len(), "emitting bus update");

        for listener in &listeners {
            listener.on_update(update.clone()).await;
        }
        listeners.len()
    }

    /// Delivers `update` through one specific upstream subscription.
    pub async fn emit_to(&self, token: SubscriptionToken, update: BusUpdate) -> bool {
        let listener = self
            .active
            .lock()
            .unwrap()
            .get(&token.0)
            .map(|subscription| subscription.listener.clone());
        match listener {
            Some(listener) => {
                listener.on_update(update).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BusClient for RecordingBus {
    async fn subscribe(
        &self,
        service: &str,
        path: &str,
        listener: Arc<dyn BusListener>,
    ) -> Result<SubscriptionToken, BusError> {
        if self.yield_on_subscribe.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BusError::fail_with_kind(
                BusErrorKind::Unavailable,
                "recording bus refuses subscriptions",
            ));
        }

        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.active.lock().unwrap().insert(
            token.0,
            ActiveSubscription {
                service: service.to_string(),
                path: path.to_string(),
                listener,
            },
        );
        self.subscribed.lock().unwrap().push(RecordedSubscription {
            token,
            service: service.to_string(),
            path: path.to_string(),
        });
        Ok(token)
    }

    async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError> {
        let delay = *self.unsubscribe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.unsubscribed.lock().unwrap().push(token);
        match self.active.lock().unwrap().remove(&token.0) {
            Some(_) => Ok(()),
            None => Err(BusError::fail_with_kind(
                BusErrorKind::NotFound,
                format!("no active subscription {token}"),
            )),
        }
    }

    async fn get_value(&self, service: &str, path: &str) -> Result<Option<Value>, BusError> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(service.to_string(), path.to_string()))
            .cloned())
    }

    async fn publish(&self, service: &str, path: &str, value: Value) -> Result<(), BusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::fail_with_kind(
                BusErrorKind::Unavailable,
                "recording bus refuses writes",
            ));
        }
        self.published
            .lock()
            .unwrap()
            .push((service.to_string(), path.to_string(), value));
        Ok(())
    }

    async fn invalidate_snapshot(&self, service_root: &str) {
        self.invalidated
            .lock()
            .unwrap()
            .push(service_root.to_string());
    }
}
