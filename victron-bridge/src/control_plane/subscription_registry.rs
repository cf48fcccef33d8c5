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

//! Key-to-listener registry with one shared upstream subscription per key.

use crate::bus::{
    BusClient, BusError, BusErrorKind, BusListener, BusUpdate, SubscriptionToken,
    DEVICE_INSTANCE_PATH,
};
use crate::control_plane::migration::{resolve_device_instance, MigrationOutcome};
use crate::control_plane::status_registry::{StatusKind, StatusListenerRegistry};
use crate::observability::events;
use crate::routing::service_address::{subscription_key, ServiceAddress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const COMPONENT: &str = "subscription_registry";

type ListenerId = u64;
type UpstreamId = u64;
/// `None` until the bus has answered the subscribe call for an upstream.
type UpstreamReady = Option<Result<(), BusError>>;

/// Opaque handle returned by [`SubscriptionRegistry::subscribe`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionHandle {
    listener_id: ListenerId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum UpstreamState {
    Pending,
    Active(SubscriptionToken),
    Failed,
}

struct Upstream {
    id: UpstreamId,
    state: UpstreamState,
    ready: watch::Receiver<UpstreamReady>,
}

/// What a new listener has to do about the upstream of the key it joined.
enum UpstreamJoin {
    Ready,
    Await(UpstreamId, watch::Receiver<UpstreamReady>),
    Create(UpstreamId, watch::Sender<UpstreamReady>),
}

struct SubscriptionEntry {
    upstream: Upstream,
    listeners: Vec<(ListenerId, Arc<dyn BusListener>)>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, SubscriptionEntry>,
    /// Key each live upstream subscription currently delivers to.
    routes: HashMap<UpstreamId, String>,
    listener_keys: HashMap<ListenerId, String>,
}

impl RegistryState {
    /// Moves every listener of `old_key` under `new_key`, appending to any listeners
    /// already there. Returns the upstream token made redundant by the merge, if any.
    fn splice(&mut self, old_key: &str, new_key: &str) -> Option<SpliceResult> {
        let old_entry = self.entries.remove(old_key)?;
        let moved = old_entry.listeners.len();
        for (listener_id, _) in &old_entry.listeners {
            self.listener_keys
                .insert(*listener_id, new_key.to_string());
        }

        let released = match self.entries.get_mut(new_key) {
            Some(existing) => {
                existing.listeners.extend(old_entry.listeners);
                self.routes.remove(&old_entry.upstream.id);
                match old_entry.upstream.state {
                    UpstreamState::Active(token) => Some(token),
                    UpstreamState::Pending | UpstreamState::Failed => None,
                }
            }
            None => {
                self.routes
                    .insert(old_entry.upstream.id, new_key.to_string());
                self.entries.insert(new_key.to_string(), old_entry);
                None
            }
        };

        Some(SpliceResult { moved, released })
    }
}

struct SpliceResult {
    moved: usize,
    released: Option<SubscriptionToken>,
}

/// Upstream listener that fans each update out to the listeners indexed under the key
/// its upstream subscription is currently routed to.
struct KeyDispatcher {
    upstream_id: UpstreamId,
    state: Weak<Mutex<RegistryState>>,
}

#[async_trait]
impl BusListener for KeyDispatcher {
    async fn on_update(&self, update: BusUpdate) {
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let listeners: Vec<Arc<dyn BusListener>> = {
            let state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = state
                .routes
                .get(&self.upstream_id)
                .and_then(|key| state.entries.get(key))
            else {
                debug!(
                    event = events::SUBSCRIPTION_DISPATCH_STALE,
                    component = COMPONENT,
                    upstream_id = self.upstream_id,
                    "dropping update for retired upstream subscription"
                );
                return;
            };
            entry
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        for listener in listeners {
            listener.on_update(update.clone()).await;
        }
    }
}

/// Authoritative map from canonical `service:path` key to interested listeners.
///
/// The map is guarded by a single mutex that is never held across bus I/O.
pub struct SubscriptionRegistry {
    bus: Arc<dyn BusClient>,
    status_registry: Arc<StatusListenerRegistry>,
    state: Arc<Mutex<RegistryState>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(bus: Arc<dyn BusClient>, status_registry: Arc<StatusListenerRegistry>) -> Self {
        Self {
            bus,
            status_registry,
            state: Arc::new(Mutex::new(RegistryState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn new_upstream(&self) -> (Upstream, watch::Sender<UpstreamReady>) {
        let (sender, ready) = watch::channel(None);
        let upstream = Upstream {
            id: self.allocate_id(),
            state: UpstreamState::Pending,
            ready,
        };
        (upstream, sender)
    }

    /// Registers `listener` for `service:path`, creating the upstream bus subscription
    /// only when the key has none yet.
    pub async fn subscribe(
        &self,
        service: &str,
        path: &str,
        listener: Arc<dyn BusListener>,
    ) -> Result<SubscriptionHandle, BusError> {
        let key = subscription_key(service, path);
        let listener_id = self.allocate_id();

        let join = {
            let mut state = self.lock_state();
            state.listener_keys.insert(listener_id, key.clone());
            let join = match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.listeners.push((listener_id, listener));
                    let upstream_state = entry.upstream.state;
                    match upstream_state {
                        UpstreamState::Active(_) => UpstreamJoin::Ready,
                        UpstreamState::Pending => {
                            UpstreamJoin::Await(entry.upstream.id, entry.upstream.ready.clone())
                        }
                        UpstreamState::Failed => {
                            let (upstream, sender) = self.new_upstream();
                            let upstream_id = upstream.id;
                            entry.upstream = upstream;
                            UpstreamJoin::Create(upstream_id, sender)
                        }
                    }
                }
                None => {
                    let (upstream, sender) = self.new_upstream();
                    let upstream_id = upstream.id;
                    state.entries.insert(
                        key.clone(),
                        SubscriptionEntry {
                            upstream,
                            listeners: vec![(listener_id, listener)],
                        },
                    );
                    UpstreamJoin::Create(upstream_id, sender)
                }
            };
            if let UpstreamJoin::Create(upstream_id, _) = &join {
                state.routes.insert(*upstream_id, key.clone());
            }
            join
        };

        debug!(
            event = events::SUBSCRIPTION_ADD_LISTENER,
            component = COMPONENT,
            key = key.as_str(),
            listener_id,
            shared_upstream = !matches!(join, UpstreamJoin::Create(..)),
            "added subscription listener"
        );

        let handle = SubscriptionHandle { listener_id };
        let (upstream_id, ready) = match join {
            UpstreamJoin::Ready => return Ok(handle),
            UpstreamJoin::Await(upstream_id, ready) => {
                return self.await_upstream(&key, handle, upstream_id, ready).await;
            }
            UpstreamJoin::Create(upstream_id, ready) => (upstream_id, ready),
        };

        let dispatcher = Arc::new(KeyDispatcher {
            upstream_id,
            state: Arc::downgrade(&self.state),
        });

        match self.bus.subscribe(service, path, dispatcher).await {
            Ok(token) => {
                let orphaned = {
                    let mut state = self.lock_state();
                    let current_entry = match state.routes.get(&upstream_id).cloned() {
                        Some(current_key) => state.entries.get_mut(&current_key),
                        None => None,
                    };
                    match current_entry {
                        Some(entry) if entry.upstream.id == upstream_id => {
                            entry.upstream.state = UpstreamState::Active(token);
                            false
                        }
                        _ => true,
                    }
                };
                ready.send_replace(Some(Ok(())));

                if orphaned {
                    // Every listener left (or was merged away) while the bus call was in flight.
                    self.release_upstream(&key, token).await;
                } else {
                    debug!(
                        event = events::SUBSCRIPTION_UPSTREAM_OK,
                        component = COMPONENT,
                        key = key.as_str(),
                        token = %token,
                        "upstream subscription established"
                    );
                }
                Ok(handle)
            }
            Err(err) => {
                warn!(
                    event = events::SUBSCRIPTION_UPSTREAM_FAILED,
                    component = COMPONENT,
                    key = key.as_str(),
                    err = %err,
                    "unable to establish upstream subscription"
                );
                self.drop_failed_listener(listener_id, upstream_id);
                ready.send_replace(Some(Err(err.clone())));
                Err(err)
            }
        }
    }

    /// Waits for the bus answer on an upstream another caller is creating and
    /// shares its result.
    async fn await_upstream(
        &self,
        key: &str,
        handle: SubscriptionHandle,
        upstream_id: UpstreamId,
        mut ready: watch::Receiver<UpstreamReady>,
    ) -> Result<SubscriptionHandle, BusError> {
        let outcome = loop {
            let current = ready.borrow_and_update().clone();
            if let Some(outcome) = current {
                break outcome;
            }
            if ready.changed().await.is_err() {
                break Err(BusError::fail_with_kind(
                    BusErrorKind::Unavailable,
                    "upstream subscription abandoned before the bus answered",
                ));
            }
        };

        match outcome {
            Ok(()) => Ok(handle),
            Err(err) => {
                warn!(
                    event = events::SUBSCRIPTION_UPSTREAM_FAILED,
                    component = COMPONENT,
                    key,
                    listener_id = handle.listener_id,
                    err = %err,
                    "shared upstream subscription failed"
                );
                self.drop_failed_listener(handle.listener_id, upstream_id);
                Err(err)
            }
        }
    }

    /// Unindexes a listener whose upstream could not be established.
    fn drop_failed_listener(&self, listener_id: ListenerId, upstream_id: UpstreamId) {
        let mut state = self.lock_state();
        state.routes.remove(&upstream_id);
        let Some(current_key) = state.listener_keys.remove(&listener_id) else {
            return;
        };
        let now_empty = match state.entries.get_mut(&current_key) {
            Some(entry) => {
                entry.listeners.retain(|(id, _)| *id != listener_id);
                if entry.upstream.id == upstream_id {
                    entry.upstream.state = UpstreamState::Failed;
                }
                entry.listeners.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.entries.remove(&current_key);
        }
    }

    /// Removes one listener; the last listener of a key releases the upstream
    /// subscription before this returns. Unknown handles are ignored.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let listener_id = handle.listener_id;
        let released = {
            let mut state = self.lock_state();
            let Some(key) = state.listener_keys.remove(&listener_id) else {
                debug!(
                    event = events::SUBSCRIPTION_REMOVE_UNKNOWN,
                    component = COMPONENT,
                    listener_id,
                    "unsubscribe for unknown handle"
                );
                return;
            };

            let now_empty = match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.listeners.retain(|(id, _)| *id != listener_id);
                    entry.listeners.is_empty()
                }
                None => false,
            };

            debug!(
                event = events::SUBSCRIPTION_REMOVE_LISTENER,
                component = COMPONENT,
                key = key.as_str(),
                listener_id,
                last_listener = now_empty,
                "removed subscription listener"
            );

            if now_empty {
                state.entries.remove(&key).and_then(|entry| {
                    state.routes.remove(&entry.upstream.id);
                    match entry.upstream.state {
                        UpstreamState::Active(token) => Some((key, token)),
                        UpstreamState::Pending | UpstreamState::Failed => None,
                    }
                })
            } else {
                None
            }
        };

        if let Some((key, token)) = released {
            self.release_upstream(&key, token).await;
        }
    }

    async fn release_upstream(&self, key: &str, token: SubscriptionToken) {
        match self.bus.unsubscribe(token).await {
            Ok(()) => debug!(
                event = events::SUBSCRIPTION_RELEASE_OK,
                component = COMPONENT,
                key,
                token = %token,
                "released upstream subscription"
            ),
            Err(err) => warn!(
                event = events::SUBSCRIPTION_RELEASE_FAILED,
                component = COMPONENT,
                key,
                token = %token,
                err = %err,
                "unable to release upstream subscription"
            ),
        }
    }

    /// Re-binds listeners of a legacy address to its canonical `root/N` key.
    ///
    /// Safe to run repeatedly: once the legacy key is gone the call is a no-op.
    pub async fn migrate(&self, address: &ServiceAddress) -> MigrationOutcome {
        if !address.needs_migration() {
            return MigrationOutcome::NotApplicable;
        }

        let looked_up = self
            .bus
            .get_value(address.service(), DEVICE_INSTANCE_PATH)
            .await;
        let instance = match looked_up {
            Ok(value) => value.as_ref().and_then(resolve_device_instance),
            Err(err) => {
                warn!(
                    event = events::MIGRATION_LOOKUP_FAILED,
                    component = COMPONENT,
                    service = address.service(),
                    err = %err,
                    "device instance lookup failed"
                );
                None
            }
        };

        let Some(instance) = instance else {
            debug!(
                event = events::MIGRATION_UNRESOLVED,
                component = COMPONENT,
                service = address.service(),
                "failed to migrate service, keeping legacy key"
            );
            return MigrationOutcome::Unresolved;
        };

        let old_key = address.key();
        let new_key = address.canonical_key(instance);
        let spliced = if old_key == new_key {
            None
        } else {
            self.lock_state().splice(&old_key, &new_key)
        };

        let Some(SpliceResult { moved, released }) = spliced else {
            debug!(
                event = events::MIGRATION_NOT_NEEDED,
                component = COMPONENT,
                old_key = old_key.as_str(),
                new_key = new_key.as_str(),
                "no legacy subscription left to migrate"
            );
            return MigrationOutcome::AlreadyMigrated { new_key };
        };

        info!(
            event = events::MIGRATION_SPLICE_OK,
            component = COMPONENT,
            old_key = old_key.as_str(),
            new_key = new_key.as_str(),
            moved,
            "migrating subscription (please update your flow)"
        );

        if let Some(token) = released {
            self.release_upstream(&old_key, token).await;
        }
        self.bus.invalidate_snapshot(&address.service_root()).await;
        self.status_registry.notify(
            &ServiceAddress::for_service(address.service()),
            StatusKind::ServiceMigrate,
        );

        MigrationOutcome::Migrated {
            old_key,
            new_key,
            moved,
        }
    }

    /// Number of keys holding at least one listener.
    pub fn subscription_count(&self) -> usize {
        self.lock_state().entries.len()
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.lock_state()
            .entries
            .get(key)
            .map_or(0, |entry| entry.listeners.len())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock_state().entries.contains_key(key)
    }

    /// Key the listener behind `handle` is indexed under; follows migrations.
    pub fn key_of(&self, handle: SubscriptionHandle) -> Option<String> {
        self.lock_state()
            .listener_keys
            .get(&handle.listener_id)
            .cloned()
    }

    /// Sorted snapshot of the registered keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_state().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    fn listener_ids(&self, key: &str) -> Vec<ListenerId> {
        self.lock_state()
            .entries
            .get(key)
            .map(|entry| entry.listeners.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }
}

impl SubscriptionHandle {
    #[cfg(test)]
    fn id(&self) -> ListenerId {
        self.listener_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingBus {
        next_token: AtomicU64,
        subscribed: StdMutex<Vec<(String, String)>>,
        listeners: StdMutex<HashMap<SubscriptionToken, Arc<dyn BusListener>>>,
        unsubscribed: StdMutex<Vec<SubscriptionToken>>,
        invalidated: StdMutex<Vec<String>>,
        device_instance: StdMutex<Option<Value>>,
        fail_subscribe: StdMutex<bool>,
        yield_on_subscribe: AtomicBool,
    }

    impl RecordingBus {
        fn with_device_instance(value: Value) -> Self {
            let bus = Self::default();
            *bus.device_instance.lock().unwrap() = Some(value);
            bus
        }

        fn subscribe_count(&self) -> usize {
            self.subscribed.lock().expect("lock subscribed").len()
        }

        fn unsubscribe_count(&self) -> usize {
            self.unsubscribed.lock().expect("lock unsubscribed").len()
        }

        async fn emit_all(&self, update: BusUpdate) {
            let listeners: Vec<Arc<dyn BusListener>> = self
                .listeners
                .lock()
                .expect("lock listeners")
                .values()
                .cloned()
                .collect();
            for listener in listeners {
                listener.on_update(update.clone()).await;
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
            if *self.fail_subscribe.lock().unwrap() {
                return Err(BusError::fail_with_kind(
                    BusErrorKind::Unavailable,
                    "bus offline",
                ));
            }
            let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
            self.subscribed
                .lock()
                .unwrap()
                .push((service.to_string(), path.to_string()));
            self.listeners.lock().unwrap().insert(token, listener);
            Ok(token)
        }

        async fn unsubscribe(&self, token: SubscriptionToken) -> Result<(), BusError> {
            self.listeners.lock().unwrap().remove(&token);
            self.unsubscribed.lock().unwrap().push(token);
            Ok(())
        }

        async fn get_value(&self, _service: &str, _path: &str) -> Result<Option<Value>, BusError> {
            Ok(self.device_instance.lock().unwrap().clone())
        }

        async fn publish(&self, _service: &str, _path: &str, _value: Value) -> Result<(), BusError> {
            Ok(())
        }

        async fn invalidate_snapshot(&self, service_root: &str) {
            self.invalidated
                .lock()
                .unwrap()
                .push(service_root.to_string());
        }
    }

    #[derive(Default)]
    struct CountingListener {
        values: StdMutex<Vec<Value>>,
    }

    #[async_trait]
    impl BusListener for CountingListener {
        async fn on_update(&self, update: BusUpdate) {
            self.values.lock().unwrap().push(update.value);
        }
    }

    fn registry_with(bus: Arc<RecordingBus>) -> SubscriptionRegistry {
        SubscriptionRegistry::new(bus, Arc::new(StatusListenerRegistry::new()))
    }

    #[tokio::test]
    async fn duplicate_subscriptions_share_one_upstream() {
        let bus = Arc::new(RecordingBus::default());
        let registry = registry_with(bus.clone());
        let first = Arc::new(CountingListener::default());
        let second = Arc::new(CountingListener::default());

        registry
            .subscribe("com.victronenergy.battery/256", "/Soc", first.clone())
            .await
            .unwrap();
        registry
            .subscribe("com.victronenergy.battery/256", "Soc", second.clone())
            .await
            .unwrap();

        assert_eq!(bus.subscribe_count(), 1);
        assert_eq!(
            registry.listener_count("com.victronenergy.battery/256:/Soc"),
            2
        );

        bus.emit_all(BusUpdate::changed(json!(87))).await;
        assert_eq!(*first.values.lock().unwrap(), vec![json!(87)]);
        assert_eq!(*second.values.lock().unwrap(), vec![json!(87)]);
    }

    #[tokio::test]
    async fn last_unsubscribe_releases_upstream() {
        let bus = Arc::new(RecordingBus::default());
        let registry = registry_with(bus.clone());
        let listener = Arc::new(CountingListener::default());

        let first = registry
            .subscribe("com.victronenergy.system", "/Dc/Battery/Soc", listener.clone())
            .await
            .unwrap();
        let second = registry
            .subscribe("com.victronenergy.system", "/Dc/Battery/Soc", listener)
            .await
            .unwrap();

        registry.unsubscribe(first).await;
        assert_eq!(bus.unsubscribe_count(), 0);
        assert_eq!(registry.subscription_count(), 1);

        registry.unsubscribe(second).await;
        assert_eq!(bus.unsubscribe_count(), 1);
        assert_eq!(registry.subscription_count(), 0);

        registry.unsubscribe(second).await;
        assert_eq!(bus.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn failed_upstream_is_reported_and_leaves_no_entry() {
        let bus = Arc::new(RecordingBus::default());
        *bus.fail_subscribe.lock().unwrap() = true;
        let registry = registry_with(bus.clone());

        let result = registry
            .subscribe(
                "com.victronenergy.vebus/276",
                "/Mode",
                Arc::new(CountingListener::default()),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(registry.subscription_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_subscribers_share_upstream_failure() {
        let bus = Arc::new(RecordingBus::default());
        bus.yield_on_subscribe.store(true, Ordering::SeqCst);
        *bus.fail_subscribe.lock().unwrap() = true;
        let registry = registry_with(bus.clone());

        let (first, second) = tokio::join!(
            registry.subscribe(
                "com.victronenergy.battery/256",
                "/Soc",
                Arc::new(CountingListener::default()),
            ),
            registry.subscribe(
                "com.victronenergy.battery/256",
                "/Soc",
                Arc::new(CountingListener::default()),
            ),
        );

        let first = first.unwrap_err();
        assert_eq!(first.kind, BusErrorKind::Unavailable);
        assert_eq!(second.unwrap_err(), first);
        assert_eq!(registry.subscription_count(), 0);
        assert!(registry.keys().is_empty());

        *bus.fail_subscribe.lock().unwrap() = false;
        registry
            .subscribe(
                "com.victronenergy.battery/256",
                "/Soc",
                Arc::new(CountingListener::default()),
            )
            .await
            .unwrap();
        assert_eq!(bus.subscribe_count(), 1);
    }

    #[tokio::test]
    async fn joining_a_pending_upstream_waits_for_it() {
        let bus = Arc::new(RecordingBus::default());
        bus.yield_on_subscribe.store(true, Ordering::SeqCst);
        let registry = registry_with(bus.clone());
        let first = Arc::new(CountingListener::default());
        let second = Arc::new(CountingListener::default());

        let (first_handle, second_handle) = tokio::join!(
            registry.subscribe("com.victronenergy.battery/256", "/Soc", first.clone()),
            registry.subscribe("com.victronenergy.battery/256", "/Soc", second.clone()),
        );
        first_handle.unwrap();
        second_handle.unwrap();

        assert_eq!(bus.subscribe_count(), 1);
        bus.emit_all(BusUpdate::changed(json!(64))).await;
        assert_eq!(*first.values.lock().unwrap(), vec![json!(64)]);
        assert_eq!(*second.values.lock().unwrap(), vec![json!(64)]);
    }

    #[tokio::test]
    async fn migration_moves_listeners_and_reroutes_upstream() {
        let bus = Arc::new(RecordingBus::with_device_instance(json!(256)));
        let registry = registry_with(bus.clone());
        let listener = Arc::new(CountingListener::default());
        let address = ServiceAddress::parse("com.victronenergy.battery.0", "/Soc");

        let handle = registry
            .subscribe(address.service(), address.path(), listener.clone())
            .await
            .unwrap();

        let outcome = registry.migrate(&address).await;
        assert_eq!(
            outcome,
            MigrationOutcome::Migrated {
                old_key: "com.victronenergy.battery:/Soc".to_string(),
                new_key: "com.victronenergy.battery/256:/Soc".to_string(),
                moved: 1,
            }
        );
        assert_eq!(registry.keys(), vec!["com.victronenergy.battery/256:/Soc"]);
        assert_eq!(
            *bus.invalidated.lock().unwrap(),
            vec!["com.victronenergy.battery".to_string()]
        );

        bus.emit_all(BusUpdate::changed(json!(55))).await;
        assert_eq!(*listener.values.lock().unwrap(), vec![json!(55)]);

        assert_eq!(
            registry.key_of(handle).as_deref(),
            Some("com.victronenergy.battery/256:/Soc")
        );
        registry.unsubscribe(handle).await;
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(bus.unsubscribe_count(), 1);
        assert_eq!(registry.key_of(handle), None);
    }

    #[tokio::test]
    async fn migration_appends_to_existing_canonical_listeners() {
        let bus = Arc::new(RecordingBus::with_device_instance(json!("256")));
        let registry = registry_with(bus.clone());
        let legacy = ServiceAddress::parse("com.victronenergy.battery.0", "/Soc");

        let l1 = registry
            .subscribe(
                legacy.service(),
                legacy.path(),
                Arc::new(CountingListener::default()),
            )
            .await
            .unwrap();
        let l2 = registry
            .subscribe(
                "com.victronenergy.battery/256",
                "/Soc",
                Arc::new(CountingListener::default()),
            )
            .await
            .unwrap();

        registry.migrate(&legacy).await;

        assert!(!registry.contains_key("com.victronenergy.battery:/Soc"));
        assert_eq!(
            registry.listener_ids("com.victronenergy.battery/256:/Soc"),
            vec![l2.id(), l1.id()]
        );
        assert_eq!(bus.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn repeated_migration_is_idempotent() {
        let bus = Arc::new(RecordingBus::with_device_instance(json!(256)));
        let registry = registry_with(bus.clone());
        let legacy = ServiceAddress::parse("com.victronenergy.battery.0", "/Soc");
        registry
            .subscribe(
                legacy.service(),
                legacy.path(),
                Arc::new(CountingListener::default()),
            )
            .await
            .unwrap();

        registry.migrate(&legacy).await;
        let second = registry.migrate(&legacy).await;

        assert_eq!(
            second,
            MigrationOutcome::AlreadyMigrated {
                new_key: "com.victronenergy.battery/256:/Soc".to_string()
            }
        );
        assert_eq!(
            registry.listener_count("com.victronenergy.battery/256:/Soc"),
            1
        );
        assert_eq!(bus.invalidated.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unresolved_instance_keeps_legacy_key() {
        let bus = Arc::new(RecordingBus::with_device_instance(json!("not-a-number")));
        let registry = registry_with(bus.clone());
        let legacy = ServiceAddress::parse("com.victronenergy.tank.3", "/Level");
        registry
            .subscribe(
                legacy.service(),
                legacy.path(),
                Arc::new(CountingListener::default()),
            )
            .await
            .unwrap();

        assert_eq!(registry.migrate(&legacy).await, MigrationOutcome::Unresolved);
        assert_eq!(registry.keys(), vec!["com.victronenergy.tank:/Level"]);
    }

    #[tokio::test]
    async fn canonical_address_skips_migration() {
        let bus = Arc::new(RecordingBus::with_device_instance(json!(1)));
        let registry = registry_with(bus);
        let canonical = ServiceAddress::parse("com.victronenergy.tank/20", "/Level");

        assert_eq!(
            registry.migrate(&canonical).await,
            MigrationOutcome::NotApplicable
        );
    }
}
