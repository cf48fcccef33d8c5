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

//! Deferred migration task spawned after a legacy subscription is set up.

use crate::control_plane::migration::MigrationOutcome;
use crate::control_plane::subscription_registry::SubscriptionRegistry;
use crate::observability::events;
use crate::routing::service_address::ServiceAddress;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

const COMPONENT: &str = "migration_runtime";

/// Handle to one scheduled migration attempt.
pub(crate) struct MigrationTask {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<Option<MigrationOutcome>>,
}

impl MigrationTask {
    /// Cancels the attempt if it is still waiting out its delay, then waits for it.
    ///
    /// A migration that already started runs to completion so the registry, the bus
    /// and the status listeners all see the same outcome.
    pub(crate) async fn cancel(self) -> Option<MigrationOutcome> {
        // The task may already be past the delay; then nobody listens any more.
        let _ = self.cancel.send(());
        self.handle.await.ok().flatten()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the attempt; `None` when it was cancelled.
    pub(crate) async fn join(self) -> Option<MigrationOutcome> {
        self.handle.await.ok().flatten()
    }
}

/// Schedules `registry.migrate(address)` after `delay`.
///
/// The bus answers the instance lookup on its own schedule, so the delay is a
/// best-effort settling window rather than a synchronization point. Only the delay
/// can be cancelled.
pub(crate) fn spawn_delayed_migration(
    registry: Arc<SubscriptionRegistry>,
    address: ServiceAddress,
    delay: Duration,
) -> MigrationTask {
    debug!(
        event = events::MIGRATION_SCHEDULED,
        component = COMPONENT,
        service = address.service(),
        delay_ms = delay.as_millis() as u64,
        "scheduled legacy service migration"
    );

    let (cancel, mut cancelled) = oneshot::channel();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            Ok(()) = &mut cancelled => {
                debug!(
                    event = events::MIGRATION_CANCELLED,
                    component = COMPONENT,
                    service = address.service(),
                    "cancelled pending migration"
                );
                return None;
            }
        }
        Some(registry.migrate(&address).await)
    });

    MigrationTask { cancel, handle }
}
