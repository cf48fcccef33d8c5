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

mod support;

use integration_test_utils::RecordingNode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use victron_bridge::{BusUpdate, MigrationOutcome, NodeStatus, StatusFill, StatusShape};

const LEGACY: &str = "com.victronenergy.battery.0";
const STRIPPED: &str = "com.victronenergy.battery";
const CANONICAL: &str = "com.victronenergy.battery/256";

fn migrated_badge() -> NodeStatus {
    NodeStatus::new(StatusFill::Yellow, StatusShape::Ring, "migrated")
}

#[tokio::test(start_paused = true)]
async fn legacy_input_is_rebound_after_the_delay() {
    let harness = support::make_harness("migrate");
    harness.bus.set_device_instance(STRIPPED, json!(256));
    let node = Arc::new(RecordingNode::new());
    let mut input = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), node.clone())
        .await
        .unwrap();

    assert_eq!(input.current_key().as_deref(), Some("com.victronenergy.battery:/Soc"));
    assert!(input.migration_pending());

    let outcome = input.wait_for_migration().await;

    assert_eq!(
        outcome,
        Some(MigrationOutcome::Migrated {
            old_key: "com.victronenergy.battery:/Soc".to_string(),
            new_key: "com.victronenergy.battery/256:/Soc".to_string(),
            moved: 1,
        })
    );
    assert_eq!(
        input.current_key().as_deref(),
        Some("com.victronenergy.battery/256:/Soc")
    );
    assert_eq!(
        harness.bridge.subscription_registry().keys(),
        vec!["com.victronenergy.battery/256:/Soc".to_string()]
    );
    assert_eq!(harness.bus.invalidated(), vec![STRIPPED.to_string()]);
    assert!(node.statuses().contains(&migrated_badge()));

    // The upstream subscription survives the move and keeps delivering.
    let upstreams = harness.bus.subscriptions();
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].service, STRIPPED);
    assert!(
        harness
            .bus
            .emit_to(upstreams[0].token, BusUpdate::changed(json!(64)))
            .await
    );
    assert_eq!(node.payloads(), vec![json!(64)]);
    assert_eq!(harness.bus.unsubscribe_count(), 0);

    input.close().await;
    assert_eq!(harness.bus.unsubscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn migration_merges_into_existing_canonical_listeners_without_duplicates() {
    let harness = support::make_harness("merge");
    harness.bus.set_device_instance(STRIPPED, json!("256"));
    let canonical_node = Arc::new(RecordingNode::new());
    let legacy_node = Arc::new(RecordingNode::new());

    let canonical = harness
        .bridge
        .add_input(support::input_config(CANONICAL, "/Soc"), canonical_node.clone())
        .await
        .unwrap();
    let mut legacy = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), legacy_node.clone())
        .await
        .unwrap();
    assert_eq!(harness.bus.subscribe_count(), 2);

    legacy.wait_for_migration().await;

    let registry = harness.bridge.subscription_registry();
    assert!(!registry.contains_key("com.victronenergy.battery:/Soc"));
    assert_eq!(registry.listener_count("com.victronenergy.battery/256:/Soc"), 2);
    assert_eq!(harness.bus.unsubscribe_count(), 1);
    assert_eq!(harness.bus.active_count(), 1);

    harness
        .bus
        .emit(CANONICAL, "/Soc", BusUpdate::changed(json!(71)))
        .await;
    assert_eq!(canonical_node.payloads(), vec![json!(71)]);
    assert_eq!(legacy_node.payloads(), vec![json!(71)]);
    assert!(legacy_node.statuses().contains(&migrated_badge()));
    assert!(!canonical_node.statuses().contains(&migrated_badge()));

    canonical.close().await;
    legacy.close().await;
    assert_eq!(registry.subscription_count(), 0);
    assert_eq!(harness.bus.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unresolved_instance_keeps_the_legacy_key() {
    let harness = support::make_harness("unresolved");
    harness.bus.set_device_instance(STRIPPED, json!("unknown"));
    let node = Arc::new(RecordingNode::new());
    let mut input = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), node.clone())
        .await
        .unwrap();

    assert_eq!(
        input.wait_for_migration().await,
        Some(MigrationOutcome::Unresolved)
    );
    assert_eq!(
        input.current_key().as_deref(),
        Some("com.victronenergy.battery:/Soc")
    );
    assert!(harness.bus.invalidated().is_empty());
    assert!(!node.statuses().contains(&migrated_badge()));
}

#[tokio::test(start_paused = true)]
async fn closing_before_the_delay_cancels_migration() {
    let harness = support::make_harness("cancel");
    harness.bus.set_device_instance(STRIPPED, json!(256));
    let input = harness
        .bridge
        .add_input(
            support::input_config(LEGACY, "/Soc"),
            Arc::new(RecordingNode::new()),
        )
        .await
        .unwrap();

    input.close().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(harness.bus.invalidated().is_empty());
    assert_eq!(harness.bridge.subscription_registry().subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn canonical_input_schedules_no_migration() {
    let harness = support::make_harness("canonical");
    let mut input = harness
        .bridge
        .add_input(
            support::input_config(CANONICAL, "/Soc"),
            Arc::new(RecordingNode::new()),
        )
        .await
        .unwrap();

    assert!(!input.migration_pending());
    assert_eq!(input.wait_for_migration().await, None);
}

#[tokio::test(start_paused = true)]
async fn two_legacy_inputs_migrate_once() {
    let harness = support::make_harness("twice");
    harness.bus.set_device_instance(STRIPPED, json!(256));
    let first_node = Arc::new(RecordingNode::new());
    let second_node = Arc::new(RecordingNode::new());
    let mut first = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), first_node.clone())
        .await
        .unwrap();
    let mut second = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), second_node.clone())
        .await
        .unwrap();

    let outcomes = [
        first.wait_for_migration().await,
        second.wait_for_migration().await,
    ];

    assert!(outcomes.contains(&Some(MigrationOutcome::Migrated {
        old_key: "com.victronenergy.battery:/Soc".to_string(),
        new_key: "com.victronenergy.battery/256:/Soc".to_string(),
        moved: 2,
    })));
    assert!(outcomes.contains(&Some(MigrationOutcome::AlreadyMigrated {
        new_key: "com.victronenergy.battery/256:/Soc".to_string(),
    })));
    assert_eq!(harness.bus.subscribe_count(), 1);
    assert_eq!(harness.bus.invalidated().len(), 1);

    harness
        .bus
        .emit(STRIPPED, "/Soc", BusUpdate::changed(json!(90)))
        .await;
    assert_eq!(first_node.payloads(), vec![json!(90)]);
    assert_eq!(second_node.payloads(), vec![json!(90)]);
}

#[tokio::test(start_paused = true)]
async fn closing_during_a_running_migration_lets_it_finish() {
    let harness = support::make_harness("close-mid-migration");
    harness.bus.set_device_instance(STRIPPED, json!(256));
    harness.bus.delay_unsubscribe(Duration::from_millis(50));
    let canonical_node = Arc::new(RecordingNode::new());
    let legacy_node = Arc::new(RecordingNode::new());
    let canonical = harness
        .bridge
        .add_input(support::input_config(CANONICAL, "/Soc"), canonical_node)
        .await
        .unwrap();
    let legacy = harness
        .bridge
        .add_input(support::input_config(LEGACY, "/Soc"), legacy_node.clone())
        .await
        .unwrap();

    // The splice has happened and the legacy upstream release is still in flight.
    tokio::time::sleep(Duration::from_millis(1010)).await;
    legacy.close().await;
    canonical.close().await;

    assert!(harness.bridge.subscription_registry().keys().is_empty());
    assert_eq!(harness.bus.active_count(), 0);
    assert_eq!(harness.bus.unsubscribe_count(), 2);
    assert_eq!(harness.bus.invalidated(), vec![STRIPPED.to_string()]);
    assert!(legacy_node.statuses().contains(&migrated_badge()));
}
