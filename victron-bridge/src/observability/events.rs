//! Canonical structured event names used across `victron-bridge`.

// Bridge lifecycle events.
pub const BRIDGE_CREATE: &str = "bridge_create";

// Subscription registry events.
pub const SUBSCRIPTION_ADD_LISTENER: &str = "subscription_add_listener";
pub const SUBSCRIPTION_UPSTREAM_OK: &str = "subscription_upstream_ok";
pub const SUBSCRIPTION_UPSTREAM_FAILED: &str = "subscription_upstream_failed";
pub const SUBSCRIPTION_REMOVE_LISTENER: &str = "subscription_remove_listener";
pub const SUBSCRIPTION_REMOVE_UNKNOWN: &str = "subscription_remove_unknown";
pub const SUBSCRIPTION_RELEASE_OK: &str = "subscription_release_ok";
pub const SUBSCRIPTION_RELEASE_FAILED: &str = "subscription_release_failed";
pub const SUBSCRIPTION_DISPATCH_STALE: &str = "subscription_dispatch_stale";

// Migration events.
pub const MIGRATION_SCHEDULED: &str = "migration_scheduled";
pub const MIGRATION_CANCELLED: &str = "migration_cancelled";
pub const MIGRATION_LOOKUP_FAILED: &str = "migration_lookup_failed";
pub const MIGRATION_UNRESOLVED: &str = "migration_unresolved";
pub const MIGRATION_NOT_NEEDED: &str = "migration_not_needed";
pub const MIGRATION_SPLICE_OK: &str = "migration_splice_ok";

// Status fan-out events.
pub const STATUS_LISTENER_ADD: &str = "status_listener_add";
pub const STATUS_LISTENER_REMOVE: &str = "status_listener_remove";
pub const STATUS_NOTIFY: &str = "status_notify";

// Data-plane events.
pub const INPUT_FORWARD: &str = "input_forward";
pub const INPUT_SUPPRESS: &str = "input_suppress";
pub const OUTPUT_WRITE_OK: &str = "output_write_ok";
pub const OUTPUT_WRITE_FAILED: &str = "output_write_failed";
pub const OUTPUT_WRITE_DROPPED: &str = "output_write_dropped";
pub const OUTPUT_INITIAL_WRITE: &str = "output_initial_write";
pub const ADAPTER_CLOSE: &str = "adapter_close";
