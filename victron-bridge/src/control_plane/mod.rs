//! Control-plane layer.
//!
//! Owns subscription identity: the key-to-listener registry, the legacy service
//! migration protocol and status fan-out to interested adapters.

pub(crate) mod migration;
pub(crate) mod status_registry;
pub(crate) mod subscription_registry;
