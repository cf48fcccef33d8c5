//! Addressing layer.
//!
//! Pure functions and value types mapping service/path coordinates onto registry keys
//! and context-store keys. Nothing in this layer touches the bus.
//!
//! ```
//! use victron_bridge::ServiceAddress;
//!
//! let legacy = ServiceAddress::parse("com.victronenergy.battery.0", "Dc/0/Voltage");
//! assert_eq!(legacy.key(), "com.victronenergy.battery:/Dc/0/Voltage");
//! assert_eq!(
//!     legacy.canonical_key(256),
//!     "com.victronenergy.battery/256:/Dc/0/Voltage"
//! );
//! ```

pub(crate) mod context_key;
pub(crate) mod service_address;
