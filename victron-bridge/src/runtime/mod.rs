//! Runtime integration layer.
//!
//! Isolates the deferred migration task so timer and cancellation behavior stays
//! localized and the registry itself never sleeps.

pub(crate) mod migration_runtime;
