//! Data-plane layer.
//!
//! Owns the per-listener value pipeline and the input/output adapters that bind one
//! pipeline node each to the bus. Inputs are fed through the shared subscription
//! registry; outputs publish straight through the bus client without buffering.

pub(crate) mod input_adapter;
pub(crate) mod output_adapter;
pub(crate) mod value_pipeline;
