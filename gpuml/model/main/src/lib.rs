//! # gpuml Model
//!
//! Turns a parsed tensor container into something executable:
//!
//! - [`ArchitectureDescriptor`]: the structural flags of a model family
//! - [`ModelConfiguration`]: dimensions and hyper-parameters from metadata
//! - [`WeightSet`]: per-layer projections plus shared embedding, norms and RoPE tables
//! - [`RuntimeState`]: the per-session activation buffers and KV cache
//!
//! [`load_model`] is the entry point; [`ToyModelSpec`] writes small seeded
//! containers for tests and demos.

pub mod api;
mod core;
mod saf;

pub use saf::*;
