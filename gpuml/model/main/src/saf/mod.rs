//! Facade re-exports for gpuml-model

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::arch::resolve_architecture;
pub use crate::core::fixtures::ToyModelSpec;
pub use crate::core::loader::load_model;
pub use crate::core::rope::{rope_frequencies, rotate_pair};
