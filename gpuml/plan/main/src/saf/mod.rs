//! Facade re-exports for gpuml-plan

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::grid::largest_divisor;
pub use crate::core::planner::{
    compile, layer_graph_name, LayerPlanner, ValidatedPlanner, LOGITS_GRAPH,
};
pub use crate::core::registry::CapabilityRegistry;
