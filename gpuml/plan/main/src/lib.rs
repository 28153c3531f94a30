//! # gpuml Plan
//!
//! Compiles a loaded model into an [`ExecutionPlan`]: one [`TaskGraph`] per
//! transformer layer plus a final logits graph, each an ordered list of
//! kernel tasks with explicit host/device transfer directives, and a
//! [`GridSchedule`] giving every kernel its launch geometry.
//!
//! ```rust,ignore
//! let state = model.new_state();
//! let plan = gpuml_plan::compile(&model.descriptor, &model.config, &model.weights, &state, &GridPolicy::default())?;
//! for graph in plan.graphs() {
//!     println!("{} ({} kernels)", graph.name(), graph.tasks().len());
//! }
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
