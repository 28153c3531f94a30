//! # gpuml Device
//!
//! Executes an [`ExecutionPlan`](gpuml_plan::ExecutionPlan) one decode step at a time.
//!
//! [`DeviceRuntime`] is the seam a GPU backend plugs into; [`HostDevice`]
//! implements it on the CPU, keeping an emulated device memory keyed by
//! buffer id and running each kernel one work-group per rayon task.
//! [`DecodeSession`] owns the per-session state and drives the graphs in order.
//!
//! ```rust,ignore
//! let plan = Arc::new(gpuml_plan::compile(&model.descriptor, &model.config, &model.weights, &model.new_state(), &GridPolicy::default())?);
//! let mut session = DecodeSession::new(&model, plan)?;
//! let logits = session.step(token, 0)?;
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
