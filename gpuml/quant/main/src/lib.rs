//! # gpuml Quant
//!
//! Weight storage schemes (F32, F16, Q8_0) and the per-row kernels the
//! device runtime executes on them.
//!
//! Q8_0 stores 32-element blocks as one f16 scale plus 32 signed bytes;
//! a value decodes as `code * scale`.

pub mod api;
mod core;
mod saf;

pub use saf::*;
