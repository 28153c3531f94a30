//! Facade re-exports for gpuml-quant

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::block8::{dequantize_block8, encode_block8, quantize_block8};
pub use crate::core::simd::{dot_f32, dot_q8_block};
pub use crate::core::tensor::{f16_slice_to_bytes, f32_slice_to_bytes};
