use std::fmt;

use gpuml_gguf::GGMLType;
use half::f16;

use crate::api::error::{QuantError, QuantResult};

/// Number of elements per Q8_0 block.
pub const Q8_0_BLOCK_SIZE: usize = 32;

/// Bytes per Q8_0 block: 2-byte f16 scale + 32 i8 values.
pub const Q8_0_BLOCK_BYTES: usize = 34;

/// Storage schemes the runtime can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuantScheme {
    F32,
    F16,
    Q8_0,
}

impl QuantScheme {
    pub const ALL: [QuantScheme; 3] = [QuantScheme::F32, QuantScheme::F16, QuantScheme::Q8_0];

    /// `None` for container tags the runtime cannot execute.
    pub fn from_ggml(ty: GGMLType) -> Option<Self> {
        match ty {
            GGMLType::F32 => Some(QuantScheme::F32),
            GGMLType::F16 => Some(QuantScheme::F16),
            GGMLType::Q8_0 => Some(QuantScheme::Q8_0),
            _ => None,
        }
    }

    /// Scheme of a named tensor, failing with `UnsupportedFormat` for other tags.
    pub fn for_tensor(tensor: &str, ty: GGMLType) -> QuantResult<Self> {
        Self::from_ggml(ty).ok_or_else(|| QuantError::UnsupportedFormat {
            tensor: tensor.to_string(),
            ggml_type: ty.to_string(),
        })
    }

    pub fn ggml_type(&self) -> GGMLType {
        match self {
            QuantScheme::F32 => GGMLType::F32,
            QuantScheme::F16 => GGMLType::F16,
            QuantScheme::Q8_0 => GGMLType::Q8_0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.ggml_type().name()
    }

    /// Elements per storage block (1 for float schemes).
    pub fn block_size(&self) -> usize {
        match self {
            QuantScheme::Q8_0 => Q8_0_BLOCK_SIZE,
            _ => 1,
        }
    }

    /// Encoded size of `elements` values, if `elements` is a whole number of blocks.
    pub fn encoded_len(&self, elements: usize) -> Option<usize> {
        match self {
            QuantScheme::F32 => Some(elements * 4),
            QuantScheme::F16 => Some(elements * 2),
            QuantScheme::Q8_0 => (elements % Q8_0_BLOCK_SIZE == 0)
                .then(|| elements / Q8_0_BLOCK_SIZE * Q8_0_BLOCK_BYTES),
        }
    }
}

impl fmt::Display for QuantScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded Q8_0 tensor: one scale per 32 codes.
#[derive(Debug, Clone, PartialEq)]
pub struct Q8Tensor {
    /// Logical element count (a multiple of 32).
    pub size: usize,
    pub scales: Vec<f16>,
    pub codes: Vec<i8>,
}

/// A weight tensor in one of the executable storage schemes.
///
/// Float payloads are copied out of the container; Q8_0 is split into
/// scale and code planes so row kernels index them directly.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedTensor {
    F32(Vec<f32>),
    F16(Vec<f16>),
    Q8_0(Q8Tensor),
}
