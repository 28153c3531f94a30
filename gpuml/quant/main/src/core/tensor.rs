use std::time::Instant;

use gpuml_gguf::{TensorContainer, TensorDescriptor};
use half::f16;
use rayon::prelude::*;

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::*;
use crate::core::block8::{dequantize_block8, encode_block8, quantize_block8};
use crate::core::simd;

impl QuantizedTensor {
    pub fn scheme(&self) -> QuantScheme {
        match self {
            QuantizedTensor::F32(_) => QuantScheme::F32,
            QuantizedTensor::F16(_) => QuantScheme::F16,
            QuantizedTensor::Q8_0(_) => QuantScheme::Q8_0,
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            QuantizedTensor::F32(v) => v.len(),
            QuantizedTensor::F16(v) => v.len(),
            QuantizedTensor::Q8_0(q) => q.size,
        }
    }

    /// Encode f32 values in `scheme`.
    pub fn from_f32(values: &[f32], scheme: QuantScheme) -> QuantResult<Self> {
        Ok(match scheme {
            QuantScheme::F32 => QuantizedTensor::F32(values.to_vec()),
            QuantScheme::F16 => {
                QuantizedTensor::F16(values.iter().map(|&v| f16::from_f32(v)).collect())
            }
            QuantScheme::Q8_0 => QuantizedTensor::Q8_0(quantize_block8(values)?),
        })
    }

    /// Decode `elements` values stored as `scheme` in `raw`.
    pub fn from_raw(scheme: QuantScheme, raw: &[u8], elements: usize) -> QuantResult<Self> {
        let expected = scheme
            .encoded_len(elements)
            .ok_or(QuantError::BlockAlignment {
                elements,
                block_size: scheme.block_size(),
            })?;
        if raw.len() != expected {
            return Err(QuantError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![raw.len()],
            });
        }

        Ok(match scheme {
            QuantScheme::F32 => QuantizedTensor::F32(
                raw.chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            QuantScheme::F16 => QuantizedTensor::F16(
                raw.chunks_exact(2)
                    .map(|c| f16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            QuantScheme::Q8_0 => {
                let (scales, codes) = dequantize_block8(raw, elements / Q8_0_BLOCK_SIZE)?;
                QuantizedTensor::Q8_0(Q8Tensor {
                    size: elements,
                    scales,
                    codes,
                })
            }
        })
    }

    /// Decode a tensor straight out of a container.
    pub fn from_container(
        container: &TensorContainer,
        desc: &TensorDescriptor,
    ) -> QuantResult<Self> {
        let scheme = QuantScheme::for_tensor(&desc.name, desc.ggml_type)?;
        let elements = desc.element_count();
        if elements % scheme.block_size() != 0 {
            return Err(QuantError::BlockAlignment {
                elements,
                block_size: scheme.block_size(),
            });
        }
        let raw = container.tensor_bytes(desc)?;
        Self::from_raw(scheme, raw, elements)
    }

    /// Container encoding of this tensor.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            QuantizedTensor::F32(v) => f32_slice_to_bytes(v).to_vec(),
            QuantizedTensor::F16(v) => f16_slice_to_bytes(v).to_vec(),
            QuantizedTensor::Q8_0(q) => encode_block8(q),
        }
    }

    /// Dequantize every element.
    pub fn as_f32(&self) -> Vec<f32> {
        match self {
            QuantizedTensor::F32(v) => v.clone(),
            QuantizedTensor::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            QuantizedTensor::Q8_0(q) => q
                .codes
                .chunks_exact(Q8_0_BLOCK_SIZE)
                .zip(&q.scales)
                .flat_map(|(codes, scale)| {
                    let s = scale.to_f32();
                    codes.iter().map(move |&c| c as f32 * s)
                })
                .collect(),
        }
    }

    /// Dequantize row `row` of a `[_, cols]` matrix into `out`.
    pub fn row_f32(&self, row: usize, cols: usize, out: &mut [f32]) -> QuantResult<()> {
        self.check_row_layout(cols)?;
        let start = row * cols;
        if out.len() != cols || start + cols > self.element_count() {
            return Err(QuantError::ShapeMismatch {
                expected: vec![row + 1, cols],
                actual: vec![self.element_count() / cols.max(1), out.len()],
            });
        }
        match self {
            QuantizedTensor::F32(v) => out.copy_from_slice(&v[start..start + cols]),
            QuantizedTensor::F16(v) => {
                for (o, x) in out.iter_mut().zip(&v[start..start + cols]) {
                    *o = x.to_f32();
                }
            }
            QuantizedTensor::Q8_0(q) => {
                let first_block = start / Q8_0_BLOCK_SIZE;
                for (b, chunk) in out.chunks_exact_mut(Q8_0_BLOCK_SIZE).enumerate() {
                    let block = first_block + b;
                    let scale = q.scales[block].to_f32();
                    let codes = &q.codes[block * Q8_0_BLOCK_SIZE..(block + 1) * Q8_0_BLOCK_SIZE];
                    for (o, &c) in chunk.iter_mut().zip(codes) {
                        *o = c as f32 * scale;
                    }
                }
            }
        }
        Ok(())
    }

    /// Dot product of row `row` of a `[_, cols]` matrix with `x`.
    ///
    /// Callers validate the layout once (see `matvec`); an out-of-range row panics.
    pub fn dot_row(&self, row: usize, cols: usize, x: &[f32]) -> f32 {
        let start = row * cols;
        match self {
            QuantizedTensor::F32(v) => simd::dot_f32(&v[start..start + cols], &x[..cols]),
            QuantizedTensor::F16(v) => v[start..start + cols]
                .iter()
                .zip(&x[..cols])
                .map(|(w, xi)| w.to_f32() * xi)
                .sum(),
            QuantizedTensor::Q8_0(q) => {
                let first_block = start / Q8_0_BLOCK_SIZE;
                let mut dot = 0.0f32;
                for (b, xs) in x[..cols].chunks_exact(Q8_0_BLOCK_SIZE).enumerate() {
                    let block = first_block + b;
                    let codes = &q.codes[block * Q8_0_BLOCK_SIZE..(block + 1) * Q8_0_BLOCK_SIZE];
                    dot += simd::dot_q8_block(xs, codes, q.scales[block].to_f32());
                }
                dot
            }
        }
    }

    /// `out[r] = dot(row r, x)` for the first `out.len()` rows, parallel over rows.
    pub fn matvec(&self, cols: usize, x: &[f32], out: &mut [f32]) -> QuantResult<()> {
        self.check_row_layout(cols)?;
        let rows = out.len();
        if x.len() < cols || rows * cols > self.element_count() {
            return Err(QuantError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: vec![self.element_count() / cols.max(1), x.len()],
            });
        }

        let _t = if log::log_enabled!(log::Level::Trace) {
            Some(Instant::now())
        } else {
            None
        };

        out.par_iter_mut()
            .enumerate()
            .for_each(|(r, o)| *o = self.dot_row(r, cols, x));

        if let Some(t) = _t {
            log::trace!(
                "[perf] quant::matvec {} [{}x{}] {:.3}ms",
                self.scheme(),
                rows,
                cols,
                t.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(())
    }

    fn check_row_layout(&self, cols: usize) -> QuantResult<()> {
        let block = self.scheme().block_size();
        if cols == 0 || cols % block != 0 {
            return Err(QuantError::BlockAlignment {
                elements: cols,
                block_size: block,
            });
        }
        Ok(())
    }
}

/// Reinterpret an f32 slice as little-endian bytes.
pub fn f32_slice_to_bytes(v: &[f32]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn f16_slice_to_bytes(v: &[f16]) -> &[u8] {
    bytemuck::cast_slice(v)
}
