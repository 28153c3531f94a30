use half::f16;

use crate::api::error::{QuantError, QuantResult};
use crate::api::types::*;

/// Quantize f32 values to Q8_0.
///
/// Per 32-element block: `scale = amax / 127`, codes are `round(v / scale)`
/// clamped to i8. An all-zero block gets scale 0 and zero codes.
pub fn quantize_block8(values: &[f32]) -> QuantResult<Q8Tensor> {
    let n_elements = values.len();
    if n_elements % Q8_0_BLOCK_SIZE != 0 {
        return Err(QuantError::BlockAlignment {
            elements: n_elements,
            block_size: Q8_0_BLOCK_SIZE,
        });
    }

    let n_blocks = n_elements / Q8_0_BLOCK_SIZE;
    let mut scales = Vec::with_capacity(n_blocks);
    let mut codes = Vec::with_capacity(n_elements);

    for block in values.chunks_exact(Q8_0_BLOCK_SIZE) {
        let amax = block.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
        let scale = if amax == 0.0 { 0.0 } else { amax / 127.0 };
        let inv_scale = if scale == 0.0 { 0.0 } else { 1.0 / scale };

        scales.push(f16::from_f32(scale));
        codes.extend(
            block
                .iter()
                .map(|&v| (v * inv_scale).round().clamp(-128.0, 127.0) as i8),
        );
    }

    Ok(Q8Tensor {
        size: n_elements,
        scales,
        codes,
    })
}

/// Split `block_count` packed Q8_0 blocks into scale and code planes.
pub fn dequantize_block8(raw: &[u8], block_count: usize) -> QuantResult<(Vec<f16>, Vec<i8>)> {
    let expected = block_count * Q8_0_BLOCK_BYTES;
    if raw.len() != expected {
        return Err(QuantError::ShapeMismatch {
            expected: vec![expected],
            actual: vec![raw.len()],
        });
    }

    let mut scales = Vec::with_capacity(block_count);
    let mut codes = Vec::with_capacity(block_count * Q8_0_BLOCK_SIZE);
    for block in raw.chunks_exact(Q8_0_BLOCK_BYTES) {
        scales.push(f16::from_le_bytes([block[0], block[1]]));
        codes.extend(block[2..].iter().map(|&b| b as i8));
    }
    Ok((scales, codes))
}

/// Pack a Q8_0 tensor back into the container's block layout.
pub fn encode_block8(tensor: &Q8Tensor) -> Vec<u8> {
    let mut out = Vec::with_capacity(tensor.scales.len() * Q8_0_BLOCK_BYTES);
    for (scale, codes) in tensor
        .scales
        .iter()
        .zip(tensor.codes.chunks_exact(Q8_0_BLOCK_SIZE))
    {
        out.extend_from_slice(&scale.to_le_bytes());
        out.extend(codes.iter().map(|&c| c as u8));
    }
    out
}
