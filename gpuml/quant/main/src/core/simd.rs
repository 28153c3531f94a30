//! Dot product kernels used by the projection rows.
//!
//! x86_64 dispatches to AVX2 at runtime; everything else takes the scalar path.

/// Scalar dot product for one Q8_0 block (32 elements).
fn dot_q8_block_scalar(input: &[f32], quantized: &[i8], scale: f32) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..32 {
        sum += input[i] * (quantized[i] as f32);
    }
    sum * scale
}

fn dot_f32_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = [0.0f32; 8];
    let chunks = a.len() / 8;
    for c in 0..chunks {
        let base = c * 8;
        for j in 0..8 {
            acc[j] += a[base + j] * b[base + j];
        }
    }
    let mut sum: f32 = acc.iter().sum();
    for i in chunks * 8..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    #[target_feature(enable = "avx2")]
    unsafe fn hsum(v: __m256) -> f32 {
        let hi = _mm256_extractf128_ps(v, 1);
        let lo = _mm256_castps256_ps128(v);
        let sum128 = _mm_add_ps(lo, hi);
        let shuf = _mm_movehdup_ps(sum128);
        let sums = _mm_add_ps(sum128, shuf);
        let shuf2 = _mm_movehl_ps(sums, sums);
        _mm_cvtss_f32(_mm_add_ss(sums, shuf2))
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_q8_block_avx2(input: &[f32], quantized: &[i8], scale: f32) -> f32 {
        let mut acc = _mm256_setzero_ps();
        for chunk in 0..4 {
            let base = chunk * 8;
            let inp = _mm256_loadu_ps(input.as_ptr().add(base));
            let q8 = _mm_loadl_epi64(quantized.as_ptr().add(base) as *const __m128i);
            let q_vec = _mm256_cvtepi32_ps(_mm256_cvtepi8_epi32(q8));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(inp, q_vec));
        }
        hsum(acc) * scale
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn dot_f32_avx2(a: &[f32], b: &[f32]) -> f32 {
        let chunks = a.len() / 8;
        let mut acc = _mm256_setzero_ps();
        for c in 0..chunks {
            let va = _mm256_loadu_ps(a.as_ptr().add(c * 8));
            let vb = _mm256_loadu_ps(b.as_ptr().add(c * 8));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
        }
        let mut sum = hsum(acc);
        for i in chunks * 8..a.len() {
            sum += a[i] * b[i];
        }
        sum
    }
}

/// Runtime-dispatched dot product for one Q8_0 block (32 elements).
pub fn dot_q8_block(input: &[f32], quantized: &[i8], scale: f32) -> f32 {
    assert!(input.len() >= 32 && quantized.len() >= 32);

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: avx2 detected; both slices hold at least 32 elements.
            return unsafe { x86::dot_q8_block_avx2(input, quantized, scale) };
        }
    }

    dot_q8_block_scalar(input, quantized, scale)
}

/// Runtime-dispatched f32 dot product over the common prefix of `a` and `b`.
pub fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: avx2 detected; loads stay within the first `n` elements.
            return unsafe { x86::dot_f32_avx2(a, b) };
        }
    }

    dot_f32_scalar(a, b)
}
