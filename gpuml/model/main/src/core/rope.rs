//! Rotary position tables.

use std::f32::consts::PI;

use crate::api::types::*;

/// Base frequencies `1 / theta^(2i / head_size)` with the configured scaling applied.
pub fn rope_frequencies(config: &ModelConfiguration) -> Vec<f32> {
    let half = config.head_size / 2;
    (0..half)
        .map(|i| {
            let freq = 1.0 / config.rope_theta.powf(2.0 * i as f32 / config.head_size as f32);
            match config.rope_scaling {
                None => freq,
                Some(scaling) => scale_frequency(freq, scaling),
            }
        })
        .collect()
}

fn scale_frequency(freq: f32, scaling: RopeScaling) -> f32 {
    match scaling.kind {
        RopeScalingKind::Linear => freq / scaling.factor,
        RopeScalingKind::Llama3 {
            low_freq_factor,
            high_freq_factor,
            original_context,
        } => {
            let old = original_context as f32;
            let low_freq_wavelen = old / low_freq_factor;
            let high_freq_wavelen = old / high_freq_factor;
            let wavelen = 2.0 * PI / freq;
            if wavelen < high_freq_wavelen {
                freq
            } else if wavelen > low_freq_wavelen {
                freq / scaling.factor
            } else {
                let smooth = (old / wavelen - low_freq_factor) / (high_freq_factor - low_freq_factor);
                (1.0 - smooth) * freq / scaling.factor + smooth * freq
            }
        }
    }
}

impl RopeTables {
    /// Build `[context_length, head_size / 2]` cos/sin tables.
    pub fn new(config: &ModelConfiguration, style: RopeStyle) -> Self {
        let freqs = rope_frequencies(config);
        let half = freqs.len();
        let mut cos = Vec::with_capacity(config.context_length * half);
        let mut sin = Vec::with_capacity(config.context_length * half);

        for pos in 0..config.context_length {
            for &freq in &freqs {
                let angle = pos as f32 * freq;
                cos.push(angle.cos());
                sin.push(angle.sin());
            }
        }

        Self {
            cos,
            sin,
            half,
            context_length: config.context_length,
            style,
        }
    }

    /// cos/sin rows for one position, `None` past the context.
    pub fn row(&self, position: usize) -> Option<(&[f32], &[f32])> {
        if position >= self.context_length {
            return None;
        }
        let start = position * self.half;
        let end = start + self.half;
        Some((self.cos.get(start..end)?, self.sin.get(start..end)?))
    }
}

/// Rotate pair `i` of one head in place.
pub fn rotate_pair(head: &mut [f32], i: usize, cos: f32, sin: f32, style: RopeStyle) {
    let half = head.len() / 2;
    let (a, b) = match style {
        RopeStyle::Interleaved => (2 * i, 2 * i + 1),
        RopeStyle::Neox => (i, i + half),
    };
    let (x0, x1) = (head[a], head[b]);
    head[a] = x0 * cos - x1 * sin;
    head[b] = x0 * sin + x1 * cos;
}
