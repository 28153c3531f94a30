use std::time::Instant;

use gpuml_gguf::TensorContainer;
use gpuml_quant::{QuantError, QuantScheme, QuantizedTensor};

use crate::api::error::{ModelError, ModelResult};
use crate::api::types::*;

fn quant_error(e: QuantError) -> ModelError {
    match e {
        QuantError::UnsupportedFormat { tensor, ggml_type } => {
            ModelError::UnsupportedType { tensor, ggml_type }
        }
        other => ModelError::Quant(other),
    }
}

fn layer_name(layer: usize, suffix: &str) -> String {
    format!("blk.{}.{}", layer, suffix)
}

/// Binds named container tensors into typed weights.
struct Assembler<'a> {
    container: &'a TensorContainer,
    scheme: QuantScheme,
}

impl<'a> Assembler<'a> {
    fn load(&self, name: &str) -> ModelResult<QuantizedTensor> {
        let desc = self
            .container
            .descriptor(name)
            .ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;
        QuantizedTensor::from_container(self.container, desc).map_err(quant_error)
    }

    /// A tensor materialized as F32 with exactly `len` elements.
    fn dense(&self, name: &str, len: usize) -> ModelResult<Vec<f32>> {
        let values = self.load(name)?.as_f32();
        if values.len() != len {
            return Err(ModelError::ShapeMismatch {
                tensor: name.to_string(),
                expected: vec![len],
                actual: vec![values.len()],
            });
        }
        Ok(values)
    }

    fn check_shape(&self, name: &str, rows: usize, cols: usize) -> ModelResult<()> {
        let desc = self
            .container
            .descriptor(name)
            .ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;
        if desc.rows() != rows || desc.cols() != cols {
            return Err(ModelError::ShapeMismatch {
                tensor: name.to_string(),
                expected: vec![rows, cols],
                actual: desc.shape(),
            });
        }
        Ok(())
    }

    /// A `[rows, cols]` projection that must carry the weight-set scheme.
    fn matrix(&self, name: &str, rows: usize, cols: usize) -> ModelResult<QuantizedTensor> {
        self.check_shape(name, rows, cols)?;
        let tensor = self.load(name)?;
        if tensor.scheme() != self.scheme {
            return Err(ModelError::MixedQuantization {
                tensor: name.to_string(),
                expected: self.scheme.to_string(),
                actual: tensor.scheme().to_string(),
            });
        }
        Ok(tensor)
    }

    fn layer(
        &self,
        i: usize,
        config: &ModelConfiguration,
        arch: &ArchitectureDescriptor,
    ) -> ModelResult<LayerWeights> {
        let (dim, hidden) = (config.dim, config.hidden_dim);
        let (q_dim, kv_dim) = (config.q_dim(), config.kv_dim());

        let attention = if arch.fused_qkv {
            AttentionWeights::Fused {
                qkv: self.matrix(&layer_name(i, "attn_qkv.weight"), config.qkv_dim(), dim)?,
            }
        } else {
            AttentionWeights::Separate {
                q: self.matrix(&layer_name(i, "attn_q.weight"), q_dim, dim)?,
                k: self.matrix(&layer_name(i, "attn_k.weight"), kv_dim, dim)?,
                v: self.matrix(&layer_name(i, "attn_v.weight"), kv_dim, dim)?,
            }
        };

        let bias = if arch.qkv_bias {
            Some(QkvBias {
                q: self.dense(&layer_name(i, "attn_q.bias"), q_dim)?,
                k: self.dense(&layer_name(i, "attn_k.bias"), kv_dim)?,
                v: self.dense(&layer_name(i, "attn_v.bias"), kv_dim)?,
            })
        } else {
            None
        };

        let qk_norm = if arch.qk_norm {
            Some(QkNorm {
                q: self.dense(&layer_name(i, "attn_q_norm.weight"), config.head_size)?,
                k: self.dense(&layer_name(i, "attn_k_norm.weight"), config.head_size)?,
            })
        } else {
            None
        };

        let ffn = if arch.fused_gate_up {
            FfnWeights::Fused {
                gate_up: self.matrix(&layer_name(i, "ffn_up.weight"), 2 * hidden, dim)?,
            }
        } else {
            FfnWeights::Separate {
                gate: self.matrix(&layer_name(i, "ffn_gate.weight"), hidden, dim)?,
                up: self.matrix(&layer_name(i, "ffn_up.weight"), hidden, dim)?,
            }
        };

        Ok(LayerWeights {
            attn_norm: self.dense(&layer_name(i, "attn_norm.weight"), dim)?,
            attention,
            bias,
            qk_norm,
            attn_output: self.matrix(&layer_name(i, "attn_output.weight"), dim, q_dim)?,
            ffn_norm: self.dense(&layer_name(i, "ffn_norm.weight"), dim)?,
            ffn,
            ffn_down: self.matrix(&layer_name(i, "ffn_down.weight"), dim, hidden)?,
        })
    }
}

impl WeightSet {
    /// Assemble every tensor the architecture needs. Nothing partial is returned.
    pub fn from_container(
        container: &TensorContainer,
        config: &ModelConfiguration,
        arch: &ArchitectureDescriptor,
    ) -> ModelResult<Self> {
        let start = Instant::now();

        // The scheme of layer 0's query projection defines the weight set.
        let anchor = if arch.fused_qkv {
            "blk.0.attn_qkv.weight"
        } else {
            "blk.0.attn_q.weight"
        };
        let anchor_desc = container
            .descriptor(anchor)
            .ok_or_else(|| ModelError::MissingTensor(anchor.to_string()))?;
        let scheme = QuantScheme::for_tensor(anchor, anchor_desc.ggml_type).map_err(quant_error)?;
        config.check_scheme(scheme)?;

        let asm = Assembler { container, scheme };

        asm.check_shape("token_embd.weight", config.vocab_size, config.dim)?;
        let token_embedding = QuantizedTensor::F32(
            asm.dense("token_embd.weight", config.vocab_size * config.dim)?,
        );

        let layers = (0..config.n_layers)
            .map(|i| asm.layer(i, config, arch))
            .collect::<ModelResult<Vec<_>>>()?;

        let output = if container.contains("output.weight") {
            asm.check_shape("output.weight", config.vocab_size, config.dim)?;
            let tensor = asm.load("output.weight")?;
            config.check_output_scheme(tensor.scheme())?;
            Some(tensor)
        } else {
            None
        };

        let weights = Self {
            scheme,
            token_embedding,
            layers,
            output_norm: asm.dense("output_norm.weight", config.dim)?,
            output,
            rope: RopeTables::new(config, arch.rope_style),
        };

        log::info!(
            "Assembled {} weight set: {} layers, output {}",
            scheme,
            config.n_layers,
            match &weights.output {
                Some(t) => t.scheme().name(),
                None => "tied to embedding",
            }
        );
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "[perf] model::assemble_weights {:.3}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(weights)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_tied(&self) -> bool {
        self.output.is_none()
    }

    /// Output projection, falling back to the embedding table.
    pub fn output_projection(&self) -> &QuantizedTensor {
        self.output.as_ref().unwrap_or(&self.token_embedding)
    }

    /// Look up a matrix-shaped weight.
    pub fn matrix(&self, r: WeightRef) -> Option<&QuantizedTensor> {
        match (r.layer, r.role) {
            (None, WeightRole::TokenEmbedding) => Some(&self.token_embedding),
            (None, WeightRole::Output) => Some(self.output_projection()),
            (Some(i), role) => {
                let layer = self.layers.get(i)?;
                match (role, &layer.attention, &layer.ffn) {
                    (WeightRole::Q, AttentionWeights::Separate { q, .. }, _) => Some(q),
                    (WeightRole::K, AttentionWeights::Separate { k, .. }, _) => Some(k),
                    (WeightRole::V, AttentionWeights::Separate { v, .. }, _) => Some(v),
                    (WeightRole::Qkv, AttentionWeights::Fused { qkv }, _) => Some(qkv),
                    (WeightRole::AttnOutput, _, _) => Some(&layer.attn_output),
                    (WeightRole::Gate, _, FfnWeights::Separate { gate, .. }) => Some(gate),
                    (WeightRole::Up, _, FfnWeights::Separate { up, .. }) => Some(up),
                    (WeightRole::GateUp, _, FfnWeights::Fused { gate_up }) => Some(gate_up),
                    (WeightRole::Down, _, _) => Some(&layer.ffn_down),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Look up a full-precision vector weight (norms, biases, RoPE tables).
    pub fn dense(&self, r: WeightRef) -> Option<&[f32]> {
        match (r.layer, r.role) {
            (None, WeightRole::OutputNorm) => Some(&self.output_norm),
            (None, WeightRole::RopeCos) => Some(&self.rope.cos),
            (None, WeightRole::RopeSin) => Some(&self.rope.sin),
            (Some(i), role) => {
                let layer = self.layers.get(i)?;
                match role {
                    WeightRole::AttnNorm => Some(&layer.attn_norm),
                    WeightRole::FfnNorm => Some(&layer.ffn_norm),
                    WeightRole::QBias => layer.bias.as_ref().map(|b| b.q.as_slice()),
                    WeightRole::KBias => layer.bias.as_ref().map(|b| b.k.as_slice()),
                    WeightRole::VBias => layer.bias.as_ref().map(|b| b.v.as_slice()),
                    WeightRole::QNorm => layer.qk_norm.as_ref().map(|n| n.q.as_slice()),
                    WeightRole::KNorm => layer.qk_norm.as_ref().map(|n| n.k.as_slice()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn contains(&self, r: WeightRef) -> bool {
        if r.role.is_dense() {
            self.dense(r).is_some()
        } else {
            self.matrix(r).is_some()
        }
    }
}
