//! Seeded synthetic model containers.

use std::path::Path;
use std::sync::Arc;

use gpuml_gguf::{GgufBuilder, GgufError, TensorContainer};
use gpuml_quant::{QuantScheme, QuantizedTensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::api::error::ModelResult;
use crate::api::types::*;

/// Shape and content of a toy model. Every projection is stored in `scheme`;
/// norms and biases are stored as F32.
#[derive(Debug, Clone)]
pub struct ToyModelSpec {
    pub arch: ArchitectureTag,
    pub scheme: QuantScheme,
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub vocab_size: usize,
    pub context_length: usize,
    pub seed: u64,
    /// Omit `output.weight` so the embedding is reused.
    pub tied_output: bool,
    /// Tensor names left out of the container.
    pub omit: Vec<String>,
    /// Per-tensor scheme overrides.
    pub overrides: Vec<(String, QuantScheme)>,
}

impl ToyModelSpec {
    pub fn new(arch: ArchitectureTag, scheme: QuantScheme) -> Self {
        Self {
            arch,
            scheme,
            dim: 64,
            hidden_dim: 128,
            n_layers: 2,
            n_heads: 4,
            n_kv_heads: 2,
            vocab_size: 48,
            context_length: 32,
            seed: 42,
            tied_output: false,
            omit: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn head_size(&self) -> usize {
        self.dim / self.n_heads
    }

    fn scheme_for(&self, name: &str) -> QuantScheme {
        self.overrides
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
            .unwrap_or(self.scheme)
    }

    /// Encode the container bytes.
    pub fn build(&self) -> ModelResult<Vec<u8>> {
        Ok(self.builder()?.build())
    }

    /// The populated container builder, for callers that add or alter tensors.
    pub fn builder(&self) -> ModelResult<GgufBuilder> {
        let arch = ArchitectureDescriptor::for_tag(self.arch);
        let prefix = self.arch.name();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut b = GgufBuilder::new();

        b.add_string("general.architecture", prefix)
            .add_string("general.name", &format!("toy-{}", prefix))
            .add_u32(&format!("{prefix}.embedding_length"), self.dim as u32)
            .add_u32(&format!("{prefix}.feed_forward_length"), self.hidden_dim as u32)
            .add_u32(&format!("{prefix}.block_count"), self.n_layers as u32)
            .add_u32(&format!("{prefix}.attention.head_count"), self.n_heads as u32)
            .add_u32(&format!("{prefix}.attention.head_count_kv"), self.n_kv_heads as u32)
            .add_u32(&format!("{prefix}.context_length"), self.context_length as u32)
            .add_f32(&format!("{prefix}.attention.layer_norm_rms_epsilon"), 1e-5)
            .add_f32(&format!("{prefix}.rope.freq_base"), 10000.0)
            .add_u32("tokenizer.ggml.bos_token_id", 1)
            .add_u32("tokenizer.ggml.eos_token_id", 2);
        let tokens: Vec<String> = (0..self.vocab_size).map(|i| format!("<t{}>", i)).collect();
        let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        b.add_string_array("tokenizer.ggml.tokens", &token_refs);

        let head = self.head_size();
        let q_dim = self.n_heads * head;
        let kv_dim = self.n_kv_heads * head;
        let (dim, hidden) = (self.dim, self.hidden_dim);

        let mut tensors: Vec<(String, usize, usize)> = Vec::new();
        let mut matrix =
            |name: String, rows: usize, cols: usize| tensors.push((name, rows, cols));
        matrix("token_embd.weight".into(), self.vocab_size, dim);
        for i in 0..self.n_layers {
            if arch.fused_qkv {
                matrix(format!("blk.{i}.attn_qkv.weight"), q_dim + 2 * kv_dim, dim);
            } else {
                matrix(format!("blk.{i}.attn_q.weight"), q_dim, dim);
                matrix(format!("blk.{i}.attn_k.weight"), kv_dim, dim);
                matrix(format!("blk.{i}.attn_v.weight"), kv_dim, dim);
            }
            matrix(format!("blk.{i}.attn_output.weight"), dim, q_dim);
            if arch.fused_gate_up {
                matrix(format!("blk.{i}.ffn_up.weight"), 2 * hidden, dim);
            } else {
                matrix(format!("blk.{i}.ffn_gate.weight"), hidden, dim);
                matrix(format!("blk.{i}.ffn_up.weight"), hidden, dim);
            }
            matrix(format!("blk.{i}.ffn_down.weight"), dim, hidden);
        }
        if !self.tied_output {
            matrix("output.weight".into(), self.vocab_size, dim);
        }

        let mut vectors: Vec<(String, usize, bool)> = Vec::new();
        for i in 0..self.n_layers {
            vectors.push((format!("blk.{i}.attn_norm.weight"), dim, true));
            vectors.push((format!("blk.{i}.ffn_norm.weight"), dim, true));
            if arch.qkv_bias {
                vectors.push((format!("blk.{i}.attn_q.bias"), q_dim, false));
                vectors.push((format!("blk.{i}.attn_k.bias"), kv_dim, false));
                vectors.push((format!("blk.{i}.attn_v.bias"), kv_dim, false));
            }
            if arch.qk_norm {
                vectors.push((format!("blk.{i}.attn_q_norm.weight"), head, true));
                vectors.push((format!("blk.{i}.attn_k_norm.weight"), head, true));
            }
        }
        vectors.push(("output_norm.weight".into(), dim, true));

        for (name, rows, cols) in tensors {
            let bound = 1.0 / (cols as f32).sqrt();
            let values: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-bound..bound)).collect();
            if self.omit.contains(&name) {
                continue;
            }
            let scheme = self.scheme_for(&name);
            let encoded = QuantizedTensor::from_f32(&values, scheme)?;
            b.add_tensor_raw(&name, &[cols, rows], scheme.ggml_type(), encoded.to_bytes());
        }

        for (name, len, is_norm) in vectors {
            let values: Vec<f32> = (0..len)
                .map(|_| {
                    let noise = rng.gen_range(-0.1f32..0.1);
                    if is_norm {
                        1.0 + noise
                    } else {
                        noise
                    }
                })
                .collect();
            if self.omit.contains(&name) {
                continue;
            }
            b.add_tensor_f32(&name, &[len], &values);
        }

        Ok(b)
    }

    /// Write the container to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> ModelResult<()> {
        let bytes = self.build()?;
        std::fs::write(path, bytes).map_err(GgufError::from)?;
        Ok(())
    }

    /// Build and load in memory.
    pub fn model(&self, options: &LoadOptions) -> ModelResult<Model> {
        let container = TensorContainer::from_bytes(self.build()?)?;
        Model::from_container(Arc::new(container), options)
    }
}
