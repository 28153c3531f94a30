use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gpuml_gguf::TensorContainer;
use gpuml_quant::{QuantScheme, QuantizedTensor};

// ── Architecture ────────────────────────────────────────────────────

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchitectureTag {
    Llama,
    Mistral,
    Qwen2,
    Qwen3,
    Phi3,
}

impl ArchitectureTag {
    pub const ALL: [ArchitectureTag; 5] = [
        ArchitectureTag::Llama,
        ArchitectureTag::Mistral,
        ArchitectureTag::Qwen2,
        ArchitectureTag::Qwen3,
        ArchitectureTag::Phi3,
    ];

    /// Value of `general.architecture` for this family.
    pub fn name(&self) -> &'static str {
        match self {
            ArchitectureTag::Llama => "llama",
            ArchitectureTag::Mistral => "mistral",
            ArchitectureTag::Qwen2 => "qwen2",
            ArchitectureTag::Qwen3 => "qwen3",
            ArchitectureTag::Phi3 => "phi3",
        }
    }
}

impl fmt::Display for ArchitectureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pairing of rotated dimensions within a head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RopeStyle {
    /// Adjacent pairs `(2i, 2i+1)`.
    Interleaved,
    /// Split halves `(i, i + head_size/2)`.
    Neox,
}

/// Structural variant of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchitectureDescriptor {
    pub tag: ArchitectureTag,
    pub fused_qkv: bool,
    pub fused_gate_up: bool,
    pub qk_norm: bool,
    pub qkv_bias: bool,
    pub rope_style: RopeStyle,
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RopeScalingKind {
    /// Every frequency divided by the factor.
    Linear,
    /// Wavelength-dependent scaling between a low and a high frequency band.
    Llama3 {
        low_freq_factor: f32,
        high_freq_factor: f32,
        original_context: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeScaling {
    pub factor: f32,
    pub kind: RopeScalingKind,
}

/// Model hyper-parameters, derived entirely from container metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfiguration {
    /// Metadata key prefix (`general.architecture`).
    pub architecture: String,
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub head_size: usize,
    pub vocab_size: usize,
    pub context_length: usize,
    pub norm_eps: f32,
    pub rope_theta: f32,
    pub rope_scaling: Option<RopeScaling>,
}

/// Options applied while loading a model.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Cap on the context length (and therefore KV cache size).
    pub max_context: Option<usize>,
}

// ── Vocabulary ──────────────────────────────────────────────────────

/// Token table carried alongside the weights for the external tokenizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    pub tokens: Vec<String>,
    pub scores: Option<Vec<f32>>,
    pub bos_token_id: Option<u32>,
    pub eos_token_id: Option<u32>,
}

// ── Weights ─────────────────────────────────────────────────────────

/// Role of a weight buffer inside a layer or the shared tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeightRole {
    TokenEmbedding,
    AttnNorm,
    Q,
    K,
    V,
    Qkv,
    QBias,
    KBias,
    VBias,
    QNorm,
    KNorm,
    AttnOutput,
    FfnNorm,
    Gate,
    Up,
    GateUp,
    Down,
    OutputNorm,
    Output,
    RopeCos,
    RopeSin,
}

impl WeightRole {
    pub fn name(&self) -> &'static str {
        match self {
            WeightRole::TokenEmbedding => "token_embd",
            WeightRole::AttnNorm => "attn_norm",
            WeightRole::Q => "attn_q",
            WeightRole::K => "attn_k",
            WeightRole::V => "attn_v",
            WeightRole::Qkv => "attn_qkv",
            WeightRole::QBias => "attn_q.bias",
            WeightRole::KBias => "attn_k.bias",
            WeightRole::VBias => "attn_v.bias",
            WeightRole::QNorm => "attn_q_norm",
            WeightRole::KNorm => "attn_k_norm",
            WeightRole::AttnOutput => "attn_output",
            WeightRole::FfnNorm => "ffn_norm",
            WeightRole::Gate => "ffn_gate",
            WeightRole::Up => "ffn_up",
            WeightRole::GateUp => "ffn_up",
            WeightRole::Down => "ffn_down",
            WeightRole::OutputNorm => "output_norm",
            WeightRole::Output => "output",
            WeightRole::RopeCos => "rope_cos",
            WeightRole::RopeSin => "rope_sin",
        }
    }

    /// Roles stored as full-precision vectors rather than matrices.
    pub fn is_dense(&self) -> bool {
        matches!(
            self,
            WeightRole::AttnNorm
                | WeightRole::QBias
                | WeightRole::KBias
                | WeightRole::VBias
                | WeightRole::QNorm
                | WeightRole::KNorm
                | WeightRole::FfnNorm
                | WeightRole::OutputNorm
                | WeightRole::RopeCos
                | WeightRole::RopeSin
        )
    }
}

/// Identity of one weight buffer: a role, in a layer or shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightRef {
    pub layer: Option<usize>,
    pub role: WeightRole,
}

impl WeightRef {
    pub fn layer(layer: usize, role: WeightRole) -> Self {
        Self {
            layer: Some(layer),
            role,
        }
    }

    pub fn shared(role: WeightRole) -> Self {
        Self { layer: None, role }
    }
}

impl fmt::Display for WeightRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layer {
            Some(i) => write!(f, "blk.{}.{}", i, self.role.name()),
            None => f.write_str(self.role.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AttentionWeights {
    Separate {
        q: QuantizedTensor,
        k: QuantizedTensor,
        v: QuantizedTensor,
    },
    Fused {
        qkv: QuantizedTensor,
    },
}

#[derive(Debug, Clone)]
pub struct QkvBias {
    pub q: Vec<f32>,
    pub k: Vec<f32>,
    pub v: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct QkNorm {
    pub q: Vec<f32>,
    pub k: Vec<f32>,
}

#[derive(Debug, Clone)]
pub enum FfnWeights {
    Separate {
        gate: QuantizedTensor,
        up: QuantizedTensor,
    },
    /// Gate rows followed by up rows (`2 × hidden_dim` rows).
    Fused { gate_up: QuantizedTensor },
}

/// Tensors of one transformer layer. Norms and biases are always F32.
#[derive(Debug, Clone)]
pub struct LayerWeights {
    pub attn_norm: Vec<f32>,
    pub attention: AttentionWeights,
    pub bias: Option<QkvBias>,
    pub qk_norm: Option<QkNorm>,
    pub attn_output: QuantizedTensor,
    pub ffn_norm: Vec<f32>,
    pub ffn: FfnWeights,
    pub ffn_down: QuantizedTensor,
}

/// Precomputed rotary tables, `[context_length, head_size / 2]` row-major.
#[derive(Debug, Clone)]
pub struct RopeTables {
    pub cos: Vec<f32>,
    pub sin: Vec<f32>,
    pub half: usize,
    pub context_length: usize,
    pub style: RopeStyle,
}

/// All weights of a loaded model, for one (architecture, scheme) pair.
///
/// Immutable once assembled; shared read-only across sessions behind an `Arc`.
#[derive(Debug, Clone)]
pub struct WeightSet {
    pub scheme: QuantScheme,
    /// Embedding table as F32 `[vocab_size, dim]`.
    pub token_embedding: QuantizedTensor,
    pub layers: Vec<LayerWeights>,
    pub output_norm: Vec<f32>,
    /// `None` when the output projection is tied to the embedding table.
    pub output: Option<QuantizedTensor>,
    pub rope: RopeTables,
}

// ── Runtime state ───────────────────────────────────────────────────

/// Named per-session buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateBuffer {
    /// Residual stream `[dim]`.
    X,
    /// Normalized input `[dim]`.
    Xb,
    /// Attention output before projection `[n_heads * head_size]`.
    Xb2,
    Q,
    K,
    V,
    /// Fused QKV projection output (fused-QKV families only).
    Qkv,
    /// Attention scores `[n_heads, context_length]`.
    Att,
    Hb,
    Hb2,
    /// Fused gate/up output `[2 * hidden_dim]` (fused families only).
    HbFused,
    Logits,
    KeyCache,
    ValueCache,
    AttnScratch,
    FfnScratch,
    LogitsScratch,
    HeadScratch,
    Position,
}

impl StateBuffer {
    pub fn name(&self) -> &'static str {
        match self {
            StateBuffer::X => "x",
            StateBuffer::Xb => "xb",
            StateBuffer::Xb2 => "xb2",
            StateBuffer::Q => "q",
            StateBuffer::K => "k",
            StateBuffer::V => "v",
            StateBuffer::Qkv => "qkv",
            StateBuffer::Att => "att",
            StateBuffer::Hb => "hb",
            StateBuffer::Hb2 => "hb2",
            StateBuffer::HbFused => "hb_fused",
            StateBuffer::Logits => "logits",
            StateBuffer::KeyCache => "key_cache",
            StateBuffer::ValueCache => "value_cache",
            StateBuffer::AttnScratch => "attn_scratch",
            StateBuffer::FfnScratch => "ffn_scratch",
            StateBuffer::LogitsScratch => "logits_scratch",
            StateBuffer::HeadScratch => "head_scratch",
            StateBuffer::Position => "position",
        }
    }
}

impl fmt::Display for StateBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-session mutable state. Never shared between sessions.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub(crate) buffers: HashMap<StateBuffer, Vec<f32>>,
    pub(crate) position: usize,
    pub(crate) context_length: usize,
}

// ── Model ───────────────────────────────────────────────────────────

/// A loaded model: the handle returned to the orchestrator.
#[derive(Debug, Clone)]
pub struct Model {
    pub descriptor: ArchitectureDescriptor,
    pub config: ModelConfiguration,
    pub weights: Arc<WeightSet>,
    pub vocabulary: Vocabulary,
    /// Keeps the mapped region alive for the lifetime of the model.
    pub container: Arc<TensorContainer>,
}
