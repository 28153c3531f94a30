use gpuml_gguf::Metadata;
use gpuml_quant::QuantScheme;

use crate::api::error::{ModelError, ModelResult};
use crate::api::types::*;

const DEFAULT_NORM_EPS: f32 = 1e-5;
const DEFAULT_ROPE_THETA: f32 = 10000.0;
const LLAMA3_LOW_FREQ_FACTOR: f32 = 1.0;
const LLAMA3_HIGH_FREQ_FACTOR: f32 = 4.0;
const LLAMA3_ORIGINAL_CONTEXT: usize = 8192;

struct Keys<'a> {
    metadata: &'a Metadata,
    prefix: &'a str,
}

impl<'a> Keys<'a> {
    fn key(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    fn optional(&self, suffix: &str) -> Option<usize> {
        self.metadata.get_usize(&self.key(suffix))
    }

    fn required(&self, suffix: &str) -> ModelResult<usize> {
        self.optional(suffix)
            .ok_or_else(|| ModelError::MissingMetadata(self.key(suffix)))
    }

    fn f32_or(&self, suffix: &str, default: f32) -> f32 {
        self.metadata.get_f32(&self.key(suffix)).unwrap_or(default)
    }
}

impl ModelConfiguration {
    /// Read the configuration from `<arch>.*` metadata keys.
    pub fn from_metadata(
        metadata: &Metadata,
        descriptor: &ArchitectureDescriptor,
    ) -> ModelResult<Self> {
        let prefix = metadata
            .get_str("general.architecture")
            .ok_or_else(|| ModelError::MissingMetadata("general.architecture".to_string()))?;
        let keys = Keys { metadata, prefix };

        let dim = keys.required("embedding_length")?;
        let n_heads = keys.required("attention.head_count")?;
        // Grouping comes from metadata only; absent means plain multi-head attention.
        let n_kv_heads = keys.optional("attention.head_count_kv").unwrap_or(n_heads);
        let head_size = match keys.optional("attention.key_length") {
            Some(h) => h,
            None if n_heads > 0 => dim / n_heads,
            None => 0,
        };
        let vocab_size = keys
            .optional("vocab_size")
            .or_else(|| metadata.array_len("tokenizer.ggml.tokens"))
            .ok_or_else(|| ModelError::MissingMetadata(keys.key("vocab_size")))?;

        let config = Self {
            architecture: prefix.to_string(),
            dim,
            hidden_dim: keys.required("feed_forward_length")?,
            n_layers: keys.required("block_count")?,
            n_heads,
            n_kv_heads,
            head_size,
            vocab_size,
            context_length: keys.required("context_length")?,
            norm_eps: keys.f32_or("attention.layer_norm_rms_epsilon", DEFAULT_NORM_EPS),
            rope_theta: keys.f32_or("rope.freq_base", DEFAULT_ROPE_THETA),
            rope_scaling: rope_scaling(&keys, descriptor)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Width of the query projection (`n_heads * head_size`).
    pub fn q_dim(&self) -> usize {
        self.n_heads * self.head_size
    }

    /// Width of the key and value projections.
    pub fn kv_dim(&self) -> usize {
        self.n_kv_heads * self.head_size
    }

    /// Query heads per key/value head.
    pub fn kv_group(&self) -> usize {
        self.n_heads / self.n_kv_heads
    }

    /// Rows of the fused QKV projection.
    pub fn qkv_dim(&self) -> usize {
        self.q_dim() + 2 * self.kv_dim()
    }

    /// Cap the context length; never raises it.
    pub fn with_max_context(mut self, max_context: Option<usize>) -> Self {
        if let Some(cap) = max_context {
            self.context_length = self.context_length.min(cap.max(1));
        }
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        let fields = [
            ("embedding_length", self.dim),
            ("feed_forward_length", self.hidden_dim),
            ("block_count", self.n_layers),
            ("attention.head_count", self.n_heads),
            ("attention.head_count_kv", self.n_kv_heads),
            ("head size", self.head_size),
            ("vocab_size", self.vocab_size),
            ("context_length", self.context_length),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::InvalidConfig(format!("{} must be non-zero", name)));
        }
        if self.n_heads % self.n_kv_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "head count {} is not a multiple of kv head count {}",
                self.n_heads, self.n_kv_heads
            )));
        }
        if self.head_size % 2 != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "head size {} must be even for rotary encoding",
                self.head_size
            )));
        }
        if !(self.norm_eps > 0.0 && self.norm_eps.is_finite()) {
            return Err(ModelError::InvalidConfig(format!(
                "invalid norm epsilon {}",
                self.norm_eps
            )));
        }
        if !(self.rope_theta > 0.0 && self.rope_theta.is_finite()) {
            return Err(ModelError::InvalidConfig(format!(
                "invalid rope base {}",
                self.rope_theta
            )));
        }
        Ok(())
    }

    /// Matrix inner dimensions must be whole Q8_0 blocks.
    pub fn check_scheme(&self, scheme: QuantScheme) -> ModelResult<()> {
        let block = scheme.block_size();
        for (name, v) in [
            ("embedding_length", self.dim),
            ("feed_forward_length", self.hidden_dim),
            ("attention width", self.q_dim()),
        ] {
            if v % block != 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "{} {} is not a multiple of the {}-element {} block",
                    name, v, block, scheme
                )));
            }
        }
        Ok(())
    }

    /// The output projection reads rows of `dim` values in its own scheme.
    pub fn check_output_scheme(&self, scheme: QuantScheme) -> ModelResult<()> {
        let block = scheme.block_size();
        if self.dim % block != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "output.weight is {} but embedding_length {} is not a multiple of its {}-element block",
                scheme, self.dim, block
            )));
        }
        Ok(())
    }
}

fn rope_scaling(
    keys: &Keys<'_>,
    descriptor: &ArchitectureDescriptor,
) -> ModelResult<Option<RopeScaling>> {
    let factor = keys.metadata.get_f32(&keys.key("rope.scaling.factor"));
    let kind = keys.metadata.get_str(&keys.key("rope.scaling.type"));
    let original_context = keys
        .optional("rope.scaling.original_context_length")
        .unwrap_or(LLAMA3_ORIGINAL_CONTEXT);

    let llama3 = |factor: f32| RopeScaling {
        factor,
        kind: RopeScalingKind::Llama3 {
            low_freq_factor: LLAMA3_LOW_FREQ_FACTOR,
            high_freq_factor: LLAMA3_HIGH_FREQ_FACTOR,
            original_context,
        },
    };

    match (kind, factor) {
        (None | Some("none"), None) => Ok(None),
        (Some("none"), Some(_)) => Ok(None),
        (_, Some(f)) if !(f > 0.0 && f.is_finite()) => Err(ModelError::InvalidConfig(format!(
            "invalid rope scaling factor {}",
            f
        ))),
        (Some("linear"), Some(f)) => Ok(Some(RopeScaling {
            factor: f,
            kind: RopeScalingKind::Linear,
        })),
        (Some("llama3"), Some(f)) => Ok(Some(llama3(f))),
        (None, Some(f)) if f > 1.0 && descriptor.tag == ArchitectureTag::Llama => {
            Ok(Some(llama3(f)))
        }
        (None, Some(_)) | (Some("linear" | "llama3"), None) => Ok(None),
        (Some(other), _) => Err(ModelError::InvalidConfig(format!(
            "unsupported rope scaling type '{}'",
            other
        ))),
    }
}
