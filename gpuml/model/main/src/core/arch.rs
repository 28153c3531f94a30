use gpuml_gguf::Metadata;

use crate::api::error::{ModelError, ModelResult};
use crate::api::types::*;

impl ArchitectureDescriptor {
    /// Structural flags of a family.
    pub const fn for_tag(tag: ArchitectureTag) -> Self {
        let (fused_qkv, fused_gate_up, qk_norm, qkv_bias, rope_style) = match tag {
            ArchitectureTag::Llama | ArchitectureTag::Mistral => {
                (false, false, false, false, RopeStyle::Interleaved)
            }
            ArchitectureTag::Qwen2 => (false, false, false, true, RopeStyle::Neox),
            ArchitectureTag::Qwen3 => (false, false, true, false, RopeStyle::Neox),
            ArchitectureTag::Phi3 => (true, true, false, false, RopeStyle::Neox),
        };
        Self {
            tag,
            fused_qkv,
            fused_gate_up,
            qk_norm,
            qkv_bias,
            rope_style,
        }
    }
}

/// Pick the family from `general.architecture` (and `general.name` for Mistral
/// checkpoints published under the llama tag).
pub fn resolve_architecture(metadata: &Metadata) -> ModelResult<ArchitectureDescriptor> {
    let arch = metadata
        .get_str("general.architecture")
        .ok_or_else(|| ModelError::MissingMetadata("general.architecture".to_string()))?;

    let tag = match arch {
        "llama" => {
            let name = metadata.get_str("general.name").unwrap_or("");
            if name.to_ascii_lowercase().contains("mistral") {
                ArchitectureTag::Mistral
            } else {
                ArchitectureTag::Llama
            }
        }
        "mistral" => ArchitectureTag::Mistral,
        "qwen2" => ArchitectureTag::Qwen2,
        "qwen3" => ArchitectureTag::Qwen3,
        "phi3" => ArchitectureTag::Phi3,
        other => return Err(ModelError::UnsupportedArchitecture(other.to_string())),
    };

    Ok(ArchitectureDescriptor::for_tag(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuml_gguf::GGUFValue;
    use std::collections::HashMap;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        let values: HashMap<String, GGUFValue> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), GGUFValue::String(v.to_string())))
            .collect();
        Metadata::new(values)
    }

    #[test]
    fn test_resolve_each_family() {
        for tag in ArchitectureTag::ALL {
            let md = metadata(&[("general.architecture", tag.name())]);
            assert_eq!(resolve_architecture(&md).unwrap().tag, tag);
        }
    }

    #[test]
    fn test_mistral_under_llama_tag() {
        let md = metadata(&[
            ("general.architecture", "llama"),
            ("general.name", "Mistral-7B-Instruct-v0.2"),
        ]);
        let desc = resolve_architecture(&md).unwrap();
        assert_eq!(desc.tag, ArchitectureTag::Mistral);
        assert_eq!(desc.rope_style, RopeStyle::Interleaved);
    }

    #[test]
    fn test_structural_flags() {
        let phi = ArchitectureDescriptor::for_tag(ArchitectureTag::Phi3);
        assert!(phi.fused_qkv && phi.fused_gate_up);
        assert!(ArchitectureDescriptor::for_tag(ArchitectureTag::Qwen2).qkv_bias);
        assert!(ArchitectureDescriptor::for_tag(ArchitectureTag::Qwen3).qk_norm);
        let llama = ArchitectureDescriptor::for_tag(ArchitectureTag::Llama);
        assert!(!llama.fused_qkv && !llama.qk_norm && !llama.qkv_bias);
    }

    #[test]
    fn test_unknown_architecture() {
        let md = metadata(&[("general.architecture", "mamba")]);
        assert!(matches!(
            resolve_architecture(&md),
            Err(ModelError::UnsupportedArchitecture(a)) if a == "mamba"
        ));
    }

    #[test]
    fn test_missing_architecture_key() {
        assert!(matches!(
            resolve_architecture(&metadata(&[])),
            Err(ModelError::MissingMetadata(_))
        ));
    }
}
