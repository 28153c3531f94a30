use std::collections::BTreeSet;

use gpuml_model::{ArchitectureDescriptor, ArchitectureTag};
use gpuml_quant::QuantScheme;

use crate::api::error::{PlanError, PlanResult};
use crate::core::planner::LayerPlanner;

/// Fixed table of (architecture, scheme) pairs that have a planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRegistry {
    entries: BTreeSet<(ArchitectureTag, QuantScheme)>,
}

impl CapabilityRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    /// Llama and Mistral with every scheme; the other families with F16 and Q8_0.
    pub fn standard() -> Self {
        let mut r = Self::empty();
        for tag in [ArchitectureTag::Llama, ArchitectureTag::Mistral] {
            for scheme in QuantScheme::ALL {
                r.register(tag, scheme);
            }
        }
        for tag in [
            ArchitectureTag::Qwen2,
            ArchitectureTag::Qwen3,
            ArchitectureTag::Phi3,
        ] {
            r.register(tag, QuantScheme::F16);
            r.register(tag, QuantScheme::Q8_0);
        }
        r
    }

    pub fn register(&mut self, tag: ArchitectureTag, scheme: QuantScheme) -> &mut Self {
        self.entries.insert((tag, scheme));
        self
    }

    pub fn supports(&self, tag: ArchitectureTag, scheme: QuantScheme) -> bool {
        self.entries.contains(&(tag, scheme))
    }

    pub fn pairs(&self) -> impl Iterator<Item = (ArchitectureTag, QuantScheme)> + '_ {
        self.entries.iter().copied()
    }

    /// Planner for a registered pair; any other pair is a capability error.
    pub fn planner(
        &self,
        arch: ArchitectureDescriptor,
        scheme: QuantScheme,
    ) -> PlanResult<LayerPlanner> {
        if !self.supports(arch.tag, scheme) {
            return Err(PlanError::Unregistered {
                arch: arch.tag.to_string(),
                scheme: scheme.to_string(),
            });
        }
        Ok(LayerPlanner::new(arch, scheme))
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let r = CapabilityRegistry::standard();
        assert!(r.supports(ArchitectureTag::Llama, QuantScheme::F32));
        assert!(r.supports(ArchitectureTag::Mistral, QuantScheme::Q8_0));
        assert!(r.supports(ArchitectureTag::Phi3, QuantScheme::F16));
        assert!(!r.supports(ArchitectureTag::Qwen2, QuantScheme::F32));
        assert_eq!(r.pairs().count(), 12);
    }

    #[test]
    fn test_unregistered_pair_is_error() {
        let r = CapabilityRegistry::standard();
        let arch = ArchitectureDescriptor::for_tag(ArchitectureTag::Qwen3);
        match r.planner(arch, QuantScheme::F32) {
            Err(PlanError::Unregistered { arch, scheme }) => {
                assert_eq!(arch, "qwen3");
                assert_eq!(scheme, "F32");
            }
            other => panic!("expected Unregistered, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_registry_refuses_everything() {
        let r = CapabilityRegistry::empty();
        let arch = ArchitectureDescriptor::for_tag(ArchitectureTag::Llama);
        assert!(r.planner(arch, QuantScheme::Q8_0).is_err());
    }
}
