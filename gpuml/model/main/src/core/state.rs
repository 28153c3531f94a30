use crate::api::types::*;

impl RuntimeState {
    /// Allocate every buffer the architecture's plan touches, zero-filled.
    pub fn new(config: &ModelConfiguration, arch: &ArchitectureDescriptor) -> Self {
        let ctx = config.context_length;
        let mut sizes = vec![
            (StateBuffer::X, config.dim),
            (StateBuffer::Xb, config.dim),
            (StateBuffer::Xb2, config.q_dim()),
            (StateBuffer::Q, config.q_dim()),
            (StateBuffer::K, config.kv_dim()),
            (StateBuffer::V, config.kv_dim()),
            (StateBuffer::Att, config.n_heads * ctx),
            (StateBuffer::Hb, config.hidden_dim),
            (StateBuffer::Hb2, config.hidden_dim),
            (StateBuffer::Logits, config.vocab_size),
            (StateBuffer::KeyCache, config.n_layers * ctx * config.kv_dim()),
            (StateBuffer::ValueCache, config.n_layers * ctx * config.kv_dim()),
            // Room for one partial sum per work-group at any local size.
            (StateBuffer::AttnScratch, config.dim),
            (StateBuffer::FfnScratch, config.dim),
            (StateBuffer::LogitsScratch, config.dim),
            (StateBuffer::HeadScratch, config.n_heads),
        ];
        if arch.fused_qkv {
            sizes.push((StateBuffer::Qkv, config.qkv_dim()));
        }
        if arch.fused_gate_up {
            sizes.push((StateBuffer::HbFused, 2 * config.hidden_dim));
        }

        Self {
            buffers: sizes.into_iter().map(|(b, n)| (b, vec![0.0; n])).collect(),
            position: 0,
            context_length: ctx,
        }
    }

    /// `None` for buffers this architecture does not allocate (and for `Position`).
    pub fn buffer(&self, b: StateBuffer) -> Option<&[f32]> {
        self.buffers.get(&b).map(Vec::as_slice)
    }

    pub fn buffer_mut(&mut self, b: StateBuffer) -> Option<&mut [f32]> {
        self.buffers.get_mut(&b).map(Vec::as_mut_slice)
    }

    /// Allocated buffers in a stable order.
    pub fn allocated(&self) -> Vec<StateBuffer> {
        let mut names: Vec<StateBuffer> = self.buffers.keys().copied().collect();
        names.sort();
        names
    }

    pub fn has(&self, b: StateBuffer) -> bool {
        b == StateBuffer::Position || self.buffers.contains_key(&b)
    }

    pub fn len(&self, b: StateBuffer) -> usize {
        match b {
            StateBuffer::Position => 1,
            _ => self.buffers.get(&b).map_or(0, Vec::len),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    /// Zero every buffer and rewind the position.
    pub fn reset(&mut self) {
        for buf in self.buffers.values_mut() {
            buf.fill(0.0);
        }
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfiguration {
        ModelConfiguration {
            architecture: "phi3".into(),
            dim: 64,
            hidden_dim: 128,
            n_layers: 2,
            n_heads: 4,
            n_kv_heads: 2,
            head_size: 16,
            vocab_size: 50,
            context_length: 32,
            norm_eps: 1e-5,
            rope_theta: 10000.0,
            rope_scaling: None,
        }
    }

    #[test]
    fn test_buffer_sizes() {
        let c = config();
        let s = RuntimeState::new(&c, &ArchitectureDescriptor::for_tag(ArchitectureTag::Llama));
        assert_eq!(s.len(StateBuffer::X), 64);
        assert_eq!(s.len(StateBuffer::K), 32);
        assert_eq!(s.len(StateBuffer::Att), 4 * 32);
        assert_eq!(s.len(StateBuffer::KeyCache), 2 * 32 * 32);
        assert_eq!(s.len(StateBuffer::Logits), 50);
        assert!(!s.has(StateBuffer::Qkv));
        assert!(!s.has(StateBuffer::HbFused));
        assert!(s.has(StateBuffer::Position));
    }

    #[test]
    fn test_fused_buffers() {
        let s = RuntimeState::new(&config(), &ArchitectureDescriptor::for_tag(ArchitectureTag::Phi3));
        assert_eq!(s.len(StateBuffer::Qkv), 64 + 2 * 32);
        assert_eq!(s.len(StateBuffer::HbFused), 256);
    }

    #[test]
    fn test_reset() {
        let mut s =
            RuntimeState::new(&config(), &ArchitectureDescriptor::for_tag(ArchitectureTag::Llama));
        s.buffer_mut(StateBuffer::X).unwrap()[3] = 2.0;
        s.set_position(5);
        s.reset();
        assert_eq!(s.position(), 0);
        assert!(s.buffer(StateBuffer::X).unwrap().iter().all(|&v| v == 0.0));
    }
}
