use gpuml_model::StateBuffer;

use crate::api::types::*;

impl KernelOp {
    /// Short op label, e.g. for plan listings.
    pub fn label(&self) -> &'static str {
        match self {
            KernelOp::RmsReduce { .. } => "rms-reduce",
            KernelOp::RmsApply { .. } => "rms-apply",
            KernelOp::HeadRmsNorm { .. } => "head-rms-norm",
            KernelOp::Matmul { .. } => "matmul",
            KernelOp::SplitQkv { .. } => "split-qkv",
            KernelOp::Rope { .. } => "rope",
            KernelOp::KvCacheWrite { .. } => "kv-cache-write",
            KernelOp::Attention { .. } => "attention",
            KernelOp::SiluGate { .. } => "silu-gate",
        }
    }

    /// Buffers the kernel reads, including the position where it is used.
    pub fn reads(&self) -> Vec<BufferId> {
        let pos = BufferId::State(StateBuffer::Position);
        match self {
            KernelOp::RmsReduce { input, .. } => vec![(*input).into()],
            KernelOp::RmsApply {
                input,
                scratch,
                weight,
                ..
            } => vec![(*input).into(), (*scratch).into(), (*weight).into()],
            KernelOp::HeadRmsNorm { buffer, weight, .. } => {
                vec![(*buffer).into(), (*weight).into()]
            }
            KernelOp::Matmul {
                weight,
                input,
                output,
                bias,
                residual,
                ..
            } => {
                let mut r = vec![(*weight).into(), (*input).into()];
                if let Some(b) = bias {
                    r.push((*b).into());
                }
                if *residual {
                    r.push((*output).into());
                }
                r
            }
            KernelOp::SplitQkv { input, .. } => vec![(*input).into()],
            KernelOp::Rope {
                q, k, cos, sin, ..
            } => vec![
                (*q).into(),
                (*k).into(),
                (*cos).into(),
                (*sin).into(),
                pos,
            ],
            KernelOp::KvCacheWrite { k, v, .. } => vec![(*k).into(), (*v).into(), pos],
            KernelOp::Attention {
                q,
                key_cache,
                value_cache,
                ..
            } => vec![
                (*q).into(),
                (*key_cache).into(),
                (*value_cache).into(),
                pos,
            ],
            KernelOp::SiluGate { input, .. } => match input {
                SiluInput::Separate { gate, up } => vec![(*gate).into(), (*up).into()],
                SiluInput::Fused { gate_up } => vec![(*gate_up).into()],
            },
        }
    }

    /// Buffers the kernel writes.
    pub fn writes(&self) -> Vec<BufferId> {
        match self {
            KernelOp::RmsReduce { scratch, .. } => vec![(*scratch).into()],
            KernelOp::RmsApply { output, .. } => vec![(*output).into()],
            KernelOp::HeadRmsNorm {
                buffer, scratch, ..
            } => vec![(*buffer).into(), (*scratch).into()],
            KernelOp::Matmul { output, .. } => vec![(*output).into()],
            KernelOp::SplitQkv { q, k, v, .. } => vec![(*q).into(), (*k).into(), (*v).into()],
            KernelOp::Rope { q, k, .. } => vec![(*q).into(), (*k).into()],
            KernelOp::KvCacheWrite {
                key_cache,
                value_cache,
                ..
            } => vec![(*key_cache).into(), (*value_cache).into()],
            KernelOp::Attention { scores, output, .. } => {
                vec![(*scores).into(), (*output).into()]
            }
            KernelOp::SiluGate { output, .. } => vec![(*output).into()],
        }
    }

    /// Every buffer argument, reads first, without duplicates.
    pub fn arguments(&self) -> Vec<BufferId> {
        let mut args = self.reads();
        for w in self.writes() {
            if !args.contains(&w) {
                args.push(w);
            }
        }
        args
    }

    /// The dimension the kernel parallelizes over.
    pub fn shape(&self) -> ParallelShape {
        match self {
            KernelOp::RmsReduce { len, .. } => ParallelShape::Reduction(*len),
            KernelOp::RmsApply { len, .. } => ParallelShape::Reduction(*len),
            KernelOp::HeadRmsNorm {
                heads, head_size, ..
            } => ParallelShape::Heads {
                heads: *heads,
                head_size: *head_size,
            },
            KernelOp::Matmul { rows, .. } => ParallelShape::Rows(*rows),
            KernelOp::SplitQkv { q_dim, kv_dim, .. } => ParallelShape::Elements(q_dim + 2 * kv_dim),
            KernelOp::Rope {
                n_heads,
                n_kv_heads,
                head_size,
                ..
            } => ParallelShape::Pairs {
                heads: (*n_heads).max(*n_kv_heads),
                half: head_size / 2,
            },
            KernelOp::KvCacheWrite { kv_dim, .. } => ParallelShape::Elements(*kv_dim),
            KernelOp::Attention {
                n_heads, head_size, ..
            } => ParallelShape::Heads {
                heads: *n_heads,
                head_size: *head_size,
            },
            KernelOp::SiluGate { hidden, .. } => ParallelShape::Elements(*hidden),
        }
    }
}
