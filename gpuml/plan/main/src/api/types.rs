use std::collections::BTreeMap;
use std::fmt;

use gpuml_model::{ArchitectureTag, RopeStyle, StateBuffer, WeightRef};
use gpuml_quant::QuantScheme;

// ── Buffers ─────────────────────────────────────────────────────────

/// Identity of one device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferId {
    State(StateBuffer),
    Weight(WeightRef),
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferId::State(s) => write!(f, "{}", s),
            BufferId::Weight(w) => write!(f, "{}", w),
        }
    }
}

impl From<StateBuffer> for BufferId {
    fn from(s: StateBuffer) -> Self {
        BufferId::State(s)
    }
}

impl From<WeightRef> for BufferId {
    fn from(w: WeightRef) -> Self {
        BufferId::Weight(w)
    }
}

// ── Kernels ─────────────────────────────────────────────────────────

/// Inputs of the gated activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SiluInput {
    Separate { gate: StateBuffer, up: StateBuffer },
    /// Gate values in the first half, up values in the second.
    Fused { gate_up: StateBuffer },
}

/// One kernel and its concrete arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelOp {
    /// Per-work-group partial sums of squares into `scratch`.
    RmsReduce {
        input: StateBuffer,
        scratch: StateBuffer,
        len: usize,
    },
    /// `output = weight * input / rms`, with the mean square taken from `scratch`.
    RmsApply {
        input: StateBuffer,
        output: StateBuffer,
        scratch: StateBuffer,
        weight: WeightRef,
        len: usize,
        eps: f32,
    },
    /// RMS norm applied independently to each head of `buffer`.
    HeadRmsNorm {
        buffer: StateBuffer,
        scratch: StateBuffer,
        weight: WeightRef,
        heads: usize,
        head_size: usize,
        eps: f32,
    },
    /// `output[r] (+)= dot(weight[r], input) (+ bias[r])` for `rows` rows.
    Matmul {
        weight: WeightRef,
        input: StateBuffer,
        output: StateBuffer,
        rows: usize,
        cols: usize,
        bias: Option<WeightRef>,
        residual: bool,
        scheme: QuantScheme,
    },
    /// Copy the fused QKV output into the separate Q, K and V buffers.
    SplitQkv {
        input: StateBuffer,
        q: StateBuffer,
        k: StateBuffer,
        v: StateBuffer,
        q_dim: usize,
        kv_dim: usize,
    },
    /// Rotate Q (all heads) and K (kv heads) at the current position.
    Rope {
        q: StateBuffer,
        k: StateBuffer,
        cos: WeightRef,
        sin: WeightRef,
        n_heads: usize,
        n_kv_heads: usize,
        head_size: usize,
        style: RopeStyle,
    },
    /// Store K and V at the current position of this layer's cache slot.
    KvCacheWrite {
        k: StateBuffer,
        v: StateBuffer,
        key_cache: StateBuffer,
        value_cache: StateBuffer,
        layer: usize,
        kv_dim: usize,
        context_length: usize,
    },
    /// Scaled dot-product attention over positions `0..=position`.
    Attention {
        q: StateBuffer,
        key_cache: StateBuffer,
        value_cache: StateBuffer,
        scores: StateBuffer,
        output: StateBuffer,
        layer: usize,
        n_heads: usize,
        n_kv_heads: usize,
        head_size: usize,
        context_length: usize,
    },
    /// `output = silu(gate) * up`.
    SiluGate {
        input: SiluInput,
        output: StateBuffer,
        hidden: usize,
    },
}

/// Natural parallel extent of a kernel, from which its grid is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelShape {
    Reduction(usize),
    Rows(usize),
    Pairs { heads: usize, half: usize },
    Heads { heads: usize, head_size: usize },
    Elements(usize),
}

/// A named kernel invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelTask {
    pub name: String,
    pub op: KernelOp,
}

// ── Graphs ──────────────────────────────────────────────────────────

/// Token for buffers left resident on the device by one graph.
///
/// Only the planner creates handles; a graph that consumes one names its producer explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidentHandle {
    pub(crate) producer: String,
    pub(crate) buffers: Vec<BufferId>,
}

/// A compiled task graph: kernels in order plus transfer directives.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGraph {
    pub(crate) name: String,
    pub(crate) consumes: Option<ResidentHandle>,
    /// Transferred host→device on the first execution only.
    pub(crate) upload_once: Vec<BufferId>,
    /// Transferred host→device on every execution.
    pub(crate) upload_every: Vec<BufferId>,
    pub(crate) tasks: Vec<KernelTask>,
    /// Left resident for the next graph.
    pub(crate) persist: Vec<BufferId>,
    /// Transferred device→host on every execution.
    pub(crate) download: Vec<BufferId>,
}

// ── Grids ───────────────────────────────────────────────────────────

/// Launch geometry of one kernel. 1-D grids keep index 1 at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGrid {
    pub(crate) global: [usize; 2],
    pub(crate) local: [usize; 2],
    pub(crate) dims: u8,
}

/// Grid launch map keyed `"<graph>.<kernel>"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSchedule {
    pub(crate) grids: BTreeMap<String, WorkerGrid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Generic,
}

/// Work-group sizing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPolicy {
    pub vendor: DeviceVendor,
    pub projection_local: usize,
    pub reduction_local: usize,
    pub elementwise_local: usize,
    pub attention_max_local: usize,
}

// ── Plan ────────────────────────────────────────────────────────────

/// Ordered graphs plus their schedule, reused unchanged for every decode step.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub(crate) arch: ArchitectureTag,
    pub(crate) scheme: QuantScheme,
    pub(crate) graphs: Vec<TaskGraph>,
    pub(crate) schedule: GridSchedule,
}
