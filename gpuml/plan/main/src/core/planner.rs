use std::time::Instant;

use gpuml_model::{
    ArchitectureDescriptor, ArchitectureTag, ModelConfiguration, RuntimeState, StateBuffer,
    WeightRef, WeightRole, WeightSet,
};
use gpuml_quant::QuantScheme;

use crate::api::error::{PlanError, PlanResult};
use crate::api::types::*;
use crate::core::graph::TaskGraphBuilder;
use crate::core::registry::CapabilityRegistry;

/// Name of the task graph for one layer.
pub fn layer_graph_name(layer: usize) -> String {
    format!("layer-{}", layer)
}

/// Name of the final normalization and vocabulary projection graph.
pub const LOGITS_GRAPH: &str = "logits";

/// Planner for one registered (architecture, scheme) pair.
///
/// Must be validated against a configuration, weight set and runtime state
/// before it can build graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPlanner {
    arch: ArchitectureDescriptor,
    scheme: QuantScheme,
}

impl LayerPlanner {
    pub(crate) fn new(arch: ArchitectureDescriptor, scheme: QuantScheme) -> Self {
        Self { arch, scheme }
    }

    pub fn arch(&self) -> &ArchitectureDescriptor {
        &self.arch
    }

    pub fn scheme(&self) -> QuantScheme {
        self.scheme
    }

    pub fn validate<'a>(
        self,
        config: &'a ModelConfiguration,
        weights: &'a WeightSet,
        state: &'a RuntimeState,
    ) -> PlanResult<ValidatedPlanner<'a>> {
        if weights.scheme != self.scheme {
            return Err(PlanError::SchemeMismatch {
                expected: self.scheme.to_string(),
                actual: weights.scheme.to_string(),
            });
        }
        config.validate()?;
        config.check_scheme(self.scheme)?;
        config.check_output_scheme(weights.output_projection().scheme())?;

        if weights.n_layers() != config.n_layers {
            return Err(PlanError::Consistency(format!(
                "configuration has {} layers, weight set has {}",
                config.n_layers,
                weights.n_layers()
            )));
        }
        if state.context_length() != config.context_length {
            return Err(PlanError::Consistency(format!(
                "runtime state holds {} positions, configuration {}",
                state.context_length(),
                config.context_length
            )));
        }
        let kv = config.n_layers * config.context_length * config.kv_dim();
        for (buffer, expected) in [
            (StateBuffer::X, config.dim),
            (StateBuffer::Logits, config.vocab_size),
            (StateBuffer::KeyCache, kv),
            (StateBuffer::ValueCache, kv),
        ] {
            let actual = state.len(buffer);
            if actual != expected {
                return Err(PlanError::Consistency(format!(
                    "state buffer '{}' holds {} values, expected {}",
                    buffer, actual, expected
                )));
            }
        }

        Ok(ValidatedPlanner {
            arch: self.arch,
            scheme: self.scheme,
            config,
            weights,
            state,
        })
    }
}

/// A planner whose inputs have been checked against each other.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPlanner<'a> {
    arch: ArchitectureDescriptor,
    scheme: QuantScheme,
    config: &'a ModelConfiguration,
    weights: &'a WeightSet,
    state: &'a RuntimeState,
}

impl<'a> ValidatedPlanner<'a> {
    /// Buffers every graph leaves resident: the whole runtime state plus the rotary tables.
    fn resident_set(&self) -> Vec<BufferId> {
        let mut set: Vec<BufferId> = self.state.allocated().into_iter().map(Into::into).collect();
        set.push(StateBuffer::Position.into());
        set.push(WeightRef::shared(WeightRole::RopeCos).into());
        set.push(WeightRef::shared(WeightRole::RopeSin).into());
        set
    }

    fn matmul(
        &self,
        weight: WeightRef,
        input: StateBuffer,
        output: StateBuffer,
        rows: usize,
        cols: usize,
    ) -> KernelOp {
        KernelOp::Matmul {
            weight,
            input,
            output,
            rows,
            cols,
            bias: None,
            residual: false,
            scheme: self.scheme,
        }
    }

    /// Build the graph of one layer.
    ///
    /// Layer 0 takes no handle and uploads the state; every later layer must
    /// be given the handle of the layer before it.
    pub fn build_layer(
        &self,
        layer: usize,
        previous: Option<ResidentHandle>,
    ) -> PlanResult<(TaskGraph, ResidentHandle)> {
        let name = layer_graph_name(layer);
        if layer >= self.config.n_layers {
            return Err(PlanError::Consistency(format!(
                "layer {} out of range for {} layers",
                layer, self.config.n_layers
            )));
        }

        let c = self.config;
        let a = &self.arch;
        let w = |role| WeightRef::layer(layer, role);
        let (dim, q_dim, kv_dim, hidden) = (c.dim, c.q_dim(), c.kv_dim(), c.hidden_dim);

        let mut g = TaskGraphBuilder::new(&name);
        match (layer, previous) {
            (0, None) => {
                g.upload_once(
                    self.state
                        .allocated()
                        .into_iter()
                        .filter(|b| *b != StateBuffer::X)
                        .map(BufferId::from),
                );
                g.upload_once([
                    WeightRef::shared(WeightRole::RopeCos).into(),
                    WeightRef::shared(WeightRole::RopeSin).into(),
                ]);
                g.upload_every([StateBuffer::X.into(), StateBuffer::Position.into()]);
            }
            (0, Some(h)) => {
                return Err(PlanError::Consistency(format!(
                    "layer-0 cannot consume buffers from '{}'",
                    h.producer()
                )));
            }
            (_, None) => {
                return Err(PlanError::Consistency(format!(
                    "{} needs the resident handle of {}",
                    name,
                    layer_graph_name(layer - 1)
                )));
            }
            (_, Some(h)) => {
                let expected = layer_graph_name(layer - 1);
                if h.producer() != expected {
                    return Err(PlanError::Consistency(format!(
                        "{} must consume {}, got '{}'",
                        name,
                        expected,
                        h.producer()
                    )));
                }
                g.consume(h);
            }
        }

        // Attention block.
        g.task(
            "attn-rms-reduce",
            KernelOp::RmsReduce {
                input: StateBuffer::X,
                scratch: StateBuffer::AttnScratch,
                len: dim,
            },
        );
        g.task(
            "attn-rms-apply",
            KernelOp::RmsApply {
                input: StateBuffer::X,
                output: StateBuffer::Xb,
                scratch: StateBuffer::AttnScratch,
                weight: w(WeightRole::AttnNorm),
                len: dim,
                eps: c.norm_eps,
            },
        );

        if a.fused_qkv {
            g.task(
                "qkv-proj",
                self.matmul(
                    w(WeightRole::Qkv),
                    StateBuffer::Xb,
                    StateBuffer::Qkv,
                    c.qkv_dim(),
                    dim,
                ),
            );
            g.task(
                "qkv-split",
                KernelOp::SplitQkv {
                    input: StateBuffer::Qkv,
                    q: StateBuffer::Q,
                    k: StateBuffer::K,
                    v: StateBuffer::V,
                    q_dim,
                    kv_dim,
                },
            );
        } else {
            for (task, role, bias, out, rows) in [
                ("q-proj", WeightRole::Q, WeightRole::QBias, StateBuffer::Q, q_dim),
                ("k-proj", WeightRole::K, WeightRole::KBias, StateBuffer::K, kv_dim),
                ("v-proj", WeightRole::V, WeightRole::VBias, StateBuffer::V, kv_dim),
            ] {
                let mut op = self.matmul(w(role), StateBuffer::Xb, out, rows, dim);
                if let KernelOp::Matmul { bias: b, .. } = &mut op {
                    *b = a.qkv_bias.then(|| w(bias));
                }
                g.task(task, op);
            }
        }

        if a.qk_norm {
            for (task, buffer, role, heads) in [
                ("q-norm", StateBuffer::Q, WeightRole::QNorm, c.n_heads),
                ("k-norm", StateBuffer::K, WeightRole::KNorm, c.n_kv_heads),
            ] {
                g.task(
                    task,
                    KernelOp::HeadRmsNorm {
                        buffer,
                        scratch: StateBuffer::HeadScratch,
                        weight: w(role),
                        heads,
                        head_size: c.head_size,
                        eps: c.norm_eps,
                    },
                );
            }
        }

        g.task(
            "rope-rotate",
            KernelOp::Rope {
                q: StateBuffer::Q,
                k: StateBuffer::K,
                cos: WeightRef::shared(WeightRole::RopeCos),
                sin: WeightRef::shared(WeightRole::RopeSin),
                n_heads: c.n_heads,
                n_kv_heads: c.n_kv_heads,
                head_size: c.head_size,
                style: a.rope_style,
            },
        );
        g.task(
            "kv-cache-write",
            KernelOp::KvCacheWrite {
                k: StateBuffer::K,
                v: StateBuffer::V,
                key_cache: StateBuffer::KeyCache,
                value_cache: StateBuffer::ValueCache,
                layer,
                kv_dim,
                context_length: c.context_length,
            },
        );
        g.task(
            "attention",
            KernelOp::Attention {
                q: StateBuffer::Q,
                key_cache: StateBuffer::KeyCache,
                value_cache: StateBuffer::ValueCache,
                scores: StateBuffer::Att,
                output: StateBuffer::Xb2,
                layer,
                n_heads: c.n_heads,
                n_kv_heads: c.n_kv_heads,
                head_size: c.head_size,
                context_length: c.context_length,
            },
        );
        g.task(
            "out-proj-residual",
            KernelOp::Matmul {
                weight: w(WeightRole::AttnOutput),
                input: StateBuffer::Xb2,
                output: StateBuffer::X,
                rows: dim,
                cols: q_dim,
                bias: None,
                residual: true,
                scheme: self.scheme,
            },
        );

        // Feed-forward block.
        g.task(
            "ffn-rms-reduce",
            KernelOp::RmsReduce {
                input: StateBuffer::X,
                scratch: StateBuffer::FfnScratch,
                len: dim,
            },
        );
        g.task(
            "ffn-rms-apply",
            KernelOp::RmsApply {
                input: StateBuffer::X,
                output: StateBuffer::Xb,
                scratch: StateBuffer::FfnScratch,
                weight: w(WeightRole::FfnNorm),
                len: dim,
                eps: c.norm_eps,
            },
        );
        let silu_input = if a.fused_gate_up {
            g.task(
                "gate-up-proj",
                self.matmul(
                    w(WeightRole::GateUp),
                    StateBuffer::Xb,
                    StateBuffer::HbFused,
                    2 * hidden,
                    dim,
                ),
            );
            SiluInput::Fused {
                gate_up: StateBuffer::HbFused,
            }
        } else {
            g.task(
                "gate-proj",
                self.matmul(w(WeightRole::Gate), StateBuffer::Xb, StateBuffer::Hb, hidden, dim),
            );
            g.task(
                "up-proj",
                self.matmul(w(WeightRole::Up), StateBuffer::Xb, StateBuffer::Hb2, hidden, dim),
            );
            SiluInput::Separate {
                gate: StateBuffer::Hb,
                up: StateBuffer::Hb2,
            }
        };
        g.task(
            "silu-gate",
            KernelOp::SiluGate {
                input: silu_input,
                output: StateBuffer::Hb,
                hidden,
            },
        );
        g.task(
            "down-proj-residual",
            KernelOp::Matmul {
                weight: w(WeightRole::Down),
                input: StateBuffer::Hb,
                output: StateBuffer::X,
                rows: dim,
                cols: hidden,
                bias: None,
                residual: true,
                scheme: self.scheme,
            },
        );

        self.check_references(&name, g.tasks())?;
        let own = layer_weights(&g, layer);
        g.upload_once(own);
        g.persist(self.resident_set());
        let graph = g.finalize()?;
        let handle = graph.handle();
        Ok((graph, handle))
    }

    /// Build the final graph from the handle of the last layer.
    pub fn build_logits(&self, last: ResidentHandle) -> PlanResult<TaskGraph> {
        let expected = layer_graph_name(self.config.n_layers.saturating_sub(1));
        if last.producer() != expected {
            return Err(PlanError::Consistency(format!(
                "{} must consume {}, got '{}'",
                LOGITS_GRAPH,
                expected,
                last.producer()
            )));
        }

        let c = self.config;
        let output_norm = WeightRef::shared(WeightRole::OutputNorm);
        let output = WeightRef::shared(WeightRole::Output);

        let mut g = TaskGraphBuilder::new(LOGITS_GRAPH);
        g.consume(last)
            .upload_once([output_norm.into(), output.into()])
            .task(
                "final-rms-reduce",
                KernelOp::RmsReduce {
                    input: StateBuffer::X,
                    scratch: StateBuffer::LogitsScratch,
                    len: c.dim,
                },
            )
            .task(
                "final-rms-apply",
                KernelOp::RmsApply {
                    input: StateBuffer::X,
                    output: StateBuffer::Xb,
                    scratch: StateBuffer::LogitsScratch,
                    weight: output_norm,
                    len: c.dim,
                    eps: c.norm_eps,
                },
            )
            .task(
                "logits-proj",
                KernelOp::Matmul {
                    weight: output,
                    input: StateBuffer::Xb,
                    output: StateBuffer::Logits,
                    rows: c.vocab_size,
                    cols: c.dim,
                    bias: None,
                    residual: false,
                    scheme: self.weights.output_projection().scheme(),
                },
            )
            .persist(self.resident_set())
            .download([StateBuffer::Logits.into()]);
        self.check_references(LOGITS_GRAPH, g.tasks())?;
        g.finalize()
    }

    /// Every argument of every task must exist in the state or weight set.
    fn check_references(&self, graph: &str, tasks: &[KernelTask]) -> PlanResult<()> {
        for task in tasks {
            for arg in task.op.arguments() {
                match arg {
                    BufferId::State(b) if !self.state.has(b) => {
                        return Err(PlanError::MissingBuffer {
                            graph: graph.to_string(),
                            kernel: task.name.clone(),
                            buffer: b.to_string(),
                        });
                    }
                    BufferId::Weight(r) if !self.weights.contains(r) => {
                        return Err(PlanError::MissingWeight {
                            graph: graph.to_string(),
                            kernel: task.name.clone(),
                            weight: r.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Build every graph in order and size a grid for each kernel.
    pub fn compile(self, policy: &GridPolicy) -> PlanResult<ExecutionPlan> {
        let start = Instant::now();
        let mut graphs = Vec::with_capacity(self.config.n_layers + 1);
        let mut previous = None;
        for layer in 0..self.config.n_layers {
            let (graph, handle) = self.build_layer(layer, previous.take())?;
            graphs.push(graph);
            previous = Some(handle);
        }
        let last = previous.ok_or_else(|| {
            PlanError::Consistency("a plan needs at least one layer".to_string())
        })?;
        graphs.push(self.build_logits(last)?);

        let mut schedule = GridSchedule::new();
        for graph in &graphs {
            for task in graph.tasks() {
                let key = GridSchedule::key(graph.name(), &task.name);
                let grid = policy.grid_for(&key, task.op.shape())?;
                schedule.insert(graph.name(), &task.name, grid)?;
            }
            log::debug!(
                "Planned {}: {} kernels, {} uploaded once, {} every step",
                graph.name(),
                graph.tasks().len(),
                graph.upload_once().len(),
                graph.upload_every().len()
            );
        }

        let plan = ExecutionPlan {
            arch: self.arch.tag,
            scheme: self.scheme,
            graphs,
            schedule,
        };
        log::info!(
            "Compiled {}/{} plan: {} graphs, {} kernels ({} grid policy)",
            plan.arch,
            plan.scheme,
            plan.graphs.len(),
            plan.schedule.len(),
            policy.vendor.name()
        );
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "[perf] plan::compile {:.3}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(plan)
    }
}

/// Per-layer weights referenced by the builder's tasks so far.
fn layer_weights(g: &TaskGraphBuilder, layer: usize) -> Vec<BufferId> {
    g.tasks()
        .iter()
        .flat_map(|t| t.op.arguments())
        .filter(|b| matches!(b, BufferId::Weight(r) if r.layer == Some(layer)))
        .collect()
}

/// Compile the plan for a model with the standard capability table.
pub fn compile(
    arch: &ArchitectureDescriptor,
    config: &ModelConfiguration,
    weights: &WeightSet,
    state: &RuntimeState,
    policy: &GridPolicy,
) -> PlanResult<ExecutionPlan> {
    CapabilityRegistry::standard()
        .planner(*arch, weights.scheme)?
        .validate(config, weights, state)?
        .compile(policy)
}

impl ExecutionPlan {
    pub fn arch(&self) -> ArchitectureTag {
        self.arch
    }

    pub fn scheme(&self) -> QuantScheme {
        self.scheme
    }

    /// Graphs in execution order: every layer, then logits.
    pub fn graphs(&self) -> &[TaskGraph] {
        &self.graphs
    }

    pub fn schedule(&self) -> &GridSchedule {
        &self.schedule
    }

    pub fn graph(&self, name: &str) -> Option<&TaskGraph> {
        self.graphs.iter().find(|g| g.name() == name)
    }

    pub fn layer_graphs(&self) -> &[TaskGraph] {
        &self.graphs[..self.graphs.len().saturating_sub(1)]
    }

    pub fn logits(&self) -> Option<&TaskGraph> {
        self.graphs.last()
    }

    pub fn kernel_count(&self) -> usize {
        self.graphs.iter().map(|g| g.tasks().len()).sum()
    }
}
