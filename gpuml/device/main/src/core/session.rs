use std::sync::Arc;
use std::time::Instant;

use gpuml_model::{Model, RuntimeState, StateBuffer};
use gpuml_plan::ExecutionPlan;

use crate::api::error::{DeviceError, DeviceResult};
use crate::api::types::*;

impl DecodeSession<HostDevice> {
    /// A session on the host device.
    pub fn new(model: &Model, plan: Arc<ExecutionPlan>) -> DeviceResult<Self> {
        Self::with_device(model, plan, HostDevice::new())
    }
}

impl<D: DeviceRuntime> DecodeSession<D> {
    pub fn with_device(model: &Model, plan: Arc<ExecutionPlan>, device: D) -> DeviceResult<Self> {
        if plan.arch() != model.descriptor.tag || plan.scheme() != model.weights.scheme {
            return Err(DeviceError::PlanMismatch {
                plan: format!("{}/{}", plan.arch(), plan.scheme()),
                model: format!("{}/{}", model.descriptor.tag, model.weights.scheme),
            });
        }
        let layers = plan.layer_graphs().len();
        if layers != model.config.n_layers {
            return Err(DeviceError::PlanMismatch {
                plan: format!("{} layers", layers),
                model: format!("{} layers", model.config.n_layers),
            });
        }
        log::info!(
            "Decode session on {} device: {}/{}, {} graphs, context {}",
            device.name(),
            plan.arch(),
            plan.scheme(),
            plan.graphs().len(),
            model.config.context_length
        );
        Ok(Self {
            config: model.config.clone(),
            weights: Arc::clone(&model.weights),
            state: model.new_state(),
            plan,
            device,
            poisoned: None,
            steps: 0,
        })
    }

    /// Decode one token at `position` and return the logits.
    ///
    /// Positions must stay below the context length. A failure inside the
    /// device leaves its memory in an unknown state, so the session refuses
    /// every later step until [`reset`](Self::reset).
    pub fn step(&mut self, token: u32, position: usize) -> DeviceResult<&[f32]> {
        if let Some(reason) = &self.poisoned {
            return Err(DeviceError::Poisoned(reason.clone()));
        }
        if position >= self.state.context_length() {
            return Err(DeviceError::ContextOverflow {
                position,
                context_length: self.state.context_length(),
            });
        }
        if token as usize >= self.config.vocab_size {
            return Err(DeviceError::InvalidToken {
                token,
                vocab_size: self.config.vocab_size,
            });
        }

        let start = Instant::now();
        let dim = self.config.dim;
        let x = self
            .state
            .buffer_mut(StateBuffer::X)
            .ok_or_else(|| DeviceError::Allocation("state has no residual buffer".to_string()))?;
        self.weights
            .token_embedding
            .row_f32(token as usize, dim, x)?;
        self.state.set_position(position);

        for graph in self.plan.graphs() {
            if let Err(e) = self
                .device
                .execute(graph, self.plan.schedule(), &self.weights, &mut self.state)
            {
                log::error!("Step at position {} failed in {}: {}", position, graph.name(), e);
                self.poisoned = Some(format!("{}: {}", graph.name(), e));
                return Err(e);
            }
        }
        self.steps += 1;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "[perf] session::step pos={} {:.3}ms",
                position,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        self.logits()
    }

    /// Logits of the last completed step.
    pub fn logits(&self) -> DeviceResult<&[f32]> {
        self.state
            .buffer(StateBuffer::Logits)
            .ok_or_else(|| DeviceError::Allocation("state has no logits buffer".to_string()))
    }

    /// Clear the state and device memory; the session can decode again from position 0.
    pub fn reset(&mut self) {
        self.state.reset();
        self.device.release();
        self.poisoned = None;
        self.steps = 0;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn context_length(&self) -> usize {
        self.state.context_length()
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}
