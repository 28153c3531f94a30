use gpuml_model::ModelError;
use gpuml_plan::PlanError;
use gpuml_quant::QuantError;
use thiserror::Error;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device allocation failed: {0}")]
    Allocation(String),

    #[error("Kernel '{kernel}' failed: {reason}")]
    Launch { kernel: String, reason: String },

    #[error("Buffer '{buffer}' is not resident on the device for '{graph}'")]
    NotResident { graph: String, buffer: String },

    #[error("Graph '{graph}' consumes '{buffer}' from '{producer}', which did not leave it resident")]
    HandleMismatch {
        graph: String,
        producer: String,
        buffer: String,
    },

    #[error("No worker grid scheduled for '{0}'")]
    MissingGrid(String),

    #[error("Position {position} exceeds context length {context_length}")]
    ContextOverflow {
        position: usize,
        context_length: usize,
    },

    #[error("Token id {token} outside vocabulary of {vocab_size}")]
    InvalidToken { token: u32, vocab_size: usize },

    #[error("Plan compiled for {plan} does not match model {model}")]
    PlanMismatch { plan: String, model: String },

    #[error("Session poisoned by an earlier failure: {0}")]
    Poisoned(String),

    #[error("Failed to configure thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Quant(#[from] QuantError),
}

impl DeviceError {
    pub(crate) fn launch(kernel: &str, reason: impl Into<String>) -> Self {
        DeviceError::Launch {
            kernel: kernel.to_string(),
            reason: reason.into(),
        }
    }
}
