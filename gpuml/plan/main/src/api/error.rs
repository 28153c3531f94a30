use gpuml_model::ModelError;
use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("No planner registered for {arch} with {scheme} weights")]
    Unregistered { arch: String, scheme: String },

    #[error("Planner expects {expected} weights, weight set is {actual}")]
    SchemeMismatch { expected: String, actual: String },

    #[error("Plan consistency violation: {0}")]
    Consistency(String),

    #[error("Duplicate grid for kernel '{0}'")]
    DuplicateGrid(String),

    #[error("Partial work-group: global {global:?} not divisible by local {local:?}")]
    PartialWorkGroup { global: [usize; 2], local: [usize; 2] },

    #[error("Invalid grid for kernel '{kernel}': {reason}")]
    InvalidGrid { kernel: String, reason: String },

    #[error("Kernel '{graph}.{kernel}' references state buffer '{buffer}' the runtime state does not allocate")]
    MissingBuffer {
        graph: String,
        kernel: String,
        buffer: String,
    },

    #[error("Kernel '{graph}.{kernel}' references weight '{weight}' the weight set does not hold")]
    MissingWeight {
        graph: String,
        kernel: String,
        weight: String,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}
