use gpuml_gguf::GgufError;
use gpuml_quant::QuantError;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Container(#[from] GgufError),

    #[error(transparent)]
    Quant(#[from] QuantError),

    #[error("Missing required tensor '{0}'")]
    MissingTensor(String),

    #[error("Missing required metadata key '{0}'")]
    MissingMetadata(String),

    #[error("Unsupported architecture '{0}'")]
    UnsupportedArchitecture(String),

    #[error("Tensor '{tensor}' has unsupported type {ggml_type}")]
    UnsupportedType { tensor: String, ggml_type: String },

    #[error("Tensor '{tensor}' is {actual}, but the weight set is {expected}")]
    MixedQuantization {
        tensor: String,
        expected: String,
        actual: String,
    },

    #[error("Tensor '{tensor}' shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}
