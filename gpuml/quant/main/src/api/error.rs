use gpuml_gguf::GgufError;
use thiserror::Error;

pub type QuantResult<T> = Result<T, QuantError>;

#[derive(Debug, Error)]
pub enum QuantError {
    #[error("Unsupported tensor format {ggml_type} for '{tensor}'")]
    UnsupportedFormat { tensor: String, ggml_type: String },

    #[error("Q8_0 requires element count divisible by {block_size}, got {elements}")]
    BlockAlignment { elements: usize, block_size: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Container(#[from] GgufError),
}
