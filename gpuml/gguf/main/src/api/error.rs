use thiserror::Error;

pub type GgufResult<T> = Result<T, GgufError>;

#[derive(Debug, Error)]
pub enum GgufError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GGUF format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported GGML type id {type_id} for tensor '{tensor}'")]
    UnknownTensorType { tensor: String, type_id: u32 },

    #[error("Tensor '{tensor}' has {elements} elements, not a multiple of the {block_size}-element block of {ggml_type}")]
    BlockAlignment {
        tensor: String,
        ggml_type: String,
        elements: usize,
        block_size: usize,
    },

    #[error("Tensor '{tensor}' byte range {start}..{end} exceeds mapped region of {region_len} bytes")]
    OutOfBounds {
        tensor: String,
        start: usize,
        end: usize,
        region_len: usize,
    },

    #[error("Tensor '{tensor}' offset {offset} is not aligned to {alignment} bytes")]
    Misaligned {
        tensor: String,
        offset: u64,
        alignment: usize,
    },

    #[error("Unknown tensor: {0}")]
    UnknownTensor(String),
}
