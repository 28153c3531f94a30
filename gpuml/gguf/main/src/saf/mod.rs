//! Facade re-exports for gpuml-gguf

pub use crate::api::error::*;
pub use crate::api::types::*;
pub use crate::core::builder::GgufBuilder;
pub use crate::core::container::{MappedRegion, TensorContainer};
pub use crate::core::parser::{parse_header, DEFAULT_ALIGNMENT, GGUF_MAGIC};
