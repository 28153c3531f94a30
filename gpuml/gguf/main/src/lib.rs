//! # gpuml GGUF
//!
//! Reader for the GGUF tensor container used by llama.cpp-compatible model files.
//!
//! This crate provides:
//! - Header, metadata and tensor-descriptor parsing (GGUF v2 and v3)
//! - A read-only memory-mapped view of the tensor data region
//! - Bounds, alignment and block-size validation of every declared tensor
//! - A container builder for synthetic files
//!
//! ## Example
//!
//! ```rust,ignore
//! use gpuml_gguf::TensorContainer;
//!
//! let container = TensorContainer::open("model.gguf")?;
//! let arch = container.metadata().get_str("general.architecture");
//! for desc in container.descriptors() {
//!     println!("{} {:?} {:?}", desc.name, desc.ggml_type, desc.shape());
//! }
//! ```

pub mod api;
mod core;
mod saf;

pub use saf::*;
