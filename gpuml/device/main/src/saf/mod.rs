//! Facade re-exports for gpuml-device

pub use crate::api::error::*;
pub use crate::api::types::{
    DecodeSession, DeviceRuntime, HostDevice, RuntimeConfig, TransferStats,
};
