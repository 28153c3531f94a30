use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gpuml_model::{ModelConfiguration, RuntimeState, WeightSet};
use gpuml_plan::{BufferId, ExecutionPlan, GridSchedule, TaskGraph};

use crate::api::error::DeviceResult;

/// A device that executes compiled task graphs.
///
/// Implementations own their device memory. Buffers named by a graph's
/// transfer directives move between `state` and the device; kernels only
/// ever touch device-resident buffers.
pub trait DeviceRuntime {
    fn name(&self) -> &str;

    /// Run one graph: transfers in, every kernel in order, transfers out.
    fn execute(
        &mut self,
        graph: &TaskGraph,
        schedule: &GridSchedule,
        weights: &Arc<WeightSet>,
        state: &mut RuntimeState,
    ) -> DeviceResult<()>;

    /// Drop every resident buffer; the next execution of each graph counts as its first.
    fn release(&mut self);
}

/// One allocation in emulated device memory.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeviceBuffer {
    Data(Vec<f32>),
    Position(usize),
    /// Weights are read in place from the bound weight set.
    Weight,
}

/// Emulated device memory keyed by buffer id.
#[derive(Debug, Default)]
pub(crate) struct DeviceMemory {
    pub(crate) buffers: HashMap<BufferId, DeviceBuffer>,
}

/// Host→device and device→host traffic, counted per buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploads: usize,
    pub upload_bytes: usize,
    pub downloads: usize,
    pub download_bytes: usize,
}

/// CPU implementation of [`DeviceRuntime`].
#[derive(Debug, Default)]
pub struct HostDevice {
    pub(crate) memory: DeviceMemory,
    /// Graph that last left each buffer resident.
    pub(crate) persisted_by: HashMap<BufferId, String>,
    pub(crate) executed: HashSet<String>,
    pub(crate) weights: Option<Arc<WeightSet>>,
    pub(crate) stats: TransferStats,
}

/// Thread configuration for the host device.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Rayon worker threads; 0 keeps the default of one per core.
    pub num_threads: usize,
}

/// One decoding session: its own state and device, a shared plan and weights.
pub struct DecodeSession<D: DeviceRuntime = HostDevice> {
    pub(crate) config: ModelConfiguration,
    pub(crate) weights: Arc<WeightSet>,
    pub(crate) plan: Arc<ExecutionPlan>,
    pub(crate) state: RuntimeState,
    pub(crate) device: D,
    pub(crate) poisoned: Option<String>,
    pub(crate) steps: usize,
}
