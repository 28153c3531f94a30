use gpuml_model::{StateBuffer, WeightRef, WeightSet};
use gpuml_plan::BufferId;
use gpuml_quant::QuantizedTensor;

use crate::api::error::{DeviceError, DeviceResult};
use crate::api::types::{DeviceBuffer, DeviceMemory};

impl DeviceMemory {
    pub(crate) fn contains(&self, id: &BufferId) -> bool {
        self.buffers.contains_key(id)
    }

    pub(crate) fn insert(&mut self, id: BufferId, buffer: DeviceBuffer) {
        self.buffers.insert(id, buffer);
    }

    pub(crate) fn remove(&mut self, id: &BufferId) -> Option<DeviceBuffer> {
        self.buffers.remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.buffers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &BufferId> {
        self.buffers.keys()
    }

    /// Bytes held by data buffers. Weights are counted by their owner.
    pub(crate) fn data_bytes(&self) -> usize {
        self.buffers
            .values()
            .map(|b| match b {
                DeviceBuffer::Data(v) => v.len() * std::mem::size_of::<f32>(),
                DeviceBuffer::Position(_) => std::mem::size_of::<u32>(),
                DeviceBuffer::Weight => 0,
            })
            .sum()
    }

    /// Borrow a state buffer's contents.
    pub(crate) fn data(&self, kernel: &str, b: StateBuffer) -> DeviceResult<&[f32]> {
        match self.buffers.get(&BufferId::State(b)) {
            Some(DeviceBuffer::Data(v)) => Ok(v),
            Some(_) => Err(DeviceError::launch(kernel, format!("'{}' is not a data buffer", b))),
            None => Err(not_resident(kernel, b)),
        }
    }

    /// Move a state buffer out for writing; `put` returns it.
    pub(crate) fn take(&mut self, kernel: &str, b: StateBuffer) -> DeviceResult<Vec<f32>> {
        match self.buffers.remove(&BufferId::State(b)) {
            Some(DeviceBuffer::Data(v)) => Ok(v),
            Some(other) => {
                self.buffers.insert(BufferId::State(b), other);
                Err(DeviceError::launch(kernel, format!("'{}' is not a data buffer", b)))
            }
            None => Err(not_resident(kernel, b)),
        }
    }

    pub(crate) fn put(&mut self, b: StateBuffer, data: Vec<f32>) {
        self.buffers.insert(BufferId::State(b), DeviceBuffer::Data(data));
    }

    pub(crate) fn position(&self, kernel: &str) -> DeviceResult<usize> {
        match self.buffers.get(&BufferId::State(StateBuffer::Position)) {
            Some(DeviceBuffer::Position(p)) => Ok(*p),
            _ => Err(not_resident(kernel, StateBuffer::Position)),
        }
    }
}

fn not_resident(kernel: &str, b: StateBuffer) -> DeviceError {
    DeviceError::NotResident {
        graph: kernel.to_string(),
        buffer: b.to_string(),
    }
}

/// A resident full-precision weight vector.
pub(crate) fn dense<'w>(
    weights: &'w WeightSet,
    kernel: &str,
    r: WeightRef,
) -> DeviceResult<&'w [f32]> {
    weights
        .dense(r)
        .ok_or_else(|| DeviceError::launch(kernel, format!("no vector weight '{}'", r)))
}

/// A resident matrix weight.
pub(crate) fn matrix<'w>(
    weights: &'w WeightSet,
    kernel: &str,
    r: WeightRef,
) -> DeviceResult<&'w QuantizedTensor> {
    weights
        .matrix(r)
        .ok_or_else(|| DeviceError::launch(kernel, format!("no matrix weight '{}'", r)))
}
