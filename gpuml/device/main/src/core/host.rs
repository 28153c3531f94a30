use std::sync::Arc;
use std::time::Instant;

use gpuml_model::{RuntimeState, StateBuffer, WeightSet};
use gpuml_plan::{BufferId, GridSchedule, ResidentHandle, TaskGraph};

use crate::api::error::{DeviceError, DeviceResult};
use crate::api::types::*;
use crate::core::kernels;

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is currently allocated on the device.
    pub fn is_resident(&self, id: BufferId) -> bool {
        self.memory.contains(&id)
    }

    pub fn resident_count(&self) -> usize {
        self.memory.len()
    }

    /// Bytes held by resident activation buffers.
    pub fn resident_bytes(&self) -> usize {
        self.memory.data_bytes()
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub fn has_executed(&self, graph: &str) -> bool {
        self.executed.contains(graph)
    }

    /// The device reads weights in place, so every graph must use the same set.
    fn bind(&mut self, weights: &Arc<WeightSet>) -> DeviceResult<()> {
        match &self.weights {
            Some(bound) if !Arc::ptr_eq(bound, weights) => Err(DeviceError::Allocation(
                "device is bound to a different weight set".to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.weights = Some(Arc::clone(weights));
                Ok(())
            }
        }
    }

    fn check_handle(&self, graph: &str, handle: &ResidentHandle) -> DeviceResult<()> {
        for id in handle.buffers() {
            if !self.memory.contains(id) {
                return Err(DeviceError::NotResident {
                    graph: graph.to_string(),
                    buffer: id.to_string(),
                });
            }
            if self.persisted_by.get(id).map(String::as_str) != Some(handle.producer()) {
                return Err(DeviceError::HandleMismatch {
                    graph: graph.to_string(),
                    producer: handle.producer().to_string(),
                    buffer: id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn upload(&mut self, id: BufferId, weights: &WeightSet, state: &RuntimeState) -> DeviceResult<()> {
        let (buffer, bytes) = match id {
            BufferId::State(StateBuffer::Position) => (
                DeviceBuffer::Position(state.position()),
                std::mem::size_of::<u32>(),
            ),
            BufferId::State(b) => {
                let data = state.buffer(b).ok_or_else(|| {
                    DeviceError::Allocation(format!("host state has no buffer '{}'", b))
                })?;
                (
                    DeviceBuffer::Data(data.to_vec()),
                    std::mem::size_of_val(data),
                )
            }
            BufferId::Weight(r) => {
                if !weights.contains(r) {
                    return Err(DeviceError::Allocation(format!(
                        "weight set has no tensor for '{}'",
                        r
                    )));
                }
                (DeviceBuffer::Weight, 0)
            }
        };
        self.memory.insert(id, buffer);
        self.stats.uploads += 1;
        self.stats.upload_bytes += bytes;
        Ok(())
    }

    fn download(&mut self, graph: &str, id: BufferId, state: &mut RuntimeState) -> DeviceResult<()> {
        let b = match id {
            BufferId::State(b) => b,
            BufferId::Weight(_) => {
                return Err(DeviceError::Allocation(format!(
                    "'{}' cannot be copied back to the host",
                    id
                )))
            }
        };
        let data = self.memory.data(graph, b)?;
        let host = state.buffer_mut(b).ok_or_else(|| {
            DeviceError::Allocation(format!("host state has no buffer '{}'", b))
        })?;
        if host.len() != data.len() {
            return Err(DeviceError::Allocation(format!(
                "'{}' is {} values on the device, {} on the host",
                b,
                data.len(),
                host.len()
            )));
        }
        host.copy_from_slice(data);
        self.stats.downloads += 1;
        self.stats.download_bytes += std::mem::size_of_val(data);
        Ok(())
    }

    /// Free activation buffers the graph did not persist; weights stay resident.
    fn settle(&mut self, graph: &TaskGraph) {
        let transient: Vec<BufferId> = self
            .memory
            .ids()
            .copied()
            .filter(|id| matches!(id, BufferId::State(_)) && !graph.persist().contains(id))
            .collect();
        for id in transient {
            self.memory.remove(&id);
            self.persisted_by.remove(&id);
        }
        for id in graph.persist() {
            if self.memory.contains(id) {
                self.persisted_by.insert(*id, graph.name().to_string());
            }
        }
    }
}

impl DeviceRuntime for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn execute(
        &mut self,
        graph: &TaskGraph,
        schedule: &GridSchedule,
        weights: &Arc<WeightSet>,
        state: &mut RuntimeState,
    ) -> DeviceResult<()> {
        let start = Instant::now();
        let name = graph.name();
        self.bind(weights)?;

        if let Some(handle) = graph.consumes() {
            self.check_handle(name, handle)?;
        }
        let first = !self.executed.contains(name);
        if first {
            for id in graph.upload_once() {
                self.upload(*id, weights, state)?;
            }
        }
        for id in graph.upload_every() {
            self.upload(*id, weights, state)?;
        }

        for task in graph.tasks() {
            let key = GridSchedule::key(name, &task.name);
            let grid = schedule
                .get(name, &task.name)
                .ok_or_else(|| DeviceError::MissingGrid(key.clone()))?;
            if let Some(missing) = task.op.arguments().into_iter().find(|a| !self.memory.contains(a)) {
                return Err(DeviceError::NotResident {
                    graph: key,
                    buffer: missing.to_string(),
                });
            }
            let t = Instant::now();
            kernels::launch(&key, &task.op, grid, &mut self.memory, weights)?;
            if log::log_enabled!(log::Level::Trace) {
                log::trace!(
                    "[perf] device::{} {} {} {:.3}ms",
                    key,
                    task.op.label(),
                    grid,
                    t.elapsed().as_secs_f64() * 1000.0
                );
            }
        }

        for id in graph.download() {
            self.download(name, *id, state)?;
        }
        self.settle(graph);
        self.executed.insert(name.to_string());

        if first {
            log::debug!(
                "First execution of {}: {} buffers resident, {} activation bytes",
                name,
                self.memory.len(),
                self.memory.data_bytes()
            );
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "[perf] device::execute {} {:.3}ms",
                name,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(())
    }

    fn release(&mut self) {
        self.memory.clear();
        self.persisted_by.clear();
        self.executed.clear();
        self.weights = None;
    }
}
