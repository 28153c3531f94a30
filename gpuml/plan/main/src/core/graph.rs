use crate::api::error::{PlanError, PlanResult};
use crate::api::types::*;

impl ResidentHandle {
    /// Name of the graph that left the buffers resident.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn buffers(&self) -> &[BufferId] {
        &self.buffers
    }
}

impl TaskGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn consumes(&self) -> Option<&ResidentHandle> {
        self.consumes.as_ref()
    }

    /// Producer this graph depends on, if any.
    pub fn dependency(&self) -> Option<&str> {
        self.consumes.as_ref().map(ResidentHandle::producer)
    }

    pub fn upload_once(&self) -> &[BufferId] {
        &self.upload_once
    }

    pub fn upload_every(&self) -> &[BufferId] {
        &self.upload_every
    }

    pub fn tasks(&self) -> &[KernelTask] {
        &self.tasks
    }

    pub fn persist(&self) -> &[BufferId] {
        &self.persist
    }

    pub fn download(&self) -> &[BufferId] {
        &self.download
    }

    pub fn task(&self, name: &str) -> Option<&KernelTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Handle over the persisted buffers, for the next graph to consume.
    pub(crate) fn handle(&self) -> ResidentHandle {
        ResidentHandle {
            producer: self.name.clone(),
            buffers: self.persist.clone(),
        }
    }
}

/// Mutable form of a task graph; `finalize` freezes it.
pub(crate) struct TaskGraphBuilder {
    graph: TaskGraph,
}

impl TaskGraphBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            graph: TaskGraph {
                name: name.into(),
                consumes: None,
                upload_once: Vec::new(),
                upload_every: Vec::new(),
                tasks: Vec::new(),
                persist: Vec::new(),
                download: Vec::new(),
            },
        }
    }

    pub(crate) fn consume(&mut self, handle: ResidentHandle) -> &mut Self {
        self.graph.consumes = Some(handle);
        self
    }

    pub(crate) fn upload_once(&mut self, buffers: impl IntoIterator<Item = BufferId>) -> &mut Self {
        extend_unique(&mut self.graph.upload_once, buffers);
        self
    }

    pub(crate) fn upload_every(&mut self, buffers: impl IntoIterator<Item = BufferId>) -> &mut Self {
        extend_unique(&mut self.graph.upload_every, buffers);
        self
    }

    pub(crate) fn task(&mut self, name: &str, op: KernelOp) -> &mut Self {
        self.graph.tasks.push(KernelTask {
            name: name.to_string(),
            op,
        });
        self
    }

    pub(crate) fn tasks(&self) -> &[KernelTask] {
        &self.graph.tasks
    }

    pub(crate) fn persist(&mut self, buffers: impl IntoIterator<Item = BufferId>) -> &mut Self {
        extend_unique(&mut self.graph.persist, buffers);
        self
    }

    pub(crate) fn download(&mut self, buffers: impl IntoIterator<Item = BufferId>) -> &mut Self {
        extend_unique(&mut self.graph.download, buffers);
        self
    }

    /// Freeze the graph after checking that every kernel argument is either
    /// transferred by this graph or consumed from its producer.
    pub(crate) fn finalize(self) -> PlanResult<TaskGraph> {
        let g = &self.graph;
        let mut names: Vec<&str> = g.tasks.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(PlanError::Consistency(format!(
                "graph '{}' has two kernels named '{}'",
                g.name, w[0]
            )));
        }

        let available = |b: &BufferId| {
            g.upload_once.contains(b)
                || g.upload_every.contains(b)
                || g.consumes.as_ref().is_some_and(|h| h.buffers.contains(b))
        };
        for task in &g.tasks {
            if let Some(missing) = task.op.arguments().into_iter().find(|b| !available(b)) {
                return Err(PlanError::Consistency(format!(
                    "kernel '{}.{}' uses '{}' which is neither transferred nor consumed",
                    g.name, task.name, missing
                )));
            }
        }
        Ok(self.graph)
    }
}

fn extend_unique(dst: &mut Vec<BufferId>, src: impl IntoIterator<Item = BufferId>) {
    for b in src {
        if !dst.contains(&b) {
            dst.push(b);
        }
    }
}
