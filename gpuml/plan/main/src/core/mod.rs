pub(crate) mod graph;
pub(crate) mod grid;
pub(crate) mod kernel;
pub(crate) mod planner;
pub(crate) mod registry;
