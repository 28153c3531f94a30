pub(crate) mod arch;
pub(crate) mod config;
pub(crate) mod fixtures;
pub(crate) mod loader;
pub(crate) mod rope;
pub(crate) mod state;
pub(crate) mod vocab;
pub(crate) mod weights;
