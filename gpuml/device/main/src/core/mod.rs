pub(crate) mod host;
pub(crate) mod kernels;
pub(crate) mod memory;
pub(crate) mod runtime;
pub(crate) mod session;
