pub(crate) mod builder;
pub(crate) mod container;
pub(crate) mod parser;
