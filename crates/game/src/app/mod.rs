pub(crate) mod bootstrap;
pub(crate) mod campaign;
pub(crate) mod loop_runner;
