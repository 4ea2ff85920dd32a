//! Deployment module

pub mod fsm;
pub mod locks;
pub mod log_sink;
pub mod orchestrator;
pub mod parse;
pub mod project;
pub mod script;

pub use log_sink::LogSink;
pub use orchestrator::Orchestrator;
