//! External process execution

pub mod runner;
pub mod tool;

pub use runner::{
    discard_lines, CommandSpec, LineSink, OutputLine, OutputStream, ProcessOutput, ProcessRunner,
    TokioProcessRunner,
};
pub use tool::resolve_tool;
