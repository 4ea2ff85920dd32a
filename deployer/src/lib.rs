//! GOBI Deployer Library
//!
//! Generates LiveKit voice agent projects from stored configurations,
//! deploys them with the LiveKit CLI and tracks their status.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod livekit;
pub mod logs;
pub mod models;
pub mod process;
pub mod registry;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
