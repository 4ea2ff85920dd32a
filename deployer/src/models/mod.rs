//! Data models

pub mod agent;
pub mod deployment;
