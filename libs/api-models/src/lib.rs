//! GOBI deployer API models

pub mod models;

pub use models::*;
