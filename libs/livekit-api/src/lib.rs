//! LiveKit server API models

pub mod models;

pub use models::*;
