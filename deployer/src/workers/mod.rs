//! Background workers

pub mod cleanup;
pub mod status_poller;
