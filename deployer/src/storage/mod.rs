//! On-disk layout, settings and credentials

pub mod credentials;
pub mod layout;
pub mod settings;
