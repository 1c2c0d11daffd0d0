//! Data models: invoice schema, batch results and configuration.

pub mod batch;
pub mod config;
pub mod invoice;
