//! specsum core: configuration and the shared error type.

pub mod config;
pub mod error;

pub use config::{ChunkingConfig, DataPaths, PipelineConfig, SourceConfig, SpecSumConfig};
pub use error::{Error, Result};
