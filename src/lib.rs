pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod spatial;
pub mod utils;

pub use adapters::LocalStorage;
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::ProjectConfig;

pub use core::{EtlEngine, PipelineSequence};
pub use utils::error::{GieError, Result};
