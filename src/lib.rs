pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::cli::{CliConfig, TemplateFormat};

pub use crate::adapters::storage::LocalStorage;
pub use crate::config::StackConfig;
pub use crate::core::{
    builder::build,
    graph::ResourceGraph,
    render::{JsonRenderer, YamlRenderer},
    synth::Synthesizer,
};
pub use crate::utils::error::{Result, StackError};
