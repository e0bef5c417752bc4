pub mod assets;
pub mod builder;
pub mod graph;
pub mod render;
pub mod synth;
pub mod template;

pub use crate::domain::model::{Resource, ResourceId, ResourceKind};
pub use crate::domain::ports::{Renderer, Storage};
pub use crate::utils::error::Result;
