use crate::core::graph::ResourceGraph;
use crate::utils::error::Result;

pub trait Storage {
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
    /// Location shown to the user for a written artifact.
    fn display_path(&self, path: &str) -> String;
}

pub trait Renderer {
    /// File extension of the rendered template, without the dot.
    fn extension(&self) -> &'static str;
    fn render(&self, graph: &ResourceGraph) -> Result<String>;
}
