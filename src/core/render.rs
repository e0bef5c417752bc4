use crate::core::graph::ResourceGraph;
use crate::core::template::Template;
use crate::domain::ports::Renderer;
use crate::utils::error::Result;

/// Pretty-printed JSON template with a trailing newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, graph: &ResourceGraph) -> Result<String> {
        let template = Template::from_graph(graph);
        let mut rendered = serde_json::to_string_pretty(&template)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlRenderer;

impl Renderer for YamlRenderer {
    fn extension(&self) -> &'static str {
        "yaml"
    }

    fn render(&self, graph: &ResourceGraph) -> Result<String> {
        let template = Template::from_graph(graph);
        Ok(serde_yaml::to_string(&template)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::core::builder::build;

    #[test]
    fn test_json_render_is_idempotent() {
        let graph = build(&StackConfig::default()).unwrap();
        let first = JsonRenderer.render(&graph).unwrap();
        let second = JsonRenderer.render(&graph).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("}\n"));
    }

    #[test]
    fn test_json_render_parses_back() {
        let graph = build(&StackConfig::default()).unwrap();
        let rendered = JsonRenderer.render(&graph).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(
            value["Resources"]["MatomoListener"]["Properties"]["Port"],
            80
        );
    }

    #[test]
    fn test_yaml_render_is_idempotent() {
        let graph = build(&StackConfig::default()).unwrap();
        let first = YamlRenderer.render(&graph).unwrap();
        assert_eq!(first, YamlRenderer.render(&graph).unwrap());
        assert!(first.contains("AWS::ECS::TaskDefinition"));
    }
}
