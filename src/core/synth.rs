use crate::core::assets::{collect_assets, AssetManifest};
use crate::core::graph::ResourceGraph;
use crate::domain::ports::{Renderer, Storage};
use crate::utils::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

pub const ASSEMBLY_VERSION: &str = "1.0.0";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyManifest {
    pub version: String,
    pub artifacts: BTreeMap<String, StackArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub environment: String,
    pub properties: ArtifactProperties,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    pub template_file: String,
    pub asset_manifest: String,
}

/// Files written by one synthesis run.
#[derive(Debug, Clone)]
pub struct SynthResult {
    pub template_file: String,
    pub asset_manifest_file: String,
    pub manifest_file: String,
    pub assets: AssetManifest,
}

pub struct Synthesizer<S: Storage, R: Renderer> {
    storage: S,
    renderer: R,
    asset_base: PathBuf,
    fingerprint_assets: bool,
}

impl<S: Storage, R: Renderer> Synthesizer<S, R> {
    pub fn new(storage: S, renderer: R, asset_base: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            renderer,
            asset_base: asset_base.into(),
            fingerprint_assets: true,
        }
    }

    pub fn with_asset_fingerprints(mut self, enabled: bool) -> Self {
        self.fingerprint_assets = enabled;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Nothing is written until the template and the asset manifest are both ready.
    pub fn run(&self, graph: &ResourceGraph) -> Result<SynthResult> {
        let stack = graph.stack_name();

        let template_file = format!("{}.template.{}", stack, self.renderer.extension());
        let template = self.renderer.render(graph)?;
        let asset_manifest_file = format!("{}.assets.json", stack);
        let assets = collect_assets(graph, &self.asset_base, self.fingerprint_assets)?;

        let manifest = AssemblyManifest {
            version: ASSEMBLY_VERSION.to_string(),
            artifacts: BTreeMap::from([(
                stack.to_string(),
                StackArtifact {
                    artifact_type: "aws:cloudformation:stack".to_string(),
                    environment: format!("aws://unknown-account/{}", graph.region()),
                    properties: ArtifactProperties {
                        template_file: template_file.clone(),
                        asset_manifest: asset_manifest_file.clone(),
                    },
                    outputs: graph.outputs().map(|o| o.id.to_string()).collect(),
                },
            )]),
        };

        self.storage.write_file(&template_file, template.as_bytes())?;
        info!("📄 Template written to {}", self.storage.display_path(&template_file));

        self.write_json(&asset_manifest_file, &assets)?;
        info!(
            "📦 {} image assets recorded in {}",
            assets.docker_images.len(),
            self.storage.display_path(&asset_manifest_file)
        );

        self.write_json(MANIFEST_FILE, &manifest)?;

        Ok(SynthResult {
            template_file,
            asset_manifest_file,
            manifest_file: MANIFEST_FILE.to_string(),
            assets,
        })
    }

    fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let mut data = serde_json::to_vec_pretty(value)?;
        data.push(b'\n');
        self.storage.write_file(path, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::core::builder::build;
    use crate::core::render::JsonRenderer;
    use crate::utils::error::StackError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockStorage {
        files: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl Storage for MockStorage {
        fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files.borrow().get(path).cloned().ok_or_else(|| {
                StackError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.borrow_mut().insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn display_path(&self, path: &str) -> String {
            format!("mem://{}", path)
        }
    }

    #[test]
    fn test_synth_without_fingerprints_writes_three_files() {
        let graph = build(&StackConfig::default()).unwrap();
        let synth = Synthesizer::new(MockStorage::default(), JsonRenderer, ".")
            .with_asset_fingerprints(false);

        let result = synth.run(&graph).unwrap();
        assert_eq!(result.template_file, "MatomoFargateStack.template.json");
        assert_eq!(result.assets.docker_images.len(), 2);

        let manifest = synth.storage().read_file(MANIFEST_FILE).unwrap();
        let manifest: serde_json::Value = serde_json::from_slice(&manifest).unwrap();
        let artifact = &manifest["artifacts"]["MatomoFargateStack"];
        assert_eq!(artifact["environment"], "aws://unknown-account/us-east-1");
        assert_eq!(artifact["outputs"][0], "MatomoURL");
        assert!(synth
            .storage()
            .read_file("MatomoFargateStack.assets.json")
            .is_ok());
    }

    #[test]
    fn test_synth_fails_on_missing_build_context() {
        let graph = build(&StackConfig::default()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let synth = Synthesizer::new(MockStorage::default(), JsonRenderer, dir.path());

        assert!(matches!(synth.run(&graph), Err(StackError::Asset { .. })));
        assert!(synth.storage().files.borrow().is_empty());
    }
}
