//! Container image assets: each container's build context directory is
//! fingerprinted so the provisioning engine can tell when an image must be
//! rebuilt and pushed.

use crate::core::graph::ResourceGraph;
use crate::domain::model::{Resource, ResourceId};
use crate::utils::error::{Result, StackError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ASSET_MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    pub version: String,
    /// Keyed by the template parameter that receives the image URI.
    pub docker_images: BTreeMap<String, DockerImageAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerImageAsset {
    pub container: String,
    pub task_definition: String,
    pub source: AssetSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSource {
    pub directory: String,
}

/// SHA-256 over every file below `dir`: relative path (with `/` separators),
/// a NUL, the byte length and the contents, in sorted path order. Symlinks
/// are not followed; their target path stands in for the contents.
pub fn fingerprint_directory(dir: &Path) -> Result<String> {
    let asset_error = |reason: String| StackError::Asset {
        path: dir.display().to_string(),
        reason,
    };

    if !dir.is_dir() {
        return Err(asset_error("build context is not a directory".to_string()));
    }

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files).map_err(|e| asset_error(e.to_string()))?;
    files.sort();

    let mut hasher = Sha256::new();
    for (relative, absolute, is_symlink) in &files {
        let contents = if *is_symlink {
            fs::read_link(absolute).map(|target| target.to_string_lossy().into_owned().into_bytes())
        } else {
            fs::read(absolute)
        }
        .map_err(|e| asset_error(e.to_string()))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_be_bytes());
        hasher.update(&contents);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut Vec<(String, PathBuf, bool)>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push((relative, path, file_type.is_symlink()));
        }
    }
    Ok(())
}

/// Gather image assets of every task definition. Paths are resolved against
/// `base_dir`; with `fingerprint = false` no file is read.
pub fn collect_assets(graph: &ResourceGraph, base_dir: &Path, fingerprint: bool) -> Result<AssetManifest> {
    let mut docker_images = BTreeMap::new();

    for resource in graph.resources() {
        let Resource::TaskDefinition(task) = resource else {
            continue;
        };

        for container in &task.containers {
            let fingerprint = if fingerprint {
                let hash = fingerprint_directory(&base_dir.join(&container.image.path))?;
                debug!("Fingerprinted {} -> {}", container.image.path, hash);
                Some(hash)
            } else {
                None
            };

            docker_images.insert(
                container.image.parameter.clone(),
                DockerImageAsset {
                    container: container.name.to_string(),
                    task_definition: task.id.to_string(),
                    source: AssetSource {
                        directory: container.image.path.clone(),
                    },
                    fingerprint,
                },
            );
        }
    }

    Ok(AssetManifest {
        version: ASSET_MANIFEST_VERSION.to_string(),
        docker_images,
    })
}

impl AssetManifest {
    pub fn for_container(&self, container: &ResourceId) -> Option<&DockerImageAsset> {
        self.docker_images
            .values()
            .find(|asset| asset.container == container.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM nginx:alpine\n").unwrap();
        let first = fingerprint_directory(dir.path()).unwrap();
        assert_eq!(first, fingerprint_directory(dir.path()).unwrap());
        assert_eq!(first.len(), 64);

        fs::write(dir.path().join("Dockerfile"), "FROM nginx:1.27\n").unwrap();
        assert_ne!(first, fingerprint_directory(dir.path()).unwrap());
    }

    #[test]
    fn test_fingerprint_includes_nested_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("conf")).unwrap();
        fs::write(dir.path().join("conf/default.conf"), "server {}").unwrap();
        let nested = fingerprint_directory(dir.path()).unwrap();

        let flat = TempDir::new().unwrap();
        fs::write(flat.path().join("default.conf"), "server {}").unwrap();
        assert_ne!(nested, fingerprint_directory(flat.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_not_followed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM nginx:alpine\n").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let first = fingerprint_directory(dir.path()).unwrap();
        assert_eq!(first, fingerprint_directory(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_directory_is_asset_error() {
        let dir = TempDir::new().unwrap();
        let err = fingerprint_directory(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StackError::Asset { .. }));
    }
}
