use anyhow::{Context, Result};
use async_trait::async_trait;

use super::packagejson::PackageJson;
use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::model::{Ecosystem, Inventory, JavascriptMetadata, Package, PackageMetadata};
use crate::plugin::Plugin;

/// Installed VSCode extensions, read from their `package.json` manifests.
pub struct VscodeExtensionExtractor;

impl VscodeExtensionExtractor {
    pub const NAME: &'static str = "vscode/extensions";
}

impl Plugin for VscodeExtensionExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

/// Matches `<...>/.vscode/extensions/<extension>/package.json` and the
/// remote-server layout `.vscode-server/extensions`.
fn is_extension_manifest(path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [.., home, "extensions", _extension, "package.json"] => {
            matches!(*home, ".vscode" | ".vscode-server" | ".vscode-insiders")
        }
        _ => false,
    }
}

#[async_trait]
impl FilesystemExtractor for VscodeExtensionExtractor {
    fn file_required(&self, api: &FileApi) -> bool {
        is_extension_manifest(api.path())
    }

    async fn extract(&self, _ctx: &ScanContext, input: &mut ScanInput) -> Result<Inventory> {
        let content = input.read_to_string()?;
        let manifest: PackageJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse extension manifest {}", input.path))?;

        let Some(version) = manifest.version else {
            return Ok(Inventory::new());
        };

        // Extensions are identified as publisher.name; fall back to the
        // install directory, which uses the same scheme plus the version.
        let id = match (&manifest.publisher, &manifest.name) {
            (Some(publisher), Some(name)) => format!("{}.{}", publisher, name),
            _ => {
                let dir = input.path.rsplit('/').nth(1).unwrap_or_default();
                dir.trim_end_matches(&format!("-{version}")).to_string()
            }
        };

        let metadata = JavascriptMetadata {
            description: manifest.description,
            publisher: manifest.publisher,
            homepage: manifest.homepage,
            repository: manifest.repository.map(|r| r.url().to_string()),
            license: manifest.license,
            from_npm_registry: None,
        };

        let package = Package::new(id, version)
            .with_ecosystem(Ecosystem::Vscode)
            .with_metadata(PackageMetadata::Javascript(metadata))
            .with_location(&input.path);

        Ok(Inventory::from_packages(vec![package]))
    }
}
