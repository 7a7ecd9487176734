use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::model::{Ecosystem, Inventory, JavascriptMetadata, Package, PackageMetadata};
use crate::plugin::Plugin;

/// Installed JavaScript packages, one per `package.json`.
pub struct PackageJsonExtractor;

impl PackageJsonExtractor {
    pub const NAME: &'static str = "javascript/packagejson";
}

#[derive(Deserialize)]
pub(super) struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub author: Option<PersonField>,
    pub publisher: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<RepositoryField>,
    pub license: Option<String>,
    #[serde(default)]
    pub engines: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(super) enum RepositoryField {
    String(String),
    Object { url: String },
}

impl RepositoryField {
    pub fn url(&self) -> &str {
        match self {
            RepositoryField::String(s) => s,
            RepositoryField::Object { url } => url,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(super) enum PersonField {
    String(String),
    Object { name: String },
}

impl PersonField {
    fn into_name(self) -> String {
        match self {
            PersonField::String(s) => s,
            PersonField::Object { name } => name,
        }
    }
}

impl PackageJson {
    pub fn is_vscode_extension(&self) -> bool {
        self.engines.contains_key("vscode")
    }
}

impl Plugin for PackageJsonExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

#[async_trait]
impl FilesystemExtractor for PackageJsonExtractor {
    fn file_required(&self, api: &FileApi) -> bool {
        api.file_name() == "package.json"
    }

    async fn extract(&self, _ctx: &ScanContext, input: &mut ScanInput) -> Result<Inventory> {
        let content = input.read_to_string()?;
        let manifest: PackageJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", input.path))?;

        // Extension manifests belong to the vscode extractor.
        if manifest.is_vscode_extension() {
            return Ok(Inventory::new());
        }
        let (Some(name), Some(version)) = (
            manifest.name.filter(|n| !n.is_empty()),
            manifest.version.filter(|v| !v.is_empty()),
        ) else {
            return Ok(Inventory::new());
        };

        let metadata = JavascriptMetadata {
            description: manifest.description,
            publisher: manifest.author.map(PersonField::into_name),
            homepage: manifest.homepage,
            repository: manifest.repository.map(|r| r.url().to_string()),
            license: manifest.license,
            from_npm_registry: None,
        };

        let package = Package::new(name, version)
            .with_ecosystem(Ecosystem::Npm)
            .with_metadata(PackageMetadata::Javascript(metadata))
            .with_location(&input.path);

        Ok(Inventory::from_packages(vec![package]))
    }
}
