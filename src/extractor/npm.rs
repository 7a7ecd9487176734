use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::process::Command;

use super::packagejson::RepositoryField;
use super::{StandaloneExtractor, StandaloneInput};
use crate::context::ScanContext;
use crate::model::{Ecosystem, Inventory, JavascriptMetadata, Package, PackageMetadata};
use crate::plugin::{Capabilities, Plugin};

/// Globally installed npm packages, as reported by `npm list -g`.
pub struct NpmGlobalExtractor;

impl NpmGlobalExtractor {
    pub const NAME: &'static str = "javascript/npm-global";
}

#[derive(Deserialize)]
struct NpmListOutput {
    dependencies: Option<BTreeMap<String, NpmPackage>>,
}

#[derive(Deserialize)]
struct NpmPackage {
    version: Option<String>,
    resolved: Option<String>,
    path: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    license: Option<String>,
    repository: Option<RepositoryField>,
}

impl Plugin for NpmGlobalExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn requirements(&self) -> Capabilities {
        Capabilities {
            running_system: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl StandaloneExtractor for NpmGlobalExtractor {
    async fn extract(&self, _ctx: &ScanContext, _input: &StandaloneInput) -> Result<Inventory> {
        let npm_cmd = if cfg!(target_os = "windows") { "npm.cmd" } else { "npm" };

        let output = Command::new(npm_cmd)
            .args(["list", "-g", "--json", "--depth=0", "--long"])
            .output()
            .await
            .context("Failed to execute npm. Is npm installed?")?;

        // npm list exits with 1 on peer dependency issues but still prints
        // valid JSON. Only an empty stdout means nothing to report.
        if !output.status.success() && output.stdout.is_empty() {
            return Ok(Inventory::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_npm_list(&stdout)
    }
}

fn parse_npm_list(stdout: &str) -> Result<Inventory> {
    let npm_list: NpmListOutput =
        serde_json::from_str(stdout).context("Failed to parse npm list output")?;

    let mut packages = Vec::new();
    for (name, pkg) in npm_list.dependencies.unwrap_or_default() {
        // Skip npm itself
        if name == "npm" {
            continue;
        }
        let Some(version) = pkg.version else {
            continue;
        };

        let from_registry = pkg
            .resolved
            .as_deref()
            .map(|r| r.starts_with("https://registry.npmjs.org/"));
        let metadata = JavascriptMetadata {
            description: pkg.description,
            publisher: None,
            homepage: pkg
                .homepage
                .or_else(|| Some(format!("https://www.npmjs.com/package/{}", name))),
            repository: pkg.repository.map(|r| r.url().to_string()),
            license: pkg.license,
            from_npm_registry: from_registry,
        };

        let mut package = Package::new(&name, version)
            .with_ecosystem(Ecosystem::Npm)
            .with_metadata(PackageMetadata::Javascript(metadata));
        if let Some(path) = pkg.path {
            package = package.with_location(path);
        }
        packages.push(package);
    }

    Ok(Inventory::from_packages(packages))
}
