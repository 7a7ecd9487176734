use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Package ecosystem, used to route packages to vulnerability sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Alpine {
        #[serde(skip_serializing_if = "Option::is_none")]
        release: Option<String>,
    },
    Vscode,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Alpine { .. } => "alpine",
            Ecosystem::Vscode => "vscode",
        }
    }

    /// OSV ecosystem string, if the ecosystem is covered by OSV.dev.
    pub fn osv_ecosystem(&self) -> Option<String> {
        match self {
            Ecosystem::Npm => Some("npm".to_string()),
            Ecosystem::Alpine { release: Some(release) } => {
                // OSV keys Alpine advisories by minor release, e.g. "Alpine:v3.19".
                let minor: Vec<&str> = release.split('.').take(2).collect();
                Some(format!("Alpine:v{}", minor.join(".")))
            }
            Ecosystem::Alpine { release: None } => Some("Alpine".to_string()),
            // VSCode extensions don't have an OSV ecosystem
            Ecosystem::Vscode => None,
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavascriptMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Set by the `misc/npm-source` annotator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_npm_registry: Option<bool>,
}

/// Kind-specific package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PackageMetadata {
    Apk(ApkMetadata),
    Javascript(JavascriptMetadata),
}

/// The container image layer a package was introduced in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDetails {
    pub index: usize,
    pub diff_id: String,
    pub command: String,
    pub in_base_image: bool,
}

/// A software package discovered by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecosystem: Option<Ecosystem>,
    /// Paths the package was found at, relative to the scan root unless the
    /// scan stores absolute paths.
    pub locations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PackageMetadata>,
    /// Names of the plugins that produced this package.
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_details: Option<LayerDetails>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem: None,
            locations: Vec::new(),
            metadata: None,
            plugins: Vec::new(),
            annotations: BTreeMap::new(),
            layer_details: None,
        }
    }

    pub fn with_ecosystem(mut self, ecosystem: Ecosystem) -> Self {
        self.ecosystem = Some(ecosystem);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    pub fn with_metadata(mut self, metadata: PackageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Records `plugin` as a producer of this package.
    pub fn tag_plugin(&mut self, plugin: &str) {
        if !self.plugins.iter().any(|p| p == plugin) {
            self.plugins.push(plugin.to_string());
        }
    }

    pub fn javascript_metadata_mut(&mut self) -> Option<&mut JavascriptMetadata> {
        match self.metadata.as_mut() {
            Some(PackageMetadata::Javascript(m)) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_plugin_dedupes() {
        let mut pkg = Package::new("lodash", "4.17.21");
        pkg.tag_plugin("javascript/packagejson");
        pkg.tag_plugin("javascript/packagejson");
        pkg.tag_plugin("javascript/npm-global");
        assert_eq!(
            pkg.plugins,
            vec!["javascript/packagejson", "javascript/npm-global"]
        );
    }

    #[test]
    fn test_osv_ecosystem() {
        assert_eq!(Ecosystem::Npm.osv_ecosystem().as_deref(), Some("npm"));
        assert_eq!(
            Ecosystem::Alpine {
                release: Some("3.19.1".to_string())
            }
            .osv_ecosystem()
            .as_deref(),
            Some("Alpine:v3.19")
        );
        assert_eq!(Ecosystem::Vscode.osv_ecosystem(), None);
    }
}
