//! Configuration file handling.
//!
//! This module provides loading and saving of invscan configuration
//! from a TOML file, and turns it into a [`ScanConfig`].
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/invscan/config.toml`
//! - macOS: `~/Library/Application Support/invscan/config.toml`
//! - Windows: `%APPDATA%\invscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_ttl_hours = 24
//! plugins = ["os/apk", "cve/cve-2024-3094"]
//! explicit_plugins = false
//! dirs_to_skip = ["proc", "sys"]
//! skip_dir_glob = "*/node_modules/*/test"
//! max_file_size = 104857600
//! use_gitignore = true
//! max_concurrency = 4
//! offline = false
//! default_format = "table"
//!
//! [ignore]
//! packages = ["@types/*"]
//! vulnerabilities = ["GHSA-35jh-r3h4-6jhm"]
//! ```

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::ScanError;
use crate::extractor::glob_match;
use crate::model::Inventory;
use crate::platform::{config_dir, host_capabilities};
use crate::plugin::{filter_by_capabilities, Capabilities};
use crate::registry::Registry;
use crate::scanner::ScanConfig;

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use invscan::{Config, Registry};
///
/// let config = Config::load().unwrap();
/// let registry = Registry::with_builtins();
/// let scan_config = config
///     .to_scan_config(&registry, config.capabilities())
///     .unwrap()
///     .with_root("/");
///
/// println!("{} plugins enabled", scan_config.plugins.len());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to cache OSV responses, in hours.
    ///
    /// Default: 24 hours
    pub cache_ttl_hours: u64,

    /// Plugins to enable by name. Empty enables every registered plugin
    /// the host can run.
    pub plugins: Vec<String>,

    /// Fail instead of auto-enabling plugins that other plugins require.
    pub explicit_plugins: bool,

    /// Directories to skip, relative to the scan root or absolute.
    pub dirs_to_skip: Vec<PathBuf>,

    /// Skip directories whose root-relative path matches this regex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_dir_regex: Option<String>,

    /// Skip directories whose root-relative path matches this `*` glob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_dir_glob: Option<String>,

    /// Files larger than this many bytes are not extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,

    /// Abort the scan after visiting this many files and directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inodes: Option<usize>,

    pub use_gitignore: bool,

    pub read_symlinks: bool,

    /// Report package locations as absolute paths.
    pub store_absolute_path: bool,

    /// Plugins running at once within a phase.
    ///
    /// Default: 1
    pub max_concurrency: usize,

    /// Disable plugins that need network access.
    pub offline: bool,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Ignore list configuration for suppressing known issues.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Packages and vulnerabilities to drop from reports.
///
/// Use this to suppress known false positives or accepted risks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to drop. Supports `*` wildcards (e.g., "@types/*").
    pub packages: Vec<String>,

    /// Vulnerability IDs to drop (e.g., "CVE-2021-12345", "GHSA-xxxx").
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, name: &str) -> bool {
        self.packages.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, name)
            } else {
                pattern == name
            }
        })
    }

    /// Check if a vulnerability should be ignored.
    pub fn should_ignore_vulnerability(&self, vuln_id: &str) -> bool {
        self.vulnerabilities.iter().any(|id| id == vuln_id)
    }

    /// Removes ignored packages, their vulnerabilities, and ignored
    /// vulnerability IDs from `inventory`.
    pub fn apply(&self, inventory: &mut Inventory) {
        inventory
            .packages
            .retain(|p| !self.should_ignore_package(&p.name));
        inventory.package_vulns.retain(|v| {
            !self.should_ignore_package(&v.package.name) && !self.should_ignore_vulnerability(v.id())
        });
        inventory
            .generic_findings
            .retain(|f| !self.should_ignore_vulnerability(f.reference()));
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            plugins: Vec::new(),
            explicit_plugins: false,
            dirs_to_skip: Vec::new(),
            skip_dir_regex: None,
            skip_dir_glob: None,
            max_file_size: None,
            max_inodes: None,
            use_gitignore: false,
            read_symlinks: false,
            store_absolute_path: false,
            max_concurrency: 1,
            offline: false,
            default_format: "table".to_string(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use invscan::Config;
    ///
    /// let path = Config::config_path();
    /// println!("Config file: {}", path.display());
    /// ```
    pub fn config_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// What a scan of this host provides under this configuration.
    pub fn capabilities(&self) -> Capabilities {
        host_capabilities(self.offline)
    }

    /// Builds a scan configuration without scan roots.
    ///
    /// Named plugins are looked up in `registry`. With no names configured,
    /// every registered plugin `capabilities` can run is enabled.
    pub fn to_scan_config(
        &self,
        registry: &Registry,
        capabilities: Capabilities,
    ) -> std::result::Result<ScanConfig, ScanError> {
        let plugins = if self.plugins.is_empty() {
            filter_by_capabilities(registry.all(), &capabilities)
        } else {
            registry.resolve(&self.plugins)?
        };

        let skip_dir_regex = self
            .skip_dir_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| ScanError::InvalidPattern(err.to_string()))?;

        Ok(ScanConfig {
            plugins,
            capabilities,
            dirs_to_skip: self.dirs_to_skip.clone(),
            skip_dir_regex,
            skip_dir_glob: self.skip_dir_glob.clone(),
            max_file_size: self.max_file_size,
            use_gitignore: self.use_gitignore,
            read_symlinks: self.read_symlinks,
            max_inodes: self.max_inodes,
            store_absolute_path: self.store_absolute_path,
            explicit_plugins: self.explicit_plugins,
            max_concurrency: self.max_concurrency.max(1),
            ..ScanConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Advisory, AdvisoryId, Package, PackageRef, PackageVuln, Severity};
    use crate::plugin::{Os, Plugin};

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.default_format, "table");
        assert_eq!(config.max_concurrency, 1);
        assert!(config.plugins.is_empty());
        assert!(!config.offline);
        assert!(config.ignore.packages.is_empty());
    }

    #[test]
    fn test_default_config_round_trips() {
        let parsed: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            plugins = ["os/apk"]
            skip_dir_regex = "^proc$"

            [ignore]
            packages = ["@types/*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.plugins, vec!["os/apk"]);
        assert_eq!(config.skip_dir_regex.as_deref(), Some("^proc$"));
        assert_eq!(config.cache_ttl_hours, 24);
        assert!(config.ignore.should_ignore_package("@types/node"));
    }

    #[test]
    fn test_to_scan_config_named_plugins() {
        let config = Config {
            plugins: vec!["os/apk".into()],
            skip_dir_regex: Some("^proc$".into()),
            max_concurrency: 0,
            ..Config::default()
        };
        let scan = config
            .to_scan_config(&Registry::builtins(None), Capabilities::all(Os::Linux))
            .unwrap();

        let names: Vec<_> = scan.plugins.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["os/apk"]);
        assert!(scan.skip_dir_regex.unwrap().is_match("proc"));
        assert_eq!(scan.max_concurrency, 1);
        assert!(scan.scan_roots.is_empty());
    }

    #[test]
    fn test_to_scan_config_filters_default_plugins() {
        let mut env = Capabilities::all(Os::Linux);
        env.network = false;
        env.running_system = false;
        let scan = Config::default()
            .to_scan_config(&Registry::builtins(None), env)
            .unwrap();

        assert!(scan.is_enabled("os/apk"));
        assert!(!scan.is_enabled("vulnmatch/osvdev"));
        assert!(!scan.is_enabled("javascript/npm-global"));
    }

    #[test]
    fn test_to_scan_config_errors() {
        let registry = Registry::builtins(None);
        let env = Capabilities::all(Os::Linux);

        let bad_regex = Config {
            skip_dir_regex: Some("(".into()),
            ..Config::default()
        };
        assert!(matches!(
            bad_regex.to_scan_config(&registry, env),
            Err(ScanError::InvalidPattern(_))
        ));

        let unknown = Config {
            plugins: vec!["os/dpkg".into()],
            ..Config::default()
        };
        assert!(matches!(
            unknown.to_scan_config(&registry, env),
            Err(ScanError::UnknownPlugin { .. })
        ));
    }

    #[test]
    fn test_ignore_apply() {
        let ignore = IgnoreConfig {
            packages: vec!["@types/*".into()],
            vulnerabilities: vec!["GHSA-1".into()],
        };
        let vuln = |name: &str, id: &str| PackageVuln {
            advisory: Some(Advisory::new(AdvisoryId::new("GHSA", id), Severity::High, id)),
            package: PackageRef {
                name: name.into(),
                version: "1.0.0".into(),
                locations: Vec::new(),
            },
            fixed_version: None,
            reference_url: None,
            plugins: Vec::new(),
        };

        let mut inventory = Inventory::from_packages(vec![
            Package::new("@types/node", "20.0.0"),
            Package::new("lodash", "4.17.20"),
        ]);
        inventory.package_vulns = vec![
            vuln("@types/node", "GHSA-2"),
            vuln("lodash", "GHSA-1"),
            vuln("lodash", "GHSA-3"),
        ];
        ignore.apply(&mut inventory);

        assert_eq!(inventory.packages.len(), 1);
        assert_eq!(inventory.packages[0].name, "lodash");
        let ids: Vec<_> = inventory.package_vulns.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["GHSA-3"]);
    }
}
