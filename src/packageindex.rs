//! Read-only lookup over the extracted packages, handed to detectors.

use std::collections::HashMap;

use crate::error::{Result, ScanError};
use crate::model::Package;

#[derive(Debug, Default, Clone)]
pub struct PackageIndex {
    packages: Vec<Package>,
    by_name: HashMap<String, Vec<usize>>,
    by_plugin: HashMap<String, Vec<usize>>,
}

impl PackageIndex {
    /// Builds the index. Every package needs a name and at least one
    /// producing plugin.
    pub fn new(packages: &[Package]) -> Result<Self> {
        let mut index = Self {
            packages: packages.to_vec(),
            ..Default::default()
        };

        for (i, pkg) in index.packages.iter().enumerate() {
            if pkg.name.is_empty() {
                return Err(ScanError::PackageIndex(format!(
                    "package at {:?} has no name",
                    pkg.locations
                )));
            }
            if pkg.plugins.is_empty() {
                return Err(ScanError::PackageIndex(format!(
                    "package {:?} has no producing plugin",
                    pkg.name
                )));
            }
            index.by_name.entry(pkg.name.clone()).or_default().push(i);
            for plugin in &pkg.plugins {
                index.by_plugin.entry(plugin.clone()).or_default().push(i);
            }
        }
        Ok(index)
    }

    pub fn get_all(&self) -> &[Package] {
        &self.packages
    }

    /// All packages with the given name, in extraction order.
    pub fn get_specific(&self, name: &str) -> Vec<&Package> {
        self.lookup(&self.by_name, name)
    }

    /// All packages the given plugin produced.
    pub fn get_all_of_plugin(&self, plugin: &str) -> Vec<&Package> {
        self.lookup(&self.by_plugin, plugin)
    }

    /// All packages whose ecosystem has the given name, e.g. `npm` or `alpine`.
    pub fn get_all_of_ecosystem(&self, ecosystem: &str) -> Vec<&Package> {
        self.packages
            .iter()
            .filter(|p| p.ecosystem.as_ref().is_some_and(|e| e.as_str() == ecosystem))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn lookup(&self, map: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&Package> {
        map.get(key)
            .map(|ids| ids.iter().map(|&i| &self.packages[i]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ecosystem;

    fn pkg(name: &str, plugin: &str) -> Package {
        let mut p = Package::new(name, "1.0").with_ecosystem(Ecosystem::Npm);
        p.tag_plugin(plugin);
        p
    }

    #[test]
    fn test_queries() {
        let index = PackageIndex::new(&[
            pkg("lodash", "javascript/packagejson"),
            pkg("lodash", "javascript/npm-global"),
            pkg("react", "javascript/packagejson"),
        ])
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get_specific("lodash").len(), 2);
        assert!(index.get_specific("vue").is_empty());
        assert_eq!(index.get_all_of_plugin("javascript/packagejson").len(), 2);
        assert_eq!(index.get_all_of_ecosystem("npm").len(), 3);
        assert!(index.get_all_of_ecosystem("alpine").is_empty());
    }

    #[test]
    fn test_rejects_malformed_packages() {
        assert!(matches!(
            PackageIndex::new(&[pkg("", "os/apk")]),
            Err(ScanError::PackageIndex(_))
        ));
        assert!(matches!(
            PackageIndex::new(&[Package::new("musl", "1.2.4")]),
            Err(ScanError::PackageIndex(_))
        ));
        assert!(PackageIndex::new(&[]).unwrap().is_empty());
    }
}
