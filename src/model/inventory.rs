use serde::{Deserialize, Serialize};

use super::{Finding, GenericFinding, Package, PackageVuln};

/// Packages and findings accumulated over a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub packages: Vec<Package>,
    pub package_vulns: Vec<PackageVuln>,
    pub generic_findings: Vec<GenericFinding>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packages(packages: Vec<Package>) -> Self {
        Self {
            packages,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.package_vulns.is_empty() && self.generic_findings.is_empty()
    }

    /// Appends everything in `other` to this inventory.
    pub fn append(&mut self, other: Inventory) {
        self.packages.extend(other.packages);
        self.package_vulns.extend(other.package_vulns);
        self.generic_findings.extend(other.generic_findings);
    }

    /// Removes packages with an empty name and returns how many were removed.
    pub fn drop_unnamed_packages(&mut self) -> usize {
        let before = self.packages.len();
        self.packages.retain(|pkg| !pkg.name.is_empty());
        before - self.packages.len()
    }

    pub fn append_finding(&mut self, finding: Finding) {
        self.package_vulns.extend(finding.package_vulns);
        self.generic_findings.extend(finding.generic_findings);
    }

    /// Tags every entry with `plugin` as its producer.
    pub fn tag_plugin(&mut self, plugin: &str) {
        for pkg in &mut self.packages {
            pkg.tag_plugin(plugin);
        }
        for vuln in &mut self.package_vulns {
            if !vuln.plugins.iter().any(|p| p == plugin) {
                vuln.plugins.push(plugin.to_string());
            }
        }
        for finding in &mut self.generic_findings {
            if !finding.plugins.iter().any(|p| p == plugin) {
                finding.plugins.push(plugin.to_string());
            }
        }
    }
}
