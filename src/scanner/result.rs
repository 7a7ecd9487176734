use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::model::{Inventory, Package, PluginStatus, ScanStatus, Severity};

/// Outcome of a scan. Always returned, even when the scan failed, so the
/// plugin statuses collected so far stay inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Version of the engine that produced the result.
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ScanStatus,
    pub plugin_statuses: Vec<PluginStatus>,
    pub inventory: Inventory,
}

impl ScanResult {
    /// Builds the final result: aggregates the status and sorts everything.
    pub(crate) fn new(
        start_time: DateTime<Utc>,
        plugin_statuses: Vec<PluginStatus>,
        inventory: Inventory,
        error: Option<&ScanError>,
    ) -> Self {
        let mut result = Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time,
            end_time: Utc::now(),
            status: aggregate_status(error, &plugin_statuses),
            plugin_statuses,
            inventory,
        };
        result.sort();
        result
    }

    /// A failed result with nothing collected.
    pub fn failed(start_time: DateTime<Utc>, error: &ScanError) -> Self {
        Self::new(start_time, Vec::new(), Inventory::new(), Some(error))
    }

    pub fn failed_plugins(&self) -> impl Iterator<Item = &PluginStatus> {
        self.plugin_statuses.iter().filter(|s| s.status.is_failed())
    }

    /// Highest severity among the package vulnerabilities and generic
    /// findings.
    pub fn max_severity(&self) -> Option<Severity> {
        let vulns = self
            .inventory
            .package_vulns
            .iter()
            .filter_map(|v| v.advisory.as_ref());
        let generic = self
            .inventory
            .generic_findings
            .iter()
            .filter_map(|f| f.advisory.as_ref());
        vulns.chain(generic).map(|a| a.severity).max()
    }

    /// Sorts statuses and inventory into a canonical order, so two runs
    /// over the same input serialize identically. Idempotent.
    pub fn sort(&mut self) {
        self.plugin_statuses
            .sort_by(|a, b| (&a.name, a.version).cmp(&(&b.name, b.version)));

        for package in &mut self.inventory.packages {
            package.locations.sort();
        }
        self.inventory.packages.sort_by_cached_key(package_sort_key);

        self.inventory
            .package_vulns
            .sort_by(|a, b| a.id().cmp(b.id()));
        self.inventory
            .generic_findings
            .sort_by(|a, b| (a.reference(), a.extra()).cmp(&(b.reference(), b.extra())));
    }
}

fn package_sort_key(package: &Package) -> (String, String, usize, String, String) {
    (
        package.name.clone(),
        package.version.clone(),
        package.plugins.len(),
        package.plugins.join(","),
        package.locations.join(","),
    )
}

/// Overall status: `Failed` on a fatal error, `PartiallySucceeded` when some
/// plugin failed, `Succeeded` otherwise.
pub fn aggregate_status(error: Option<&ScanError>, statuses: &[PluginStatus]) -> ScanStatus {
    if let Some(err) = error {
        return ScanStatus::failed(err.to_string());
    }

    let failed: Vec<&str> = statuses
        .iter()
        .filter(|s| s.status.is_failed())
        .map(|s| s.name.as_str())
        .collect();
    if failed.is_empty() {
        ScanStatus::Succeeded
    } else {
        ScanStatus::PartiallySucceeded {
            reason: format!("failed plugins: {}", failed.join(", ")),
        }
    }
}
