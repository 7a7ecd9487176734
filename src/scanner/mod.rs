//! Scan orchestration.
//!
//! [`Scanner::scan`] runs pre-flight checks and then the phases in a fixed
//! order, threading one [`Inventory`] through them:
//!
//! | Phase | Runs | Plugin failure |
//! |-------|------|----------------|
//! | Filesystem extraction | Every file under each root | Recorded, scan continues |
//! | Standalone extraction | Once, against the first root | Recorded, scan continues |
//! | Package index | Once | Aborts the scan |
//! | Detection | Once per detector | Recorded, or aborts with `fail_on_detector_error` |
//! | Annotation | Once per annotator | Recorded, scan continues |
//! | Enrichment | Once per enricher | Recorded, scan continues |
//!
//! A fatal error stops the pipeline. The returned [`ScanResult`] still holds
//! every plugin status and package committed before the error.
//!
//! # Example
//!
//! ```no_run
//! use invscan::{Registry, ScanConfig, ScanContext, Scanner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Registry::with_builtins();
//!     let config = ScanConfig::default()
//!         .with_plugins(registry.resolve(&["os/apk".to_string()]).unwrap())
//!         .with_root("/");
//!
//!     let result = Scanner::new(registry).scan(&ScanContext::new(), config).await;
//!     println!("{}: {} packages", result.status, result.inventory.packages.len());
//! }
//! ```

mod config;
mod container;
mod result;

pub use config::{ExtractorOverride, ScanConfig, ScanRoot};
pub use container::{ChainLayer, DirImage, Image, LayerAttributor, PresenceAttributor};
pub use result::{aggregate_status, ScanResult};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::annotator;
use crate::context::ScanContext;
use crate::detector;
use crate::enricher;
use crate::error::{Result, ScanError};
use crate::extractor::{filesystem, standalone};
use crate::model::{Inventory, PluginStatus};
use crate::packageindex::PackageIndex;
use crate::plugin::{is_valid_name, validate_requirements, Plugin};
use crate::registry::Registry;
use crate::resolver::enable_required_plugins;

/// What one phase produced. `error` is set when the phase hit a fatal
/// error; whatever else it collected up to then is still kept.
#[derive(Debug, Default)]
pub struct PhaseOutput {
    pub inventory: Inventory,
    pub statuses: Vec<PluginStatus>,
    pub error: Option<ScanError>,
}

/// Inventory and statuses accumulated across phases.
#[derive(Debug, Default)]
struct Collected {
    inventory: Inventory,
    statuses: Vec<PluginStatus>,
}

impl Collected {
    /// Keeps everything the phase produced, then surfaces its error.
    fn merge(&mut self, out: PhaseOutput) -> Result<()> {
        self.inventory.append(out.inventory);
        self.statuses.extend(out.statuses);
        match out.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(self, start_time: DateTime<Utc>, error: Option<ScanError>) -> ScanResult {
        if let Some(err) = &error {
            error!(code = err.code(), error = %err, "Scan failed");
        }
        let result = ScanResult::new(start_time, self.statuses, self.inventory, error.as_ref());
        info!(
            status = result.status.as_str(),
            packages = result.inventory.packages.len(),
            vulns = result.inventory.package_vulns.len(),
            findings = result.inventory.generic_findings.len(),
            "Scan finished"
        );
        result
    }
}

/// Runs scans. Plugins that enabled plugins depend on are looked up in the
/// registry the scanner was built with.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    registry: Registry,
}

impl Scanner {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Scans the configured roots. Never fails: errors are reported through
    /// the status of the returned result.
    pub async fn scan(&self, ctx: &ScanContext, mut config: ScanConfig) -> ScanResult {
        let start_time = Utc::now();
        let mut collected = Collected::default();

        let mut outcome = self.extract_and_detect(ctx, &mut config, &mut collected).await;
        if outcome.is_ok() {
            outcome = enrich(ctx, &config, &mut collected).await;
        }
        collected.finish(start_time, outcome.err())
    }

    /// Pre-flight checks, then every phase up to and including annotation.
    async fn extract_and_detect(
        &self,
        ctx: &ScanContext,
        config: &mut ScanConfig,
        collected: &mut Collected,
    ) -> Result<()> {
        self.preflight(config)?;
        let config = &*config;
        info!(
            roots = config.scan_roots.len(),
            plugins = config.plugins.len(),
            "Starting scan"
        );

        collected.merge(filesystem::run(ctx, config).await)?;
        collected.merge(standalone::run(ctx, config).await)?;
        info!(packages = collected.inventory.packages.len(), "Extraction finished");

        let index = PackageIndex::new(&collected.inventory.packages)?;
        collected.merge(detector::run(ctx, config, &index).await)?;

        let out = annotator::run(ctx, config, &mut collected.inventory).await;
        collected.merge(out)
    }

    /// Resolves dependencies and rejects configurations no phase can run.
    fn preflight(&self, config: &mut ScanConfig) -> Result<()> {
        enable_required_plugins(config, &self.registry)?;

        if let Some(plugin) = config.plugins.iter().find(|p| !is_valid_name(p.name())) {
            return Err(ScanError::InvalidPluginName {
                name: plugin.name().to_string(),
            });
        }

        let unsatisfied: Vec<_> = config
            .plugins
            .iter()
            .filter_map(|p| validate_requirements(p, &config.capabilities).err())
            .collect();
        if !unsatisfied.is_empty() {
            return Err(ScanError::UnsatisfiedRequirements(unsatisfied));
        }

        if config.scan_roots.is_empty() {
            return Err(ScanError::NoScanRoot);
        }
        if !config.paths_to_extract.is_empty() && config.scan_roots.len() > 1 {
            return Err(ScanError::PathsWithSeveralRoots);
        }
        Ok(())
    }
}

async fn enrich(ctx: &ScanContext, config: &ScanConfig, collected: &mut Collected) -> Result<()> {
    let out = enricher::run(ctx, config, &mut collected.inventory).await;
    collected.merge(out)
}
