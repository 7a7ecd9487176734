//! Enrichers augment the inventory from external data sources.

mod osv;

pub use osv::{parse_cvss_score, OsvEnricher};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::model::{Inventory, PluginStatus};
use crate::plugin::Plugin;
use crate::scanner::{PhaseOutput, ScanConfig};

#[async_trait]
pub trait Enricher: Plugin {
    /// Names of the plugins whose output this enricher needs.
    fn required_plugins(&self) -> Vec<String>;

    async fn enrich(
        &self,
        ctx: &ScanContext,
        input: &EnricherInput,
        inventory: &mut Inventory,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct EnricherInput {
    pub scan_root: Option<PathBuf>,
}

/// Rank of an enricher in the run order: vulnerability matchers first, so
/// VEX and later enrichers see their findings.
fn precedence(name: &str) -> u8 {
    if name.starts_with("vulnmatch/") {
        0
    } else if name.starts_with("vex/") {
        1
    } else {
        2
    }
}

/// Orders enrichers by precedence, keeping configured order within a rank.
pub fn ordered(mut enrichers: Vec<Arc<dyn Enricher>>) -> Vec<Arc<dyn Enricher>> {
    enrichers.sort_by_key(|e| precedence(e.name()));
    enrichers
}

/// Runs every configured enricher, one at a time, over `inventory`.
pub(crate) async fn run(ctx: &ScanContext, config: &ScanConfig, inventory: &mut Inventory) -> PhaseOutput {
    let mut out = PhaseOutput::default();
    let enrichers = ordered(
        config
            .plugins
            .iter()
            .filter_map(|p| p.as_enricher().cloned())
            .collect(),
    );
    if enrichers.is_empty() {
        return out;
    }

    let input = EnricherInput {
        scan_root: config.scan_roots.first().map(|r| r.path.clone()),
    };
    if input.scan_root.is_none() {
        if let Some(needs_fs) = enrichers.iter().find(|e| e.requirements().direct_fs) {
            error!(enricher = needs_fs.name(), "Enricher needs a scan root");
            out.error = Some(ScanError::NoDirectFs {
                name: needs_fs.name().to_string(),
            });
            return out;
        }
    }

    info!(count = enrichers.len(), "Running enrichers");
    for enricher in enrichers {
        if let Err(err) = ctx.check() {
            out.error = Some(err);
            return out;
        }
        let name = enricher.name();
        let before = (inventory.package_vulns.len(), inventory.generic_findings.len());
        let result = enricher.enrich(ctx, &input, inventory).await;
        let after = (inventory.package_vulns.len(), inventory.generic_findings.len());

        let error = result.err().map(|err| {
            let reason = format!("{err:#}");
            warn!(enricher = name, error = %reason, "Enricher failed");
            reason
        });
        out.statuses.push(PluginStatus::from_error(
            name,
            enricher.version(),
            after != before,
            error,
        ));
    }
    out
}
