//! Standalone extraction phase.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::StandaloneInput;
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::model::PluginStatus;
use crate::scanner::{PhaseOutput, ScanConfig};

/// Runs every standalone extractor once against the first scan root.
pub(crate) async fn run(ctx: &ScanContext, config: &ScanConfig) -> PhaseOutput {
    let mut out = PhaseOutput::default();
    let extractors: Vec<_> = config
        .plugins
        .iter()
        .filter_map(|p| p.as_standalone_extractor().cloned())
        .collect();
    let Some(root) = config.scan_roots.first() else {
        return out;
    };
    if extractors.is_empty() {
        return out;
    }

    info!(count = extractors.len(), "Running standalone extractors");
    let input = StandaloneInput {
        scan_root: root.path.clone(),
    };

    let results: Vec<_> = stream::iter(extractors.iter().map(|extractor| {
        let input = &input;
        async move {
            ctx.check()?;
            Ok::<_, ScanError>((extractor, extractor.extract(ctx, input).await))
        }
    }))
    .buffered(config.max_concurrency.max(1))
    .collect()
    .await;

    for result in results {
        let (extractor, extracted) = match result {
            Ok(done) => done,
            Err(err) => {
                out.error.get_or_insert(err);
                continue;
            }
        };
        let name = extractor.name();
        match extracted {
            Ok(mut inventory) => {
                let dropped = inventory.drop_unnamed_packages();
                let error = (dropped > 0).then(|| {
                    warn!(extractor = name, dropped, "Dropped packages without a name");
                    format!("{dropped} package(s) without a name")
                });
                out.statuses.push(PluginStatus::from_error(
                    name,
                    extractor.version(),
                    !inventory.packages.is_empty(),
                    error,
                ));
                inventory.tag_plugin(name);
                out.inventory.append(inventory);
            }
            Err(err) => {
                warn!(extractor = name, error = %format!("{err:#}"), "Standalone extractor failed");
                out.statuses.push(PluginStatus::from_error(
                    name,
                    extractor.version(),
                    false,
                    Some(format!("{err:#}")),
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::StandaloneExtractor;
    use crate::model::{Inventory, Package, ScanStatus};
    use crate::plugin::{Plugin, PluginKind};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        result: Result<&'static str, &'static str>,
    }

    impl Plugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> u32 {
            2
        }
    }

    #[async_trait]
    impl StandaloneExtractor for Fixed {
        async fn extract(&self, _ctx: &ScanContext, input: &StandaloneInput) -> anyhow::Result<Inventory> {
            let pkg = self.result.map_err(|e| anyhow::anyhow!(e))?;
            Ok(Inventory::from_packages(vec![Package::new(pkg, "1.0")
                .with_location(input.scan_root.to_string_lossy())]))
        }
    }

    fn config(plugins: Vec<Fixed>) -> ScanConfig {
        ScanConfig::default().with_root("/scan").with_plugins(plugins.into_iter().map(|p| {
            let plugin: Arc<dyn StandaloneExtractor> = Arc::new(p);
            PluginKind::from(plugin)
        }))
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let config = config(vec![
            Fixed { name: "test/ok", result: Ok("pkg") },
            Fixed { name: "test/broken", result: Err("npm not found") },
        ]);

        let out = run(&ScanContext::new(), &config).await;
        assert!(out.error.is_none());
        assert_eq!(out.inventory.packages.len(), 1);
        assert_eq!(out.inventory.packages[0].plugins, vec!["test/ok"]);
        assert_eq!(out.inventory.packages[0].locations, vec!["/scan"]);
        assert_eq!(out.statuses[0], PluginStatus::succeeded("test/ok", 2));
        assert_eq!(out.statuses[1].status, ScanStatus::failed("npm not found"));
    }

    #[tokio::test]
    async fn test_nameless_packages_fail_the_extractor() {
        let config = config(vec![
            Fixed { name: "test/ok", result: Ok("pkg") },
            Fixed { name: "test/nameless", result: Ok("") },
        ]);

        let out = run(&ScanContext::new(), &config).await;
        assert!(out.error.is_none());
        assert_eq!(out.inventory.packages.len(), 1);
        assert_eq!(out.inventory.packages[0].name, "pkg");
        assert_eq!(
            out.statuses[1].status,
            ScanStatus::failed("1 package(s) without a name")
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = ScanContext::new();
        ctx.cancel();
        let out = run(&ctx, &config(vec![Fixed { name: "test/ok", result: Ok("pkg") }])).await;
        assert!(matches!(out.error, Some(ScanError::Cancelled)));
        assert!(out.statuses.is_empty());
    }
}
