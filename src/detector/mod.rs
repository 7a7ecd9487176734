//! Detectors look for security findings in the extracted inventory.
//!
//! Unlike the other phases, detection commits its findings atomically: they
//! only reach the inventory once every detector finished and
//! [`validate_advisories`] accepted them.

mod advisory;
mod xz;

pub use advisory::validate_advisories;
pub use xz::XzBackdoorDetector;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::model::{Finding, Inventory, PluginStatus};
use crate::packageindex::PackageIndex;
use crate::plugin::Plugin;
use crate::scanner::{PhaseOutput, ScanConfig};

#[async_trait]
pub trait Detector: Plugin {
    /// Names of the extractors whose packages this detector inspects.
    fn required_extractors(&self) -> Vec<String>;

    async fn scan(
        &self,
        ctx: &ScanContext,
        scan_root: &Path,
        index: &PackageIndex,
    ) -> anyhow::Result<Finding>;
}

/// Runs every configured detector over the package index.
pub(crate) async fn run(ctx: &ScanContext, config: &ScanConfig, index: &PackageIndex) -> PhaseOutput {
    let mut out = PhaseOutput::default();
    let detectors: Vec<_> = config
        .plugins
        .iter()
        .filter_map(|p| p.as_detector().cloned())
        .collect();
    if detectors.is_empty() {
        return out;
    }

    info!(count = detectors.len(), packages = index.len(), "Running detectors");
    let scan_root = config
        .scan_roots
        .first()
        .map(|r| r.path.clone())
        .unwrap_or_else(PathBuf::new);

    let results: Vec<_> = stream::iter(detectors.iter().map(|detector| {
        let scan_root = scan_root.as_path();
        async move {
            ctx.check()?;
            Ok::<_, ScanError>((detector, detector.scan(ctx, scan_root, index).await))
        }
    }))
    .buffered(config.max_concurrency.max(1))
    .collect()
    .await;

    let mut findings = Inventory::new();
    for result in results {
        let (detector, scanned) = match result {
            Ok(done) => done,
            Err(err) => {
                out.error.get_or_insert(err);
                continue;
            }
        };
        let name = detector.name();
        match scanned {
            Ok(finding) => {
                let mut tagged = Inventory::new();
                tagged.append_finding(finding);
                tagged.tag_plugin(name);
                findings.append(tagged);
                out.statuses
                    .push(PluginStatus::succeeded(name, detector.version()));
            }
            Err(err) => {
                let reason = format!("{err:#}");
                out.statuses
                    .push(PluginStatus::failed(name, detector.version(), &reason));
                if config.fail_on_detector_error {
                    error!(detector = name, error = %reason, "Detector failed, aborting scan");
                    out.error.get_or_insert(ScanError::Detector {
                        name: name.to_string(),
                        reason,
                    });
                } else {
                    warn!(detector = name, error = %reason, "Detector failed");
                }
            }
        }
    }

    if out.error.is_some() {
        return out;
    }
    if let Err(err) = validate_advisories(&findings) {
        out.error = Some(err);
        return out;
    }
    out.inventory = findings;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Advisory, AdvisoryId, GenericFinding, Package, ScanStatus, Severity, TargetDetails,
    };
    use crate::plugin::PluginKind;
    use std::sync::Arc;

    struct FakeDetector {
        name: &'static str,
        title: Option<&'static str>,
    }

    impl Plugin for FakeDetector {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> u32 {
            1
        }
    }

    #[async_trait]
    impl Detector for FakeDetector {
        fn required_extractors(&self) -> Vec<String> {
            Vec::new()
        }

        async fn scan(
            &self,
            _ctx: &ScanContext,
            _scan_root: &Path,
            _index: &PackageIndex,
        ) -> anyhow::Result<Finding> {
            let Some(title) = self.title else {
                anyhow::bail!("detection failed");
            };
            Ok(Finding {
                generic_findings: vec![GenericFinding {
                    advisory: Some(Advisory::new(
                        AdvisoryId::new("CVE", "CVE-1234"),
                        Severity::Medium,
                        title,
                    )),
                    target: Some(TargetDetails::default()),
                    plugins: Vec::new(),
                }],
                ..Default::default()
            })
        }
    }

    fn config(detectors: Vec<FakeDetector>) -> ScanConfig {
        ScanConfig::default().with_root("/").with_plugins(detectors.into_iter().map(|d| {
            let plugin: Arc<dyn Detector> = Arc::new(d);
            PluginKind::from(plugin)
        }))
    }

    fn index() -> PackageIndex {
        let mut pkg = Package::new("pkgA", "1.0");
        pkg.tag_plugin("test/extractor");
        PackageIndex::new(&[pkg]).unwrap()
    }

    #[tokio::test]
    async fn test_failing_detector_is_isolated() {
        let config = config(vec![
            FakeDetector { name: "det/a", title: Some("Issue") },
            FakeDetector { name: "det/b", title: None },
        ]);

        let out = run(&ScanContext::new(), &config, &index()).await;
        assert!(out.error.is_none());
        assert_eq!(out.statuses[0], PluginStatus::succeeded("det/a", 1));
        assert_eq!(out.statuses[1].status, ScanStatus::failed("detection failed"));
        assert_eq!(out.inventory.generic_findings.len(), 1);
        assert_eq!(out.inventory.generic_findings[0].plugins, vec!["det/a"]);
    }

    #[tokio::test]
    async fn test_failing_detector_can_abort() {
        let mut config = config(vec![
            FakeDetector { name: "det/a", title: Some("Issue") },
            FakeDetector { name: "det/b", title: None },
        ]);
        config.fail_on_detector_error = true;

        let out = run(&ScanContext::new(), &config, &index()).await;
        assert!(matches!(out.error, Some(ScanError::Detector { ref name, .. }) if name == "det/b"));
        assert!(out.inventory.is_empty());
        assert_eq!(out.statuses.len(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_advisories_abort() {
        let config = config(vec![
            FakeDetector { name: "det/a", title: Some("Issue") },
            FakeDetector { name: "det/b", title: Some("Different issue") },
        ]);

        let out = run(&ScanContext::new(), &config, &index()).await;
        assert!(matches!(out.error, Some(ScanError::AdvisoryConflict(_))));
        assert!(out.inventory.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_is_fatal() {
        let ctx = ScanContext::new();
        ctx.cancel();
        let config = config(vec![FakeDetector { name: "det/a", title: Some("Issue") }]);

        let out = run(&ctx, &config, &index()).await;
        assert!(matches!(out.error, Some(ScanError::Cancelled)));
    }
}
