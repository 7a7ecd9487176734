//! Annotators add context to packages that were already extracted.

mod npm_source;

pub use npm_source::NpmSourceAnnotator;

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::context::ScanContext;
use crate::model::{Inventory, Package, PluginStatus};
use crate::plugin::Plugin;
use crate::scanner::{PhaseOutput, ScanConfig};

#[async_trait]
pub trait Annotator: Plugin {
    /// Updates packages in place. Annotators must not add, remove or replace
    /// packages.
    async fn annotate(
        &self,
        ctx: &ScanContext,
        input: &AnnotatorInput,
        inventory: &mut Inventory,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct AnnotatorInput {
    pub scan_root: Option<PathBuf>,
}

/// Runs every configured annotator, one at a time, over `inventory`.
pub(crate) async fn run(ctx: &ScanContext, config: &ScanConfig, inventory: &mut Inventory) -> PhaseOutput {
    let mut out = PhaseOutput::default();
    let annotators: Vec<_> = config
        .plugins
        .iter()
        .filter_map(|p| p.as_annotator().cloned())
        .collect();
    if annotators.is_empty() {
        return out;
    }

    info!(count = annotators.len(), "Running annotators");
    let input = AnnotatorInput {
        scan_root: config.scan_roots.first().map(|r| r.path.clone()),
    };

    for annotator in annotators {
        if let Err(err) = ctx.check() {
            out.error = Some(err);
            return out;
        }
        let name = annotator.name();
        let before = inventory.packages.clone();
        let result = annotator.annotate(ctx, &input, inventory).await;

        let status = if !same_packages(&before, &inventory.packages) {
            inventory.packages = before;
            warn!(annotator = name, "Annotator changed the package set, reverting");
            PluginStatus::failed(name, annotator.version(), "annotator changed the package set")
        } else {
            match result {
                Ok(()) => PluginStatus::succeeded(name, annotator.version()),
                Err(err) => {
                    warn!(annotator = name, error = %format!("{err:#}"), "Annotator failed");
                    PluginStatus::failed(name, annotator.version(), format!("{err:#}"))
                }
            }
        };
        out.statuses.push(status);
    }
    out
}

/// Same packages in the same order, by name, version and locations.
fn same_packages(before: &[Package], after: &[Package]) -> bool {
    before.len() == after.len()
        && before.iter().zip(after).all(|(a, b)| {
            a.name == b.name && a.version == b.version && a.locations == b.locations
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::model::{Package, ScanStatus};
    use crate::plugin::PluginKind;
    use std::sync::Arc;

    enum Behavior {
        Tag,
        Fail,
        AddPackage,
        ReplacePackage,
    }

    struct FakeAnnotator(&'static str, Behavior);

    impl Plugin for FakeAnnotator {
        fn name(&self) -> &str {
            self.0
        }

        fn version(&self) -> u32 {
            0
        }
    }

    #[async_trait]
    impl Annotator for FakeAnnotator {
        async fn annotate(
            &self,
            _ctx: &ScanContext,
            _input: &AnnotatorInput,
            inventory: &mut Inventory,
        ) -> anyhow::Result<()> {
            match self.1 {
                Behavior::Tag => {
                    for pkg in &mut inventory.packages {
                        pkg.annotations.insert("seen".into(), "yes".into());
                    }
                    Ok(())
                }
                Behavior::Fail => anyhow::bail!("lockfile missing"),
                Behavior::AddPackage => {
                    inventory.packages.push(Package::new("intruder", "1.0"));
                    Ok(())
                }
                Behavior::ReplacePackage => {
                    inventory.packages.pop();
                    inventory.packages.push(Package::new("intruder", "1.0"));
                    Ok(())
                }
            }
        }
    }

    fn config(annotators: Vec<FakeAnnotator>) -> ScanConfig {
        ScanConfig::default().with_root("/").with_plugins(annotators.into_iter().map(|a| {
            let plugin: Arc<dyn Annotator> = Arc::new(a);
            PluginKind::from(plugin)
        }))
    }

    #[tokio::test]
    async fn test_annotators_mutate_in_place() {
        let mut inventory = Inventory::from_packages(vec![Package::new("lodash", "4.17.21")]);
        let config = config(vec![
            FakeAnnotator("test/fail", Behavior::Fail),
            FakeAnnotator("test/tag", Behavior::Tag),
            FakeAnnotator("test/add", Behavior::AddPackage),
        ]);

        let out = run(&ScanContext::new(), &config, &mut inventory).await;
        assert!(out.error.is_none());
        assert_eq!(out.statuses[0].status, ScanStatus::failed("lockfile missing"));
        assert!(out.statuses[1].status.is_succeeded());
        assert_eq!(
            out.statuses[2].status,
            ScanStatus::failed("annotator changed the package set")
        );
        assert_eq!(inventory.packages.len(), 1);
        assert_eq!(inventory.packages[0].annotations["seen"], "yes");
    }

    #[tokio::test]
    async fn test_replacing_a_package_is_reverted() {
        let mut inventory = Inventory::from_packages(vec![
            Package::new("lodash", "4.17.21"),
            Package::new("express", "4.18.2"),
        ]);
        let config = config(vec![
            FakeAnnotator("test/replace", Behavior::ReplacePackage),
            FakeAnnotator("test/tag", Behavior::Tag),
        ]);

        let out = run(&ScanContext::new(), &config, &mut inventory).await;
        assert_eq!(
            out.statuses[0].status,
            ScanStatus::failed("annotator changed the package set")
        );
        assert!(out.statuses[1].status.is_succeeded());
        let names: Vec<_> = inventory.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["lodash", "express"]);
        assert!(inventory.packages.iter().all(|p| p.annotations["seen"] == "yes"));
    }

    #[test]
    fn test_same_packages_ignores_annotations() {
        let before = vec![Package::new("lodash", "4.17.21").with_location("a/package.json")];
        let mut after = before.clone();
        after[0].annotations.insert("source".into(), "npm".into());
        assert!(same_packages(&before, &after));

        after[0].locations.push("b/package.json".into());
        assert!(!same_packages(&before, &after));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let ctx = ScanContext::new();
        ctx.cancel();
        let mut inventory = Inventory::new();
        let out = run(&ctx, &config(vec![FakeAnnotator("test/tag", Behavior::Tag)]), &mut inventory).await;
        assert!(matches!(out.error, Some(ScanError::Cancelled)));
    }
}
