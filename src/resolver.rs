//! Dependency resolution between plugins.
//!
//! Detectors name the extractors they need and enrichers name the plugins
//! they need. Before a scan starts, every such name must be enabled: either
//! the caller enabled it, or it is looked up in the [`Registry`] and appended
//! to the configuration.

use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::plugin::{Plugin, PluginKind};
use crate::registry::Registry;
use crate::scanner::ScanConfig;

/// Appends every plugin the enabled plugins require and that isn't enabled
/// yet. With `explicit_plugins` set, a missing plugin is an error instead.
///
/// Plugins added in one round have their own requirements resolved in the
/// next, for up to `resolve_depth` rounds. A name is never added twice.
pub fn enable_required_plugins(config: &mut ScanConfig, registry: &Registry) -> Result<()> {
    let mut frontier: Vec<PluginKind> = config.plugins.clone();

    for round in 1..=config.resolve_depth.max(1) {
        let mut added: Vec<PluginKind> = Vec::new();
        for plugin in &frontier {
            for required in plugin.dependencies() {
                if config.is_enabled(&required) || added.iter().any(|p| p.name() == required) {
                    continue;
                }
                if config.explicit_plugins {
                    return Err(ScanError::RequiredPluginNotEnabled {
                        name: required,
                        required_by: plugin.name().to_string(),
                    });
                }
                let Some(instance) = registry.get(&required) else {
                    return Err(ScanError::UnknownPlugin {
                        name: required,
                        required_by: plugin.name().to_string(),
                    });
                };
                debug!(plugin = %required, required_by = plugin.name(), round, "Enabling required plugin");
                added.push(instance);
            }
        }

        if added.is_empty() {
            break;
        }
        info!(count = added.len(), round, "Enabled required plugins");
        config.plugins.extend(added.iter().cloned());
        frontier = added;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScanContext;
    use crate::detector::{Detector, XzBackdoorDetector};
    use crate::enricher::{Enricher, EnricherInput};
    use crate::model::Inventory;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn names(config: &ScanConfig) -> Vec<String> {
        config.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    fn xz() -> PluginKind {
        PluginKind::Detector(Arc::new(XzBackdoorDetector))
    }

    #[test]
    fn test_auto_enables_missing_extractor_once() {
        let mut config = ScanConfig::default().with_plugins([xz(), xz()]);
        enable_required_plugins(&mut config, &Registry::builtins(None)).unwrap();

        assert_eq!(
            names(&config),
            vec!["cve/cve-2024-3094", "cve/cve-2024-3094", "os/apk"]
        );
    }

    #[test]
    fn test_already_enabled_is_untouched() {
        let registry = Registry::builtins(None);
        let apk = registry.get("os/apk").unwrap();
        let mut config = ScanConfig::default().with_plugins([apk, xz()]);
        enable_required_plugins(&mut config, &registry).unwrap();
        assert_eq!(names(&config), vec!["os/apk", "cve/cve-2024-3094"]);
    }

    #[test]
    fn test_explicit_mode_names_missing_plugin() {
        let mut config = ScanConfig::default().with_plugins([xz()]);
        config.explicit_plugins = true;

        let err = enable_required_plugins(&mut config, &Registry::builtins(None)).unwrap_err();
        assert!(matches!(err, ScanError::RequiredPluginNotEnabled { ref name, .. } if name == "os/apk"));
        assert!(err.to_string().contains("os/apk"));
        assert_eq!(config.plugins.len(), 1);
    }

    #[test]
    fn test_unknown_required_plugin() {
        let mut config = ScanConfig::default().with_plugins([xz()]);
        let err = enable_required_plugins(&mut config, &Registry::new()).unwrap_err();
        assert!(matches!(err, ScanError::UnknownPlugin { ref name, .. } if name == "os/apk"));
    }

    /// Enricher requiring the xz detector, which in turn requires `os/apk`.
    struct Chained;

    impl Plugin for Chained {
        fn name(&self) -> &str {
            "misc/chained"
        }

        fn version(&self) -> u32 {
            0
        }
    }

    #[async_trait]
    impl Enricher for Chained {
        fn required_plugins(&self) -> Vec<String> {
            vec![XzBackdoorDetector::NAME.to_string()]
        }

        async fn enrich(
            &self,
            _ctx: &ScanContext,
            _input: &EnricherInput,
            _inventory: &mut Inventory,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn chained() -> PluginKind {
        PluginKind::Enricher(Arc::new(Chained))
    }

    #[test]
    fn test_single_level_by_default() {
        let mut config = ScanConfig::default().with_plugins([chained()]);
        enable_required_plugins(&mut config, &Registry::builtins(None)).unwrap();
        assert_eq!(names(&config), vec!["misc/chained", "cve/cve-2024-3094"]);
    }

    #[test]
    fn test_deeper_resolution() {
        let mut config = ScanConfig::default().with_plugins([chained()]);
        config.resolve_depth = 4;
        enable_required_plugins(&mut config, &Registry::builtins(None)).unwrap();
        assert_eq!(
            names(&config),
            vec!["misc/chained", "cve/cve-2024-3094", "os/apk"]
        );
    }

    #[test]
    fn test_detector_dependencies_are_reported() {
        assert_eq!(XzBackdoorDetector.required_extractors(), vec!["os/apk"]);
    }
}
