//! Named plugin constructors, used to build default plugin sets and to
//! auto-enable plugins other plugins depend on.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotator::NpmSourceAnnotator;
use crate::cache::Cache;
use crate::detector::XzBackdoorDetector;
use crate::enricher::OsvEnricher;
use crate::error::{Result, ScanError};
use crate::extractor::{
    ApkExtractor, NpmGlobalExtractor, PackageJsonExtractor, VscodeExtensionExtractor,
};
use crate::plugin::{is_valid_name, Plugin, PluginKind};

/// Builds a fresh plugin instance.
pub type PluginConstructor = Arc<dyn Fn() -> PluginKind + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    constructors: BTreeMap<String, PluginConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in plugin, with OSV responses cached in the default
    /// cache directory.
    pub fn with_builtins() -> Self {
        Self::builtins(Some(Cache::new()))
    }

    /// Every built-in plugin. `cache` backs the network enrichers.
    pub fn builtins(cache: Option<Cache>) -> Self {
        let constructors: Vec<PluginConstructor> = vec![
            Arc::new(|| PluginKind::FilesystemExtractor(Arc::new(ApkExtractor))),
            Arc::new(|| PluginKind::FilesystemExtractor(Arc::new(PackageJsonExtractor))),
            Arc::new(|| PluginKind::FilesystemExtractor(Arc::new(VscodeExtensionExtractor))),
            Arc::new(|| PluginKind::StandaloneExtractor(Arc::new(NpmGlobalExtractor))),
            Arc::new(|| PluginKind::Detector(Arc::new(XzBackdoorDetector))),
            Arc::new(|| PluginKind::Annotator(Arc::new(NpmSourceAnnotator))),
            Arc::new(move || {
                let enricher = match &cache {
                    Some(cache) => OsvEnricher::new().with_cache(cache.clone()),
                    None => OsvEnricher::new(),
                };
                PluginKind::Enricher(Arc::new(enricher))
            }),
        ];

        let mut registry = Self::new();
        for constructor in constructors {
            let name = constructor().name().to_string();
            registry.constructors.insert(name, constructor);
        }
        registry
    }

    /// Registers a constructor under the name of the plugin it builds.
    pub fn register<F>(&mut self, constructor: F) -> Result<()>
    where
        F: Fn() -> PluginKind + Send + Sync + 'static,
    {
        let name = constructor().name().to_string();
        if !is_valid_name(&name) {
            return Err(ScanError::InvalidPluginName { name });
        }
        if self.constructors.contains_key(&name) {
            return Err(ScanError::DuplicatePlugin { name });
        }
        self.constructors.insert(name, Arc::new(constructor));
        Ok(())
    }

    /// A new instance of the named plugin.
    pub fn get(&self, name: &str) -> Option<PluginKind> {
        self.constructors.get(name).map(|constructor| constructor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// New instances of every registered plugin, sorted by name.
    pub fn all(&self) -> Vec<PluginKind> {
        self.constructors.values().map(|c| c()).collect()
    }

    /// New instances of the named plugins, failing on the first unknown name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<PluginKind>> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| ScanError::UnknownPlugin {
                    name: name.clone(),
                    required_by: "configuration".to_string(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.names())
            .finish()
    }
}
