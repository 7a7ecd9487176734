//! The plugin contract shared by every plugin kind.
//!
//! Each plugin has a globally unique [`name`](Plugin::name) matching
//! `^[a-z0-9/-]+$`, a version, and the [`Capabilities`] it needs from the
//! scanning environment. The kinds themselves live in their own modules:
//!
//! | Kind | Trait | Runs |
//! |------|-------|------|
//! | Filesystem extractor | [`FilesystemExtractor`] | Once per matching file |
//! | Standalone extractor | [`StandaloneExtractor`] | Once per scan |
//! | Detector | [`Detector`] | Once, over the package index |
//! | Annotator | [`Annotator`] | Once, mutating the inventory |
//! | Enricher | [`Enricher`] | Once, mutating the inventory |
//!
//! [`PluginKind`] ties them together as a closed set so the engine dispatches
//! on the variant instead of probing trait objects at runtime.

mod capability;

pub use capability::{filter_by_capabilities, is_valid_name, validate_requirements, Capabilities, Os};

use std::sync::Arc;

use crate::annotator::Annotator;
use crate::detector::Detector;
use crate::enricher::Enricher;
use crate::extractor::{FilesystemExtractor, StandaloneExtractor};

/// Identity and requirements common to all plugins.
pub trait Plugin: Send + Sync {
    /// Unique name, e.g. `os/apk`.
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    /// What the plugin needs from the scanning environment.
    fn requirements(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// An enabled plugin of any kind.
#[derive(Clone)]
pub enum PluginKind {
    FilesystemExtractor(Arc<dyn FilesystemExtractor>),
    StandaloneExtractor(Arc<dyn StandaloneExtractor>),
    Detector(Arc<dyn Detector>),
    Annotator(Arc<dyn Annotator>),
    Enricher(Arc<dyn Enricher>),
}

impl PluginKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PluginKind::FilesystemExtractor(_) => "filesystem extractor",
            PluginKind::StandaloneExtractor(_) => "standalone extractor",
            PluginKind::Detector(_) => "detector",
            PluginKind::Annotator(_) => "annotator",
            PluginKind::Enricher(_) => "enricher",
        }
    }

    /// Names of the plugins this plugin needs enabled alongside it.
    pub fn dependencies(&self) -> Vec<String> {
        match self {
            PluginKind::Detector(d) => d.required_extractors(),
            PluginKind::Enricher(e) => e.required_plugins(),
            _ => Vec::new(),
        }
    }

    pub fn as_filesystem_extractor(&self) -> Option<&Arc<dyn FilesystemExtractor>> {
        match self {
            PluginKind::FilesystemExtractor(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_standalone_extractor(&self) -> Option<&Arc<dyn StandaloneExtractor>> {
        match self {
            PluginKind::StandaloneExtractor(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_detector(&self) -> Option<&Arc<dyn Detector>> {
        match self {
            PluginKind::Detector(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_annotator(&self) -> Option<&Arc<dyn Annotator>> {
        match self {
            PluginKind::Annotator(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_enricher(&self) -> Option<&Arc<dyn Enricher>> {
        match self {
            PluginKind::Enricher(e) => Some(e),
            _ => None,
        }
    }
}

impl Plugin for PluginKind {
    fn name(&self) -> &str {
        match self {
            PluginKind::FilesystemExtractor(p) => p.name(),
            PluginKind::StandaloneExtractor(p) => p.name(),
            PluginKind::Detector(p) => p.name(),
            PluginKind::Annotator(p) => p.name(),
            PluginKind::Enricher(p) => p.name(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            PluginKind::FilesystemExtractor(p) => p.version(),
            PluginKind::StandaloneExtractor(p) => p.version(),
            PluginKind::Detector(p) => p.version(),
            PluginKind::Annotator(p) => p.version(),
            PluginKind::Enricher(p) => p.version(),
        }
    }

    fn requirements(&self) -> Capabilities {
        match self {
            PluginKind::FilesystemExtractor(p) => p.requirements(),
            PluginKind::StandaloneExtractor(p) => p.requirements(),
            PluginKind::Detector(p) => p.requirements(),
            PluginKind::Annotator(p) => p.requirements(),
            PluginKind::Enricher(p) => p.requirements(),
        }
    }
}

impl std::fmt::Debug for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({} v{})", self.kind_name(), self.name(), self.version())
    }
}

macro_rules! impl_from_arc {
    ($trait:ident, $variant:ident) => {
        impl From<Arc<dyn $trait>> for PluginKind {
            fn from(plugin: Arc<dyn $trait>) -> Self {
                PluginKind::$variant(plugin)
            }
        }
    };
}

impl_from_arc!(FilesystemExtractor, FilesystemExtractor);
impl_from_arc!(StandaloneExtractor, StandaloneExtractor);
impl_from_arc!(Detector, Detector);
impl_from_arc!(Annotator, Annotator);
impl_from_arc!(Enricher, Enricher);
