//! Scans over container images.
//!
//! An image is seen as a list of chain layers: the filesystem as it looks
//! after each layer was applied. Extraction through annotation run on the
//! final layer, then a [`LayerAttributor`] records which layer introduced
//! each package, and only then do enrichers run, so they see layer details.

use anyhow::{bail, Context};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{enrich, Collected, ScanConfig, ScanResult, ScanRoot, Scanner};
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::model::{Inventory, LayerDetails};

/// The filesystem of an image up to and including one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLayer {
    pub index: usize,
    pub diff_id: String,
    /// Command that created the layer, if known.
    pub command: String,
    /// Directory holding the cumulative filesystem of this layer.
    pub root: PathBuf,
}

/// A container image, as chain layers from the base layer up.
pub trait Image: Send + Sync {
    fn chain_layers(&self) -> &[ChainLayer];
}

/// An image whose chain layers are already unpacked into directories.
#[derive(Debug, Clone, Default)]
pub struct DirImage {
    layers: Vec<ChainLayer>,
}

impl DirImage {
    /// One chain layer per directory, base layer first. Each layer's diff ID
    /// is its directory name.
    pub fn from_dirs<I, P>(dirs: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut layers = Vec::new();
        for (index, dir) in dirs.into_iter().enumerate() {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                bail!("chain layer {} is not a directory", dir.display());
            }
            let root = dir
                .canonicalize()
                .with_context(|| format!("Failed to resolve chain layer {}", dir.display()))?;
            let diff_id = root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            layers.push(ChainLayer {
                index,
                diff_id,
                command: String::new(),
                root,
            });
        }
        Ok(Self { layers })
    }

    pub fn from_layers(layers: Vec<ChainLayer>) -> Self {
        Self { layers }
    }
}

impl Image for DirImage {
    fn chain_layers(&self) -> &[ChainLayer] {
        &self.layers
    }
}

/// Fills in [`LayerDetails`] for the packages of a container scan.
pub trait LayerAttributor: Send + Sync {
    fn attribute(&self, layers: &[ChainLayer], inventory: &mut Inventory) -> anyhow::Result<()>;
}

/// Attributes a package to the earliest layer of the unbroken run of final
/// layers in which its first location exists. Packages whose location is
/// missing from the final layer are left unattributed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceAttributor {
    base_layers: usize,
}

impl PresenceAttributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `count` layers belong to the base image.
    pub fn with_base_layers(mut self, count: usize) -> Self {
        self.base_layers = count;
        self
    }
}

impl LayerAttributor for PresenceAttributor {
    fn attribute(&self, layers: &[ChainLayer], inventory: &mut Inventory) -> anyhow::Result<()> {
        let Some(last) = layers.last() else {
            bail!("no chain layers to attribute packages to");
        };

        for package in &mut inventory.packages {
            let Some(location) = package.locations.first() else {
                continue;
            };
            let path = Path::new(location);
            let relative = path.strip_prefix(&last.root).unwrap_or(path);
            let relative = relative.strip_prefix("/").unwrap_or(relative);

            let origin = layers
                .iter()
                .rev()
                .take_while(|layer| layer.root.join(relative).exists())
                .last();
            let Some(origin) = origin else {
                debug!(package = %package.name, location = %location, "Location missing from final layer");
                continue;
            };
            package.layer_details = Some(LayerDetails {
                index: origin.index,
                diff_id: origin.diff_id.clone(),
                command: origin.command.clone(),
                in_base_image: origin.index < self.base_layers,
            });
        }
        Ok(())
    }
}

impl Scanner {
    /// Scans a container image. Any configured scan roots are replaced by
    /// the image's final chain layer.
    pub async fn scan_container(
        &self,
        ctx: &ScanContext,
        image: &dyn Image,
        attributor: &dyn LayerAttributor,
        mut config: ScanConfig,
    ) -> ScanResult {
        let start_time = Utc::now();
        let layers = image.chain_layers();
        let Some(last) = layers.last() else {
            return Collected::default().finish(start_time, Some(ScanError::NoChainLayers));
        };

        if !config.scan_roots.is_empty() {
            warn!(
                roots = config.scan_roots.len(),
                "Scan roots are ignored for container scans"
            );
        }
        config.scan_roots = vec![ScanRoot::new(last.root.clone())];
        info!(layers = layers.len(), root = %last.root.display(), "Scanning container image");

        let mut collected = Collected::default();
        let mut outcome = self.extract_and_detect(ctx, &mut config, &mut collected).await;
        if outcome.is_ok() {
            outcome = attributor
                .attribute(layers, &mut collected.inventory)
                .map_err(|err| ScanError::LayerAttribution(format!("{err:#}")));
        }
        if outcome.is_ok() {
            outcome = enrich(ctx, &config, &mut collected).await;
        }
        collected.finish(start_time, outcome.err())
    }
}
