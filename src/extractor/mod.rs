//! Extractors discover packages.
//!
//! Two kinds exist:
//!
//! | Kind | Trait | Input |
//! |------|-------|-------|
//! | Filesystem | [`FilesystemExtractor`] | One file found by the walk |
//! | Standalone | [`StandaloneExtractor`] | The scan root as a whole |
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use invscan::extractor::{FileApi, FilesystemExtractor, ScanInput};
//! use invscan::model::{Inventory, Package};
//! use invscan::plugin::Plugin;
//! use invscan::ScanContext;
//! use std::io::Read;
//!
//! struct VersionFile;
//!
//! impl Plugin for VersionFile {
//!     fn name(&self) -> &str { "misc/version-file" }
//!     fn version(&self) -> u32 { 0 }
//! }
//!
//! #[async_trait]
//! impl FilesystemExtractor for VersionFile {
//!     fn file_required(&self, api: &FileApi) -> bool {
//!         api.file_name() == "VERSION"
//!     }
//!
//!     async fn extract(&self, _ctx: &ScanContext, input: &mut ScanInput) -> anyhow::Result<Inventory> {
//!         let mut version = String::new();
//!         input.reader.read_to_string(&mut version)?;
//!         Ok(Inventory::from_packages(vec![Package::new("app", version.trim())]))
//!     }
//! }
//! ```

mod apk;
pub(crate) mod filesystem;
mod filter;
mod npm;
mod packagejson;
pub(crate) mod standalone;
mod vscode;

pub use apk::ApkExtractor;
pub use filter::glob_match;
pub use npm::NpmGlobalExtractor;
pub use packagejson::PackageJsonExtractor;
pub use vscode::VscodeExtensionExtractor;

use async_trait::async_trait;
use std::fs::{self, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::context::ScanContext;
use crate::model::Inventory;
use crate::plugin::Plugin;

/// Extracts packages from individual files found while walking a scan root.
#[async_trait]
pub trait FilesystemExtractor: Plugin {
    /// Whether the walk should hand this file to [`extract`](Self::extract).
    fn file_required(&self, api: &FileApi) -> bool;

    async fn extract(&self, ctx: &ScanContext, input: &mut ScanInput) -> anyhow::Result<Inventory>;
}

/// Extracts packages from the scan root without a per-file walk, e.g. by
/// querying a package manager.
#[async_trait]
pub trait StandaloneExtractor: Plugin {
    async fn extract(&self, ctx: &ScanContext, input: &StandaloneInput)
        -> anyhow::Result<Inventory>;
}

/// View of a walked file offered to [`FilesystemExtractor::file_required`].
pub struct FileApi<'a> {
    root: &'a Path,
    path: &'a str,
    stat: OnceLock<Option<Metadata>>,
}

impl<'a> FileApi<'a> {
    pub fn new(root: &'a Path, path: &'a str) -> Self {
        Self {
            root,
            path,
            stat: OnceLock::new(),
        }
    }

    /// Path relative to the scan root, `/`-separated.
    pub fn path(&self) -> &str {
        self.path
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }

    /// File metadata, read on first call and cached. `None` if the file
    /// can't be stat'ed.
    pub fn stat(&self) -> Option<&Metadata> {
        self.stat
            .get_or_init(|| fs::metadata(self.root.join(self.path)).ok())
            .as_ref()
    }
}

/// An opened file handed to [`FilesystemExtractor::extract`].
pub struct ScanInput {
    /// The scan root the file was found under.
    pub root: PathBuf,
    /// Path relative to `root`, `/`-separated.
    pub path: String,
    pub size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl ScanInput {
    pub fn new(
        root: impl Into<PathBuf>,
        path: impl Into<String>,
        size: u64,
        reader: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
            size,
            reader,
        }
    }

    /// Reads the remaining content as UTF-8.
    pub fn read_to_string(&mut self) -> std::io::Result<String> {
        let mut content = String::new();
        self.reader.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Absolute location of the file on disk.
    pub fn full_path(&self) -> PathBuf {
        self.root.join(&self.path)
    }
}

/// Input of a [`StandaloneExtractor`].
#[derive(Debug, Clone)]
pub struct StandaloneInput {
    pub scan_root: PathBuf,
}
