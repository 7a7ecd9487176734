use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::extractor::{FileApi, FilesystemExtractor};
use crate::plugin::{Capabilities, PluginKind};

/// Picks the extractors to run on a file instead of the `file_required`
/// filter. An empty list falls back to the filter.
pub type ExtractorOverride =
    Arc<dyn Fn(&FileApi) -> Vec<Arc<dyn FilesystemExtractor>> + Send + Sync>;

/// A directory to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: PathBuf,
}

impl ScanRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Everything a scan needs. The resolver may append plugins during
/// pre-flight; the phases only read it.
#[derive(Clone)]
pub struct ScanConfig {
    pub plugins: Vec<PluginKind>,
    /// What the scanning environment provides.
    pub capabilities: Capabilities,
    pub scan_roots: Vec<ScanRoot>,
    /// Restrict extraction to these files or directories. Requires a single
    /// scan root.
    pub paths_to_extract: Vec<PathBuf>,
    /// Only look at direct children of the walked directories.
    pub ignore_sub_dirs: bool,
    pub dirs_to_skip: Vec<PathBuf>,
    pub skip_dir_regex: Option<Regex>,
    pub skip_dir_glob: Option<String>,
    /// Files larger than this many bytes are not offered to extractors.
    pub max_file_size: Option<u64>,
    /// Honor `.gitignore` files found during the walk, including `!`, `**`,
    /// `?` and `[...]` patterns. As in git, nothing inside an ignored
    /// directory can be re-included.
    pub use_gitignore: bool,
    pub read_symlinks: bool,
    pub max_inodes: Option<usize>,
    pub store_absolute_path: bool,
    /// Fail instead of auto-enabling plugins that other plugins require.
    pub explicit_plugins: bool,
    pub extractor_override: Option<ExtractorOverride>,
    pub error_on_fs_errors: bool,
    /// Upper bound on plugins running at once within a phase.
    pub max_concurrency: usize,
    /// Rounds of dependency resolution. 1 only looks at the configured
    /// plugins; auto-added plugins get their own requirements resolved in
    /// later rounds.
    pub resolve_depth: usize,
    /// Abort the scan when a detector fails instead of recording it.
    pub fail_on_detector_error: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            capabilities: Capabilities::default(),
            scan_roots: Vec::new(),
            paths_to_extract: Vec::new(),
            ignore_sub_dirs: false,
            dirs_to_skip: Vec::new(),
            skip_dir_regex: None,
            skip_dir_glob: None,
            max_file_size: None,
            use_gitignore: false,
            read_symlinks: false,
            max_inodes: None,
            store_absolute_path: false,
            explicit_plugins: false,
            extractor_override: None,
            error_on_fs_errors: false,
            max_concurrency: 1,
            resolve_depth: 1,
            fail_on_detector_error: false,
        }
    }
}

impl ScanConfig {
    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = PluginKind>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn with_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.scan_roots.push(ScanRoot::new(path));
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        use crate::plugin::Plugin;
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub(crate) fn filesystem_extractors(&self) -> Vec<Arc<dyn FilesystemExtractor>> {
        self.plugins
            .iter()
            .filter_map(|p| p.as_filesystem_extractor().cloned())
            .collect()
    }
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("plugins", &self.plugins)
            .field("capabilities", &self.capabilities)
            .field("scan_roots", &self.scan_roots)
            .field("paths_to_extract", &self.paths_to_extract)
            .field("ignore_sub_dirs", &self.ignore_sub_dirs)
            .field("dirs_to_skip", &self.dirs_to_skip)
            .field("skip_dir_regex", &self.skip_dir_regex)
            .field("skip_dir_glob", &self.skip_dir_glob)
            .field("max_file_size", &self.max_file_size)
            .field("use_gitignore", &self.use_gitignore)
            .field("read_symlinks", &self.read_symlinks)
            .field("max_inodes", &self.max_inodes)
            .field("store_absolute_path", &self.store_absolute_path)
            .field("explicit_plugins", &self.explicit_plugins)
            .field("extractor_override", &self.extractor_override.is_some())
            .field("error_on_fs_errors", &self.error_on_fs_errors)
            .field("max_concurrency", &self.max_concurrency)
            .field("resolve_depth", &self.resolve_depth)
            .field("fail_on_detector_error", &self.fail_on_detector_error)
            .finish()
    }
}
