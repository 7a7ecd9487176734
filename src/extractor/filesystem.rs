//! Filesystem extraction phase: walks every scan root and hands matching
//! files to the filesystem extractors.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use super::filter::{GitignoreCache, PathFilter};
use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::error::{Result, ScanError};
use crate::model::{Inventory, PluginStatus};
use crate::scanner::{PhaseOutput, ScanConfig, ScanRoot};

#[derive(Default)]
struct WalkState {
    inventory: Inventory,
    /// Errors per extractor name, each prefixed with the file path.
    errors: HashMap<String, Vec<String>>,
    /// Extractors that produced at least one package.
    found: HashSet<String>,
    /// Extractors picked by the override hook that aren't configured.
    extra: Vec<(String, u32)>,
    inodes_visited: usize,
    dirs_visited: usize,
    extract_calls: usize,
}

impl WalkState {
    fn record_error(&mut self, extractor: &str, message: String) {
        self.errors
            .entry(extractor.to_string())
            .or_default()
            .push(message);
    }

    fn statuses(&self, extractors: &[Arc<dyn FilesystemExtractor>]) -> Vec<PluginStatus> {
        extractors
            .iter()
            .map(|e| (e.name(), e.version()))
            .chain(self.extra.iter().map(|(name, version)| (name.as_str(), *version)))
            .map(|(name, version)| {
                let error = self.errors.get(name).map(|errs| errs.join("\n"));
                PluginStatus::from_error(name, version, self.found.contains(name), error)
            })
            .collect()
    }
}

/// Runs the configured filesystem extractors over every scan root.
pub(crate) async fn run(ctx: &ScanContext, config: &ScanConfig) -> PhaseOutput {
    let extractors = config.filesystem_extractors();
    if extractors.is_empty() && config.extractor_override.is_none() {
        return PhaseOutput::default();
    }

    let started = Instant::now();
    let mut state = WalkState::default();
    let mut error = None;

    for root in &config.scan_roots {
        info!(root = %root.path.display(), "Starting filesystem walk");
        if let Err(err) = walk_root(ctx, config, &extractors, root, &mut state).await {
            error = Some(err);
            break;
        }
    }

    info!(
        dirs_visited = state.dirs_visited,
        inodes_visited = state.inodes_visited,
        extract_calls = state.extract_calls,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Filesystem walk finished"
    );

    PhaseOutput {
        statuses: state.statuses(&extractors),
        inventory: state.inventory,
        error,
    }
}

async fn walk_root(
    ctx: &ScanContext,
    config: &ScanConfig,
    extractors: &[Arc<dyn FilesystemExtractor>],
    root: &ScanRoot,
    state: &mut WalkState,
) -> Result<()> {
    let unreadable = |source: io::Error| ScanError::ScanRoot {
        path: root.path.clone(),
        source,
    };
    let metadata = fs::metadata(&root.path).map_err(unreadable)?;
    if !metadata.is_dir() {
        return Err(unreadable(io::Error::other("not a directory")));
    }
    let abs_root = fs::canonicalize(&root.path).map_err(unreadable)?;

    let walk = RootWalk {
        ctx,
        config,
        extractors,
        root: &root.path,
        abs_root,
    };

    if config.paths_to_extract.is_empty() {
        return walk.walk_dir(&root.path, state).await;
    }

    for path in &config.paths_to_extract {
        let rel = walk.relative_target(path)?;
        let full = root.path.join(&rel);
        match fs::symlink_metadata(&full) {
            Ok(m) if m.is_dir() => walk.walk_dir(&full, state).await?,
            Ok(_) => {
                ctx.check()?;
                state.inodes_visited += 1;
                walk.visit_file(&rel, state).await?;
            }
            Err(err) => walk.fs_error(&full, &err, is_permission_denied(&err))?,
        }
    }
    Ok(())
}

struct RootWalk<'a> {
    ctx: &'a ScanContext,
    config: &'a ScanConfig,
    extractors: &'a [Arc<dyn FilesystemExtractor>],
    root: &'a Path,
    abs_root: PathBuf,
}

impl<'a> RootWalk<'a> {
    async fn walk_dir(&self, start: &Path, state: &mut WalkState) -> Result<()> {
        let root = self.root;
        let mut filter = self.path_filter();
        let max_depth = if self.config.ignore_sub_dirs { 1 } else { usize::MAX };

        let walker = WalkDir::new(start)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let rel = to_slash(entry.path().strip_prefix(root).unwrap_or(entry.path()));
                let skip = filter.should_skip(&rel, entry.file_type().is_dir());
                if skip {
                    debug!(path = %rel, "Skipping path");
                }
                !skip
            });

        for entry in walker {
            self.ctx.check()?;
            state.inodes_visited += 1;
            if let Some(max) = self.config.max_inodes {
                if state.inodes_visited > max {
                    return Err(ScanError::InodeBudgetExceeded(max));
                }
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(start).to_path_buf();
                    let permission = err.io_error().is_some_and(is_permission_denied);
                    self.fs_error(&path, &err, permission)?;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                state.dirs_visited += 1;
                continue;
            }
            if file_type.is_symlink() {
                if !self.config.read_symlinks {
                    continue;
                }
                match fs::metadata(entry.path()) {
                    Ok(target) if target.is_file() => {}
                    Ok(_) => continue,
                    Err(err) => {
                        self.fs_error(entry.path(), &err, is_permission_denied(&err))?;
                        continue;
                    }
                }
            } else if !file_type.is_file() {
                continue;
            }

            let rel = self.relative(entry.path());
            self.visit_file(&rel, state).await?;
        }
        Ok(())
    }

    async fn visit_file(&self, rel: &str, state: &mut WalkState) -> Result<()> {
        let api = FileApi::new(self.root, rel);
        if let Some(max) = self.config.max_file_size {
            if api.stat().is_some_and(|m| m.len() > max) {
                debug!(path = rel, max_file_size = max, "Skipping file above size limit");
                return Ok(());
            }
        }

        for extractor in self.select(&api, state) {
            self.ctx.check()?;
            self.run_extractor(&extractor, rel, state).await;
        }
        Ok(())
    }

    fn select(&self, api: &FileApi, state: &mut WalkState) -> Vec<Arc<dyn FilesystemExtractor>> {
        if let Some(hook) = &self.config.extractor_override {
            let chosen = hook(api);
            if !chosen.is_empty() {
                for extractor in &chosen {
                    let name = extractor.name();
                    let known = self.extractors.iter().any(|e| e.name() == name)
                        || state.extra.iter().any(|(n, _)| n == name);
                    if !known {
                        state.extra.push((name.to_string(), extractor.version()));
                    }
                }
                return chosen;
            }
        }
        self.extractors
            .iter()
            .filter(|e| e.file_required(api))
            .cloned()
            .collect()
    }

    async fn run_extractor(
        &self,
        extractor: &Arc<dyn FilesystemExtractor>,
        rel: &str,
        state: &mut WalkState,
    ) {
        let name = extractor.name();
        let file = match File::open(self.root.join(rel)) {
            Ok(file) => file,
            Err(err) => {
                state.record_error(name, format!("{rel}: {err}"));
                return;
            }
        };
        let size = file.metadata().map(|m| m.len()).unwrap_or_default();
        let mut input = ScanInput::new(self.root, rel, size, Box::new(BufReader::new(file)));

        state.extract_calls += 1;
        let started = Instant::now();
        let result = extractor.extract(self.ctx, &mut input).await;
        trace!(
            extractor = name,
            path = rel,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extract finished"
        );

        match result {
            Ok(mut inventory) => {
                let dropped = inventory.drop_unnamed_packages();
                if dropped > 0 {
                    warn!(extractor = name, path = rel, dropped, "Dropped packages without a name");
                    state.record_error(name, format!("{rel}: {dropped} package(s) without a name"));
                }
                if !inventory.packages.is_empty() {
                    state.found.insert(name.to_string());
                }
                for pkg in &mut inventory.packages {
                    if pkg.locations.is_empty() {
                        pkg.locations.push(rel.to_string());
                    }
                    if self.config.store_absolute_path {
                        pkg.locations = pkg
                            .locations
                            .iter()
                            .map(|l| self.abs_root.join(l).to_string_lossy().into_owned())
                            .collect();
                    }
                }
                inventory.tag_plugin(name);
                state.inventory.append(inventory);
            }
            Err(err) => {
                warn!(extractor = name, path = rel, error = %format!("{err:#}"), "Extractor failed");
                state.record_error(name, format!("{rel}: {err:#}"));
            }
        }
    }

    fn path_filter(&self) -> PathFilter<'a> {
        let config: &'a ScanConfig = self.config;
        PathFilter {
            dirs_to_skip: config
                .dirs_to_skip
                .iter()
                .filter_map(|dir| self.relative_target(dir).ok())
                .collect(),
            skip_dir_regex: config.skip_dir_regex.as_ref(),
            skip_dir_glob: config.skip_dir_glob.as_deref(),
            gitignore: config.use_gitignore.then(|| GitignoreCache::new(self.root)),
        }
    }

    /// Resolves a configured path to a root-relative one. Relative paths are
    /// taken as relative to the root already.
    fn relative_target(&self, path: &Path) -> Result<String> {
        if !path.is_absolute() {
            return Ok(to_slash(path));
        }
        path.strip_prefix(&self.abs_root)
            .or_else(|_| path.strip_prefix(self.root))
            .map(to_slash)
            .map_err(|_| ScanError::NotRelativeToScanRoots {
                path: path.to_path_buf(),
            })
    }

    fn relative(&self, path: &Path) -> String {
        to_slash(path.strip_prefix(self.root).unwrap_or(path))
    }

    fn fs_error(&self, path: &Path, err: &dyn std::fmt::Display, permission: bool) -> Result<()> {
        if self.config.error_on_fs_errors {
            return Err(ScanError::Filesystem {
                path: path.to_path_buf(),
                message: err.to_string(),
            });
        }
        if permission {
            debug!(path = %path.display(), error = %err, "Permission denied, skipping");
        } else {
            warn!(path = %path.display(), error = %err, "Filesystem error, skipping");
        }
        Ok(())
    }
}

fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Joins the normal components of `path` with `/`.
fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
