use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::{Annotator, AnnotatorInput};
use crate::context::ScanContext;
use crate::model::{Ecosystem, Inventory, JavascriptMetadata, PackageMetadata};
use crate::plugin::{Capabilities, Plugin};

const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org/";

/// Lockfiles npm installs from, most authoritative first. Paths are relative
/// to the project root.
const LOCKFILES: [&str; 3] = [
    "npm-shrinkwrap.json",
    "package-lock.json",
    "node_modules/.package-lock.json",
];

/// Marks installed npm packages as resolved from the public registry or not,
/// which exposes locally published packages shadowing registry names.
pub struct NpmSourceAnnotator;

impl NpmSourceAnnotator {
    pub const NAME: &'static str = "misc/npm-source";
}

#[derive(Deserialize)]
struct Lockfile {
    packages: Option<BTreeMap<String, LockfilePackage>>,
    dependencies: Option<BTreeMap<String, LockfileDependency>>,
}

#[derive(Deserialize)]
struct LockfilePackage {
    name: Option<String>,
    resolved: Option<String>,
}

#[derive(Deserialize)]
struct LockfileDependency {
    version: Option<String>,
    resolved: Option<String>,
    dependencies: Option<BTreeMap<String, LockfileDependency>>,
}

impl Plugin for NpmSourceAnnotator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn requirements(&self) -> Capabilities {
        Capabilities {
            direct_fs: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Annotator for NpmSourceAnnotator {
    async fn annotate(
        &self,
        _ctx: &ScanContext,
        input: &AnnotatorInput,
        inventory: &mut Inventory,
    ) -> Result<()> {
        let scan_root = input
            .scan_root
            .as_deref()
            .ok_or_else(|| anyhow!("no scan root to read lockfiles from"))?;

        // Package indices grouped by project root.
        let mut projects: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, pkg) in inventory.packages.iter().enumerate() {
            if pkg.ecosystem != Some(Ecosystem::Npm) {
                continue;
            }
            if let Some(root) = pkg.locations.iter().find_map(|l| project_root(l)) {
                projects.entry(root.to_string()).or_default().push(i);
            }
        }

        let mut errors = Vec::new();
        for (root, indices) in projects {
            let resolved = match resolved_from_lockfile(&scan_root.join(&root)) {
                Ok(resolved) => Some(resolved),
                Err(err) => {
                    errors.push(format!("no usable lockfile in {root:?}: {err:#}"));
                    None
                }
            };
            for i in indices {
                let pkg = &mut inventory.packages[i];
                if pkg.metadata.is_none() {
                    pkg.metadata = Some(PackageMetadata::Javascript(JavascriptMetadata::default()));
                }
                let name = pkg.name.clone();
                let Some(metadata) = pkg.javascript_metadata_mut() else {
                    errors.push(format!("package {name:?} has non-JavaScript metadata"));
                    continue;
                };
                // Without a lockfile the package counts as locally published.
                metadata.from_npm_registry = Some(
                    resolved
                        .as_ref()
                        .is_some_and(|r| r.get(&name).copied().unwrap_or(false)),
                );
            }
        }

        if !errors.is_empty() {
            bail!(errors.join("\n"));
        }
        Ok(())
    }
}

/// The directory holding `node_modules` for a `.../node_modules/.../package.json`
/// location, relative to the scan root.
fn project_root(location: &str) -> Option<&str> {
    if !location.ends_with("package.json") {
        return None;
    }
    if location.starts_with("node_modules/") {
        return Some("");
    }
    location
        .find("/node_modules/")
        .map(|i| &location[..i])
}

/// Reads the first usable lockfile under `project` and maps package names to
/// whether they resolved from the npm registry.
fn resolved_from_lockfile(project: &Path) -> Result<HashMap<String, bool>> {
    let mut errors = Vec::new();
    for lockfile in LOCKFILES {
        let path = project.join(lockfile);
        match read_lockfile(&path) {
            Ok(parsed) => return Ok(registry_resolved(parsed)),
            Err(err) => errors.push(format!("{lockfile}: {err:#}")),
        }
    }
    bail!(errors.join("; "))
}

fn read_lockfile(path: &Path) -> Result<Lockfile> {
    let content = fs::read_to_string(path).context("Failed to read lockfile")?;
    let lockfile: Lockfile = serde_json::from_str(&content).context("Failed to parse lockfile")?;
    if lockfile.packages.is_none() && lockfile.dependencies.is_none() {
        bail!("lockfile is empty");
    }
    Ok(lockfile)
}

fn from_registry(resolved: Option<&str>) -> bool {
    resolved.is_some_and(|r| r.starts_with(NPM_REGISTRY_URL))
}

fn registry_resolved(lockfile: Lockfile) -> HashMap<String, bool> {
    let mut resolved = HashMap::new();
    for (path, pkg) in lockfile.packages.unwrap_or_default() {
        if path.is_empty() {
            continue;
        }
        let name = pkg.name.unwrap_or_else(|| name_from_path(&path));
        resolved.insert(name, from_registry(pkg.resolved.as_deref()));
    }
    if let Some(dependencies) = lockfile.dependencies {
        collect_dependencies(&dependencies, &mut resolved);
    }
    resolved
}

/// Walks the legacy nested `dependencies` tree. An alias (`npm:real@1.0`)
/// is recorded under the real package name.
fn collect_dependencies(
    dependencies: &BTreeMap<String, LockfileDependency>,
    resolved: &mut HashMap<String, bool>,
) {
    for (name, dep) in dependencies {
        let name = match dep.version.as_deref().and_then(|v| v.strip_prefix("npm:")) {
            Some(alias) => match alias.rfind('@') {
                Some(i) if i > 0 => alias[..i].to_string(),
                _ => name.clone(),
            },
            None => name.clone(),
        };
        if resolved.get(&name).copied().unwrap_or(false) {
            continue;
        }
        resolved.insert(name, from_registry(dep.resolved.as_deref()));
        if let Some(nested) = &dep.dependencies {
            collect_dependencies(nested, resolved);
        }
    }
}

/// `node_modules/@scope/pkg` -> `@scope/pkg`, `node_modules/a/node_modules/b` -> `b`.
fn name_from_path(path: &str) -> String {
    let mut parts = path.rsplit('/');
    let base = parts.next().unwrap_or(path);
    match parts.next() {
        Some(scope) if scope.starts_with('@') => format!("{scope}/{base}"),
        _ => base.to_string(),
    }
}
