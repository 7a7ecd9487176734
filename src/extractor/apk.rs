use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use tracing::debug;

use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::model::{ApkMetadata, Ecosystem, Inventory, Package, PackageMetadata};
use crate::plugin::Plugin;

const INSTALLED_DB: &str = "lib/apk/db/installed";

/// Alpine packages from the apk installed database.
pub struct ApkExtractor;

impl ApkExtractor {
    pub const NAME: &'static str = "os/apk";
}

impl Plugin for ApkExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

#[async_trait]
impl FilesystemExtractor for ApkExtractor {
    fn file_required(&self, api: &FileApi) -> bool {
        api.path() == INSTALLED_DB
    }

    async fn extract(&self, _ctx: &ScanContext, input: &mut ScanInput) -> Result<Inventory> {
        let content = input
            .read_to_string()
            .context("Failed to read apk database")?;
        let release = fs::read_to_string(input.root.join("etc/alpine-release"))
            .ok()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let packages = parse_installed(&content)
            .into_iter()
            .map(|record| {
                let metadata = ApkMetadata {
                    origin: record.origin,
                    architecture: record.architecture,
                    license: record.license,
                    maintainer: record.maintainer,
                };
                Package::new(record.name, record.version)
                    .with_ecosystem(Ecosystem::Alpine {
                        release: release.clone(),
                    })
                    .with_metadata(PackageMetadata::Apk(metadata))
                    .with_location(&input.path)
            })
            .collect();

        Ok(Inventory::from_packages(packages))
    }
}

#[derive(Debug, Default, PartialEq)]
struct Record {
    name: String,
    version: String,
    origin: Option<String>,
    architecture: Option<String>,
    license: Option<String>,
    maintainer: Option<String>,
}

/// Parses the `key:value` blocks of an apk database. Blocks without a name
/// or version are dropped.
fn parse_installed(content: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::default();

    for line in content.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            let record = std::mem::take(&mut current);
            if record.name.is_empty() || record.version.is_empty() {
                if record != Record::default() {
                    debug!(name = %record.name, "Skipping apk record without name or version");
                }
                continue;
            }
            records.push(record);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key {
            "P" => current.name = value,
            "V" => current.version = value,
            "o" => current.origin = Some(value),
            "A" => current.architecture = Some(value),
            "L" => current.license = Some(value),
            "m" => current.maintainer = Some(value),
            _ => {}
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const DB: &str = "\
C:Q1abc=
P:musl
V:1.2.4-r2
A:x86_64
o:musl
L:MIT
m:Timo Teräs <timo.teras@iki.fi>

P:xz-libs
V:5.6.1-r1
A:x86_64
o:xz

V:1.0
";

    #[test]
    fn test_parse_installed() {
        let records = parse_installed(DB);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "musl");
        assert_eq!(records[0].version, "1.2.4-r2");
        assert_eq!(records[0].license.as_deref(), Some("MIT"));
        assert_eq!(records[1].name, "xz-libs");
        assert_eq!(records[1].origin.as_deref(), Some("xz"));
    }

    #[test]
    fn test_file_required() {
        let tmp = TempDir::new().unwrap();
        assert!(ApkExtractor.file_required(&FileApi::new(tmp.path(), INSTALLED_DB)));
        assert!(!ApkExtractor.file_required(&FileApi::new(tmp.path(), "lib/apk/db/triggers")));
    }

    #[tokio::test]
    async fn test_extract_with_release() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/alpine-release"), "3.19.1\n").unwrap();

        let mut input = ScanInput::new(
            tmp.path(),
            INSTALLED_DB,
            DB.len() as u64,
            Box::new(Cursor::new(DB.as_bytes().to_vec())),
        );
        let inventory = ApkExtractor
            .extract(&ScanContext::new(), &mut input)
            .await
            .unwrap();

        assert_eq!(inventory.packages.len(), 2);
        let xz = &inventory.packages[1];
        assert_eq!(xz.locations, vec![INSTALLED_DB]);
        assert_eq!(
            xz.ecosystem.as_ref().and_then(|e| e.osv_ecosystem()).as_deref(),
            Some("Alpine:v3.19")
        );
    }
}
