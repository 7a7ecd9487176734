use anyhow::Result;
use async_trait::async_trait;
use semver::{Version, VersionReq};
use std::path::Path;

use super::Detector;
use crate::context::ScanContext;
use crate::extractor::ApkExtractor;
use crate::model::{
    Advisory, AdvisoryId, Finding, Package, PackageMetadata, PackageRef, PackageVuln, Severity,
};
use crate::packageindex::PackageIndex;
use crate::plugin::Plugin;

const AFFECTED: &str = ">=5.6.0, <5.6.2";

/// Flags the liblzma backdoor (CVE-2024-3094) in Alpine xz packages.
pub struct XzBackdoorDetector;

impl XzBackdoorDetector {
    pub const NAME: &'static str = "cve/cve-2024-3094";

    fn advisory() -> Advisory {
        Advisory::new(
            AdvisoryId::new("CVE", "CVE-2024-3094"),
            Severity::Critical,
            "Malicious code in xz/liblzma",
        )
        .with_description(
            "xz 5.6.0 and 5.6.1 ship a backdoor in liblzma that can allow \
             unauthorized access through sshd.",
        )
        .with_recommendation("Downgrade xz to 5.4.x or upgrade to 5.6.2 or later.")
    }
}

impl Plugin for XzBackdoorDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

fn is_xz(pkg: &Package) -> bool {
    if matches!(pkg.name.as_str(), "xz" | "xz-libs" | "xz-dev" | "liblzma") {
        return true;
    }
    matches!(&pkg.metadata, Some(PackageMetadata::Apk(m)) if m.origin.as_deref() == Some("xz"))
}

/// Parses an apk version such as `5.6.1-r2`, dropping the package release.
fn upstream_version(version: &str) -> Option<Version> {
    let upstream = version.split("-r").next().unwrap_or(version);
    Version::parse(upstream).ok()
}

#[async_trait]
impl Detector for XzBackdoorDetector {
    fn required_extractors(&self) -> Vec<String> {
        vec![ApkExtractor::NAME.to_string()]
    }

    async fn scan(
        &self,
        _ctx: &ScanContext,
        _scan_root: &Path,
        index: &PackageIndex,
    ) -> Result<Finding> {
        let affected = VersionReq::parse(AFFECTED)?;
        let package_vulns = index
            .get_all_of_plugin(ApkExtractor::NAME)
            .into_iter()
            .filter(|pkg| is_xz(pkg))
            .filter(|pkg| {
                upstream_version(&pkg.version).is_some_and(|v| affected.matches(&v))
            })
            .map(|pkg| PackageVuln {
                advisory: Some(Self::advisory()),
                package: PackageRef {
                    name: pkg.name.clone(),
                    version: pkg.version.clone(),
                    locations: pkg.locations.clone(),
                },
                fixed_version: Some("5.6.2".to_string()),
                reference_url: Some("https://nvd.nist.gov/vuln/detail/CVE-2024-3094".to_string()),
                plugins: Vec::new(),
            })
            .collect();

        Ok(Finding {
            package_vulns,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApkMetadata;

    fn apk(name: &str, version: &str) -> Package {
        let mut pkg = Package::new(name, version);
        pkg.tag_plugin(ApkExtractor::NAME);
        pkg
    }

    #[test]
    fn test_upstream_version() {
        assert_eq!(upstream_version("5.6.1-r2"), Some(Version::new(5, 6, 1)));
        assert_eq!(upstream_version("5.4.5"), Some(Version::new(5, 4, 5)));
        assert_eq!(upstream_version("1.36.1_p3"), None);
    }

    #[test]
    fn test_is_xz_by_origin() {
        let pkg = Package::new("lzma-tools", "5.6.1").with_metadata(PackageMetadata::Apk(
            ApkMetadata {
                origin: Some("xz".into()),
                ..Default::default()
            },
        ));
        assert!(is_xz(&pkg));
        assert!(!is_xz(&Package::new("musl", "1.2.4")));
    }

    #[tokio::test]
    async fn test_flags_affected_versions_only() {
        let index = PackageIndex::new(&[
            apk("xz-libs", "5.6.1-r1"),
            apk("xz", "5.4.5-r0"),
            apk("musl", "5.6.1-r0"),
        ])
        .unwrap();

        let finding = XzBackdoorDetector
            .scan(&ScanContext::new(), Path::new("/"), &index)
            .await
            .unwrap();

        assert_eq!(finding.package_vulns.len(), 1);
        assert_eq!(finding.package_vulns[0].package.name, "xz-libs");
        assert_eq!(finding.package_vulns[0].id(), "CVE-2024-3094");
    }

    #[test]
    fn test_requires_apk() {
        assert_eq!(XzBackdoorDetector.required_extractors(), vec!["os/apk"]);
    }
}
