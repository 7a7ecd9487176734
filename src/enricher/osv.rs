use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Enricher, EnricherInput};
use crate::cache::Cache;
use crate::context::ScanContext;
use crate::model::{
    Advisory, AdvisoryId, Inventory, Package, PackageRef, PackageVuln, Severity,
};
use crate::plugin::{Capabilities, Plugin};

/// Maximum number of packages to query in a single batch request.
const BATCH_SIZE: usize = 100;

const OSV_API_URL: &str = "https://api.osv.dev/v1/querybatch";

/// Matches packages against OSV.dev and records their known vulnerabilities.
pub struct OsvEnricher {
    client: reqwest::Client,
    cache: Option<Cache>,
    url: String,
}

impl OsvEnricher {
    pub const NAME: &'static str = "vulnmatch/osvdev";

    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: None,
            url: OSV_API_URL.to_string(),
        }
    }

    /// Reuses responses stored in `cache` and stores new ones there.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Points the enricher at another OSV-compatible batch endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn cache_key(ecosystem: &str, pkg: &Package) -> String {
        format!("osv_{}_{}_{}", ecosystem, pkg.name, pkg.version)
    }

    /// Performs a batch query to OSV.dev for multiple packages at once.
    /// Results are returned in query order.
    async fn batch_query(&self, queries: &[OsvBatchQueryItem]) -> Result<Vec<Vec<OsvVuln>>> {
        let batch_query = OsvBatchQuery { queries };

        let response = self
            .client
            .post(&self.url)
            .json(&batch_query)
            .send()
            .await
            .context("OSV request failed")?
            .error_for_status()
            .context("OSV request rejected")?;

        let batch_response: OsvBatchResponse =
            response.json().await.context("Invalid OSV response")?;

        Ok(batch_response
            .results
            .into_iter()
            .map(|r| r.vulns.unwrap_or_default())
            .collect())
    }
}

impl Default for OsvEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Clone)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

// Batch query types for efficient bulk lookups
#[derive(Serialize)]
struct OsvBatchQuery<'a> {
    queries: &'a [OsvBatchQueryItem],
}

#[derive(Serialize, Clone)]
struct OsvBatchQueryItem {
    package: OsvPackage,
    version: String,
}

#[derive(Deserialize)]
struct OsvBatchResponse {
    results: Vec<OsvBatchResult>,
}

#[derive(Deserialize)]
struct OsvBatchResult {
    vulns: Option<Vec<OsvVuln>>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvVuln {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    severity: Option<Vec<OsvSeverity>>,
    affected: Option<Vec<OsvAffected>>,
    references: Option<Vec<OsvReference>>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvSeverity {
    #[serde(rename = "type")]
    severity_type: Option<String>,
    score: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvAffected {
    ranges: Option<Vec<OsvRange>>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvRange {
    events: Option<Vec<OsvEvent>>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvEvent {
    fixed: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
struct OsvReference {
    url: Option<String>,
}

impl Plugin for OsvEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn requirements(&self) -> Capabilities {
        Capabilities {
            network: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Enricher for OsvEnricher {
    fn required_plugins(&self) -> Vec<String> {
        Vec::new()
    }

    async fn enrich(
        &self,
        ctx: &ScanContext,
        _input: &EnricherInput,
        inventory: &mut Inventory,
    ) -> Result<()> {
        // Packages with an OSV ecosystem, split into cached and to-query.
        let mut found: Vec<(usize, Vec<OsvVuln>)> = Vec::new();
        let mut pending: Vec<(usize, OsvBatchQueryItem)> = Vec::new();
        for (i, pkg) in inventory.packages.iter().enumerate() {
            let Some(ecosystem) = pkg.ecosystem.as_ref().and_then(|e| e.osv_ecosystem()) else {
                continue;
            };
            let key = Self::cache_key(&ecosystem, pkg);
            if let Some(vulns) = self.cache.as_ref().and_then(|c| c.get::<Vec<OsvVuln>>(&key)) {
                found.push((i, vulns));
                continue;
            }
            pending.push((
                i,
                OsvBatchQueryItem {
                    package: OsvPackage {
                        name: pkg.name.clone(),
                        ecosystem,
                    },
                    version: pkg.version.clone(),
                },
            ));
        }
        debug!(cached = found.len(), pending = pending.len(), "Querying OSV.dev");

        // Process in batches for efficiency
        let mut errors = Vec::new();
        for chunk in pending.chunks(BATCH_SIZE) {
            ctx.check()?;
            let queries: Vec<_> = chunk.iter().map(|(_, q)| q.clone()).collect();
            let results = match self.batch_query(&queries).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "Skipping OSV batch");
                    errors.push(format!("{err:#}"));
                    continue;
                }
            };

            for ((pkg_idx, query), vulns) in chunk.iter().zip(results) {
                if let Some(cache) = &self.cache {
                    let key = Self::cache_key(&query.package.ecosystem, &inventory.packages[*pkg_idx]);
                    if let Err(err) = cache.set(&key, &vulns) {
                        debug!(error = %err, "Failed to cache OSV response");
                    }
                }
                found.push((*pkg_idx, vulns));
            }
        }

        for (pkg_idx, vulns) in found {
            let package = &inventory.packages[pkg_idx];
            let new_vulns: Vec<PackageVuln> = vulns
                .iter()
                .map(|v| to_package_vuln(package, v))
                .filter(|v| {
                    !inventory.package_vulns.iter().any(|existing| {
                        existing.id() == v.id() && existing.package == v.package
                    })
                })
                .collect();
            inventory.package_vulns.extend(new_vulns);
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "{} of {} OSV batches failed: {}",
                errors.len(),
                pending.chunks(BATCH_SIZE).len(),
                errors.join("; ")
            );
        }
        Ok(())
    }
}

fn to_package_vuln(package: &Package, vuln: &OsvVuln) -> PackageVuln {
    // IDs look like GHSA-xxxx or CVE-2024-1234; the prefix names the publisher.
    let publisher = vuln.id.split('-').next().unwrap_or("OSV");
    let mut advisory = Advisory::new(
        AdvisoryId::new(publisher, &vuln.id),
        parse_severity(vuln),
        vuln.summary
            .clone()
            .unwrap_or_else(|| "Unknown vulnerability".to_string()),
    );
    advisory.description = vuln.details.clone();

    PackageVuln {
        advisory: Some(advisory),
        package: PackageRef {
            name: package.name.clone(),
            version: package.version.clone(),
            locations: package.locations.clone(),
        },
        fixed_version: extract_fixed_version(vuln),
        reference_url: vuln
            .references
            .as_ref()
            .and_then(|refs| refs.iter().find_map(|r| r.url.clone())),
        plugins: vec![OsvEnricher::NAME.to_string()],
    }
}

/// Parses CVSS score into a severity level.
///
/// Supports both numeric scores and CVSS vector strings.
pub fn parse_cvss_score(score: &str) -> Severity {
    // Try parsing as numeric CVSS score
    if let Ok(cvss) = score.parse::<f32>() {
        return match cvss {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        };
    }

    // Vector strings carry no base score; approximate from impact metrics.
    if score.contains("CVSS:") {
        if score.contains("/C:H") || score.contains("/I:H") || score.contains("/A:H") {
            return Severity::High;
        }
        if score.contains("/C:L") || score.contains("/I:L") || score.contains("/A:L") {
            return Severity::Medium;
        }
        return Severity::Low;
    }

    Severity::Unknown
}

fn parse_severity(vuln: &OsvVuln) -> Severity {
    vuln.severity
        .iter()
        .flatten()
        .filter_map(|sev| sev.score.as_deref())
        .map(parse_cvss_score)
        .find(|severity| *severity != Severity::Unknown)
        .unwrap_or(Severity::Unknown)
}

fn extract_fixed_version(vuln: &OsvVuln) -> Option<String> {
    vuln.affected.as_ref()?.iter().find_map(|affected| {
        affected.ranges.as_ref()?.iter().find_map(|range| {
            range
                .events
                .as_ref()?
                .iter()
                .find_map(|event| event.fixed.clone())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ecosystem;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_vuln() -> OsvVuln {
        serde_json::from_str(
            r#"{
                "id": "GHSA-35jh-r3h4-6jhm",
                "summary": "Command Injection in lodash",
                "details": "lodash versions prior to 4.17.21 are vulnerable to Command Injection.",
                "severity": [{"type": "CVSS_V3", "score": "7.2"}],
                "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "4.17.21"}]}]}],
                "references": [{"url": "https://github.com/advisories/GHSA-35jh-r3h4-6jhm"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_cvss_score_critical() {
        assert_eq!(parse_cvss_score("9.0"), Severity::Critical);
        assert_eq!(parse_cvss_score("9.8"), Severity::Critical);
        assert_eq!(parse_cvss_score("10.0"), Severity::Critical);
    }

    #[test]
    fn test_parse_cvss_score_high() {
        assert_eq!(parse_cvss_score("7.0"), Severity::High);
        assert_eq!(parse_cvss_score("8.5"), Severity::High);
    }

    #[test]
    fn test_parse_cvss_score_medium_and_low() {
        assert_eq!(parse_cvss_score("4.0"), Severity::Medium);
        assert_eq!(parse_cvss_score("6.9"), Severity::Medium);
        assert_eq!(parse_cvss_score("0.1"), Severity::Low);
        assert_eq!(parse_cvss_score("3.9"), Severity::Low);
    }

    #[test]
    fn test_parse_cvss_score_unknown() {
        assert_eq!(parse_cvss_score("0.0"), Severity::Unknown);
        assert_eq!(parse_cvss_score("not a number"), Severity::Unknown);
    }

    #[test]
    fn test_parse_cvss_vector() {
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Severity::High
        );
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:L/AC:H/PR:L/UI:R/S:U/C:L/I:N/A:N"),
            Severity::Medium
        );
        assert_eq!(
            parse_cvss_score("CVSS:3.1/AV:L/AC:H/PR:H/UI:R/S:U/C:N/I:N/A:N"),
            Severity::Low
        );
    }

    #[test]
    fn test_to_package_vuln() {
        let pkg = Package::new("lodash", "4.17.20")
            .with_ecosystem(Ecosystem::Npm)
            .with_location("node_modules/lodash/package.json");

        let vuln = to_package_vuln(&pkg, &sample_vuln());
        let advisory = vuln.advisory.as_ref().unwrap();
        assert_eq!(
            advisory.id,
            Some(AdvisoryId::new("GHSA", "GHSA-35jh-r3h4-6jhm"))
        );
        assert_eq!(advisory.severity, Severity::High);
        assert_eq!(vuln.fixed_version.as_deref(), Some("4.17.21"));
        assert_eq!(vuln.package.locations, vec!["node_modules/lodash/package.json"]);
        assert_eq!(vuln.plugins, vec![OsvEnricher::NAME]);
    }

    #[tokio::test]
    async fn test_enrich_from_cache_without_network() {
        let tmp = TempDir::new().unwrap();
        let cache = Cache::with_dir(tmp.path(), Duration::from_secs(3600));
        let pkg = Package::new("lodash", "4.17.20").with_ecosystem(Ecosystem::Npm);
        cache
            .set(&OsvEnricher::cache_key("npm", &pkg), &vec![sample_vuln()])
            .unwrap();

        // Unroutable endpoint: any network query would fail the enrichment.
        let enricher = OsvEnricher::new()
            .with_cache(cache)
            .with_url("http://127.0.0.1:9/v1/querybatch");
        let mut inventory = Inventory::from_packages(vec![
            pkg,
            Package::new("rust-analyzer", "0.3.1").with_ecosystem(Ecosystem::Vscode),
        ]);

        enricher
            .enrich(&ScanContext::new(), &EnricherInput::default(), &mut inventory)
            .await
            .unwrap();
        assert_eq!(inventory.package_vulns.len(), 1);

        // Running again doesn't duplicate the finding.
        enricher
            .enrich(&ScanContext::new(), &EnricherInput::default(), &mut inventory)
            .await
            .unwrap();
        assert_eq!(inventory.package_vulns.len(), 1);
    }

    #[test]
    fn test_requires_network() {
        assert!(OsvEnricher::new().requirements().network);
    }
}
