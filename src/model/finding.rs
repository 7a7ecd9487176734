use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a vulnerability, e.g. `CVE/CVE-2024-3094`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdvisoryId {
    pub publisher: String,
    pub reference: String,
}

impl AdvisoryId {
    pub fn new(publisher: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            reference: reference.into(),
        }
    }
}

impl std::fmt::Display for AdvisoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.publisher, self.reference)
    }
}

/// Vulnerability descriptor attached to a finding.
///
/// Every finding that shares an [`AdvisoryId`] within a scan must carry an
/// identical advisory; detection enforces this after all detectors ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: Option<AdvisoryId>,
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Advisory {
    pub fn new(id: AdvisoryId, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            severity,
            title: title.into(),
            description: None,
            recommendation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// The package a vulnerability applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    pub locations: Vec<String>,
}

/// A vulnerability affecting a specific package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVuln {
    pub advisory: Option<Advisory>,
    pub package: PackageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    /// Plugins that reported this vulnerability.
    pub plugins: Vec<String>,
}

impl PackageVuln {
    /// Vulnerability ID, empty when the advisory is missing.
    pub fn id(&self) -> &str {
        self.advisory
            .as_ref()
            .and_then(|a| a.id.as_ref())
            .map(|id| id.reference.as_str())
            .unwrap_or("")
    }
}

/// Where a generic finding was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

/// A security finding that is not tied to a package, e.g. a misconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericFinding {
    pub advisory: Option<Advisory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDetails>,
    pub plugins: Vec<String>,
}

impl GenericFinding {
    pub fn reference(&self) -> &str {
        self.advisory
            .as_ref()
            .and_then(|a| a.id.as_ref())
            .map(|id| id.reference.as_str())
            .unwrap_or("")
    }

    pub fn extra(&self) -> &str {
        self.target.as_ref().map(|t| t.extra.as_str()).unwrap_or("")
    }
}

/// Everything a detector reports from a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub package_vulns: Vec<PackageVuln>,
    pub generic_findings: Vec<GenericFinding>,
}

impl Finding {
    pub fn is_empty(&self) -> bool {
        self.package_vulns.is_empty() && self.generic_findings.is_empty()
    }
}
