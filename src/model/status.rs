use serde::{Deserialize, Serialize};

/// Outcome of a scan or of a single plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Unspecified,
    Succeeded,
    PartiallySucceeded { reason: String },
    Failed { reason: String },
}

impl ScanStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        ScanStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, ScanStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScanStatus::Failed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ScanStatus::PartiallySucceeded { reason } | ScanStatus::Failed { reason } => {
                Some(reason)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Unspecified => "unspecified",
            ScanStatus::Succeeded => "succeeded",
            ScanStatus::PartiallySucceeded { .. } => "partially succeeded",
            ScanStatus::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.as_str(), reason),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// Execution record of one plugin invocation in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub name: String,
    pub version: u32,
    pub status: ScanStatus,
}

impl PluginStatus {
    pub fn succeeded(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            status: ScanStatus::Succeeded,
        }
    }

    pub fn failed(name: impl Into<String>, version: u32, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            status: ScanStatus::failed(reason),
        }
    }

    /// Builds a status from a plugin's error, if any. `partial` tells whether
    /// the plugin still produced results despite the error.
    pub fn from_error(
        name: impl Into<String>,
        version: u32,
        partial: bool,
        error: Option<String>,
    ) -> Self {
        let status = match error {
            None => ScanStatus::Succeeded,
            Some(reason) if partial => ScanStatus::PartiallySucceeded { reason },
            Some(reason) => ScanStatus::Failed { reason },
        };
        Self {
            name: name.into(),
            version,
            status,
        }
    }
}
