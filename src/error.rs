//! Error types for the scan engine.
//!
//! Plugins report their own failures as `anyhow::Error`; those are recorded
//! per plugin in [`PluginStatus`](crate::model::PluginStatus) and never
//! surface here unless the phase treats them as fatal. [`ScanError`] covers
//! everything that aborts a scan.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::AdvisoryId;
use crate::plugin::Os;

/// Result type alias using [`ScanError`].
pub type Result<T> = std::result::Result<T, ScanError>;

/// A plugin requirement the scanning environment doesn't satisfy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("plugin {plugin:?} needs OS {required} but the scanning environment is {actual}")]
    OsMismatch {
        plugin: String,
        required: Os,
        actual: Os,
    },

    #[error("plugin {plugin:?} needs direct filesystem access but the scanning environment doesn't provide it")]
    MissingDirectFs { plugin: String },

    #[error("plugin {plugin:?} needs a running system but the scanning environment doesn't provide it")]
    MissingRunningSystem { plugin: String },

    #[error("plugin {plugin:?} needs network access but the scanning environment doesn't provide it")]
    MissingNetwork { plugin: String },
}

/// Broad category of a [`ScanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration, detected before any phase runs.
    Config,
    /// A plugin failure in a phase that doesn't isolate failures.
    PluginRuntime,
    /// The scan was cancelled or ran out of time.
    Cancellation,
    /// The environment around the plugins failed (unreadable roots, budgets).
    Infrastructure,
}

/// Errors that abort a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    // === Configuration Errors ===
    #[error("no scan root specified")]
    NoScanRoot,

    #[error("can't extract specific files with several scan roots")]
    PathsWithSeveralRoots,

    #[error("invalid plugin name {name:?}: names must match ^[a-z0-9/-]+$")]
    InvalidPluginName { name: String },

    #[error("duplicate plugin {name:?} in registry")]
    DuplicatePlugin { name: String },

    #[error("required plugin {name:?} (required by {required_by:?}) is not enabled and explicit plugins mode is on")]
    RequiredPluginNotEnabled { name: String, required_by: String },

    #[error("required plugin {name:?} (required by {required_by:?}) is not present in the plugin registry")]
    UnknownPlugin { name: String, required_by: String },

    #[error("{}", join_errors(.0))]
    UnsatisfiedRequirements(Vec<CapabilityError>),

    #[error("path {} is not relative to any of the scan roots", .path.display())]
    NotRelativeToScanRoots { path: PathBuf },

    #[error("invalid skip-dir pattern: {0}")]
    InvalidPattern(String),

    // === Infrastructure Errors ===
    #[error("scan root {} is not readable: {source}", .path.display())]
    ScanRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem error at {}: {message}", .path.display())]
    Filesystem { path: PathBuf, message: String },

    #[error("maxInodes ({0}) exceeded")]
    InodeBudgetExceeded(usize),

    #[error("failed to build package index: {0}")]
    PackageIndex(String),

    #[error("container image has no chain layers")]
    NoChainLayers,

    #[error("layer attribution failed: {0}")]
    LayerAttribution(String),

    // === Plugin Runtime Errors ===
    #[error("detector {name:?} failed: {reason}")]
    Detector { name: String, reason: String },

    #[error("finding reported by {plugin:?} has no advisory")]
    MissingAdvisory { plugin: String },

    #[error("finding reported by {plugin:?} has an advisory without ID")]
    MissingAdvisoryId { plugin: String },

    #[error("multiple non-identical advisories with ID {0}")]
    AdvisoryConflict(AdvisoryId),

    #[error("enricher {name:?} needs direct filesystem access but no scan root is available")]
    NoDirectFs { name: String },

    // === Cancellation ===
    #[error("scan cancelled")]
    Cancelled,

    #[error("scan deadline exceeded")]
    DeadlineExceeded,
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::NoScanRoot
            | ScanError::PathsWithSeveralRoots
            | ScanError::InvalidPluginName { .. }
            | ScanError::DuplicatePlugin { .. }
            | ScanError::RequiredPluginNotEnabled { .. }
            | ScanError::UnknownPlugin { .. }
            | ScanError::UnsatisfiedRequirements(_)
            | ScanError::NotRelativeToScanRoots { .. }
            | ScanError::InvalidPattern(_) => ErrorKind::Config,
            ScanError::ScanRoot { .. }
            | ScanError::Filesystem { .. }
            | ScanError::InodeBudgetExceeded(_)
            | ScanError::PackageIndex(_)
            | ScanError::NoChainLayers
            | ScanError::LayerAttribution(_) => ErrorKind::Infrastructure,
            ScanError::Detector { .. }
            | ScanError::MissingAdvisory { .. }
            | ScanError::MissingAdvisoryId { .. }
            | ScanError::AdvisoryConflict(_)
            | ScanError::NoDirectFs { .. } => ErrorKind::PluginRuntime,
            ScanError::Cancelled | ScanError::DeadlineExceeded => ErrorKind::Cancellation,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::NoScanRoot => "NO_SCAN_ROOT",
            ScanError::PathsWithSeveralRoots => "PATHS_WITH_SEVERAL_ROOTS",
            ScanError::InvalidPluginName { .. } => "INVALID_PLUGIN_NAME",
            ScanError::DuplicatePlugin { .. } => "DUPLICATE_PLUGIN",
            ScanError::RequiredPluginNotEnabled { .. } => "REQUIRED_PLUGIN_NOT_ENABLED",
            ScanError::UnknownPlugin { .. } => "UNKNOWN_PLUGIN",
            ScanError::UnsatisfiedRequirements(_) => "UNSATISFIED_REQUIREMENTS",
            ScanError::NotRelativeToScanRoots { .. } => "NOT_RELATIVE_TO_SCAN_ROOTS",
            ScanError::InvalidPattern(_) => "INVALID_PATTERN",
            ScanError::ScanRoot { .. } => "SCAN_ROOT_UNREADABLE",
            ScanError::Filesystem { .. } => "FILESYSTEM_ERROR",
            ScanError::InodeBudgetExceeded(_) => "INODE_BUDGET_EXCEEDED",
            ScanError::PackageIndex(_) => "PACKAGE_INDEX",
            ScanError::NoChainLayers => "NO_CHAIN_LAYERS",
            ScanError::LayerAttribution(_) => "LAYER_ATTRIBUTION",
            ScanError::Detector { .. } => "DETECTOR_FAILED",
            ScanError::MissingAdvisory { .. } => "MISSING_ADVISORY",
            ScanError::MissingAdvisoryId { .. } => "MISSING_ADVISORY_ID",
            ScanError::AdvisoryConflict(_) => "ADVISORY_CONFLICT",
            ScanError::NoDirectFs { .. } => "NO_DIRECT_FS",
            ScanError::Cancelled => "CANCELLED",
            ScanError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

fn join_errors(errors: &[CapabilityError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
