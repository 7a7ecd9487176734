//! Host environment: per-user directories and the capabilities a scan of
//! this machine can offer.

use std::path::PathBuf;

use crate::plugin::{Capabilities, Os};

/// Returns the cache directory for invscan.
///
/// Platform-specific locations:
/// - Linux: `~/.cache/invscan/`
/// - macOS: `~/Library/Caches/invscan/`
/// - Windows: `%LOCALAPPDATA%\invscan\`
///
/// Falls back to `/tmp/invscan/` if no cache directory can be determined.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("invscan")
}

/// Returns the configuration directory for invscan, if the platform has one.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("invscan"))
}

/// Capabilities of a scan running directly on this machine.
pub fn host_capabilities(offline: bool) -> Capabilities {
    Capabilities {
        os: Os::current(),
        direct_fs: true,
        running_system: true,
        network: !offline,
    }
}

/// Capabilities of a scan over an unpacked image: files are on disk, but
/// the scanned system isn't running.
pub fn image_capabilities(offline: bool) -> Capabilities {
    Capabilities {
        os: Os::Linux,
        direct_fs: true,
        running_system: false,
        network: !offline,
    }
}
