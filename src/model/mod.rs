//! Core data types for packages, findings, and plugin outcomes.
//!
//! - [`Package`] - A discovered package and the plugins that produced it
//! - [`Advisory`] - A vulnerability descriptor, keyed by [`AdvisoryId`]
//! - [`PackageVuln`] / [`GenericFinding`] - Security findings
//! - [`Inventory`] - Everything accumulated over a scan
//! - [`PluginStatus`] / [`ScanStatus`] - Execution outcomes
//!
//! # Example
//!
//! ```
//! use invscan::model::{Ecosystem, Inventory, Package};
//!
//! let package = Package::new("lodash", "4.17.21").with_ecosystem(Ecosystem::Npm);
//! let inventory = Inventory::from_packages(vec![package]);
//!
//! assert_eq!(inventory.packages.len(), 1);
//! ```

mod finding;
mod inventory;
mod package;
mod status;

pub use finding::*;
pub use inventory::*;
pub use package::*;
pub use status::*;
