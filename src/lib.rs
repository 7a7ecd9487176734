pub mod annotator;
pub mod cache;
pub mod config;
pub mod context;
pub mod detector;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod model;
pub mod output;
pub mod packageindex;
pub mod platform;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod scanner;

pub use cache::Cache;
pub use config::Config;
pub use context::ScanContext;
pub use error::{Result, ScanError};
pub use model::{Inventory, Package, PluginStatus, ScanStatus};
pub use packageindex::PackageIndex;
pub use plugin::{Capabilities, Os, Plugin, PluginKind};
pub use registry::Registry;
pub use scanner::{ScanConfig, ScanResult, Scanner};
