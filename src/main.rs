use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use invscan::{
    cache::Cache,
    config::Config,
    model::Severity,
    output::{format_result_to_string, print_result, OutputFormat},
    platform::{host_capabilities, image_capabilities},
    plugin::{validate_requirements, Capabilities, Plugin},
    scanner::{DirImage, PresenceAttributor, ScanResult, Scanner},
    Registry, ScanContext,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "invscan")]
#[command(
    author,
    version,
    about = "Inventory installed software and scan it for vulnerabilities"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan directories of the running system
    Scan {
        /// Directories to scan
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Only extract these files or directories (needs a single root)
        #[arg(long = "path")]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        options: ScanOptions,
    },

    /// Scan a container image unpacked into one directory per chain layer
    ScanImage {
        /// Chain layer directories, base layer first
        #[arg(required = true)]
        layers: Vec<PathBuf>,

        /// Number of leading layers that belong to the base image
        #[arg(long, default_value_t = 0)]
        base_layers: usize,

        #[command(flatten)]
        options: ScanOptions,
    },

    /// List available plugins
    ListPlugins {
        /// Treat the host as offline
        #[arg(long)]
        offline: bool,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the cache
    ClearCache,
}

#[derive(Args)]
struct ScanOptions {
    /// Plugins to enable (repeatable). Defaults to every plugin the
    /// environment supports.
    #[arg(short, long = "plugin")]
    plugins: Vec<String>,

    /// Fail instead of enabling plugins other plugins require
    #[arg(long)]
    explicit_plugins: bool,

    /// Directory to skip (repeatable)
    #[arg(long = "skip-dir")]
    skip_dirs: Vec<PathBuf>,

    /// Skip directories matching this regex
    #[arg(long)]
    skip_dir_regex: Option<String>,

    /// Skip directories matching this glob
    #[arg(long)]
    skip_dir_glob: Option<String>,

    /// Skip files larger than this many bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Abort after visiting this many files and directories
    #[arg(long)]
    max_inodes: Option<usize>,

    /// Honour .gitignore files
    #[arg(long)]
    gitignore: bool,

    /// Extract symlinked files
    #[arg(long)]
    read_symlinks: bool,

    /// Report absolute package locations
    #[arg(long)]
    absolute_paths: bool,

    /// Plugins running at once within a phase
    #[arg(long)]
    concurrency: Option<usize>,

    /// Abort the scan when a detector fails
    #[arg(long)]
    fail_on_detector_error: bool,

    /// Disable plugins that need network access
    #[arg(long)]
    offline: bool,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output format (table, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<String>,

    /// Clear cache before scanning
    #[arg(long)]
    clear_cache: bool,

    /// Exit with error if vulnerabilities at or above this severity are found
    #[arg(long, value_enum)]
    fail_on: Option<FailLevel>,
}

impl ScanOptions {
    /// Command-line options take precedence over the config file.
    fn apply(&self, config: &mut Config) {
        if !self.plugins.is_empty() {
            config.plugins = self.plugins.clone();
        }
        config.explicit_plugins |= self.explicit_plugins;
        config.dirs_to_skip.extend(self.skip_dirs.iter().cloned());
        if self.skip_dir_regex.is_some() {
            config.skip_dir_regex = self.skip_dir_regex.clone();
        }
        if self.skip_dir_glob.is_some() {
            config.skip_dir_glob = self.skip_dir_glob.clone();
        }
        config.max_file_size = self.max_file_size.or(config.max_file_size);
        config.max_inodes = self.max_inodes.or(config.max_inodes);
        config.use_gitignore |= self.gitignore;
        config.read_symlinks |= self.read_symlinks;
        config.store_absolute_path |= self.absolute_paths;
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        config.offline |= self.offline;
        if let Some(format) = &self.format {
            config.default_format = format.clone();
        }
    }

    fn context(&self) -> ScanContext {
        let ctx = match self.timeout {
            Some(secs) => ScanContext::with_timeout(Duration::from_secs(secs)),
            None => ScanContext::new(),
        };
        let cancel = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        ctx
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn severity(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let config = Config::load().unwrap_or_default();

    match cli.command {
        Commands::Scan {
            roots,
            paths,
            options,
        } => {
            let mut config = config;
            options.apply(&mut config);
            let registry = registry(&config);
            let mut scan_config =
                config.to_scan_config(&registry, host_capabilities(config.offline))?;
            for root in roots {
                scan_config = scan_config.with_root(root);
            }
            scan_config.paths_to_extract = paths;
            scan_config.fail_on_detector_error = options.fail_on_detector_error;

            let ctx = options.context();
            let format = prepare(&options, &config)?;
            let spinner = spinner(format, "Scanning...");
            let result = Scanner::new(registry).scan(&ctx, scan_config).await;
            finish(result, spinner, &options, &config, format)
        }
        Commands::ScanImage {
            layers,
            base_layers,
            options,
        } => {
            let mut config = config;
            options.apply(&mut config);
            let registry = registry(&config);
            let mut scan_config =
                config.to_scan_config(&registry, image_capabilities(config.offline))?;
            scan_config.fail_on_detector_error = options.fail_on_detector_error;

            let image = DirImage::from_dirs(&layers)?;
            let attributor = PresenceAttributor::new().with_base_layers(base_layers);

            let ctx = options.context();
            let format = prepare(&options, &config)?;
            let spinner = spinner(format, "Scanning image...");
            let result = Scanner::new(registry)
                .scan_container(&ctx, &image, &attributor, scan_config)
                .await;
            finish(result, spinner, &options, &config, format)
        }
        Commands::ListPlugins { offline } => {
            list_plugins(&registry(&config), host_capabilities(offline || config.offline));
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let removed = Cache::new().clear()?;
            println!("Cache cleared ({} entries).", removed);
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn registry(config: &Config) -> Registry {
    Registry::builtins(Some(Cache::with_ttl_hours(config.cache_ttl_hours)))
}

/// Parses the output format and clears the cache if asked to.
fn prepare(options: &ScanOptions, config: &Config) -> Result<OutputFormat> {
    if options.clear_cache {
        Cache::with_ttl_hours(config.cache_ttl_hours).clear()?;
    }
    OutputFormat::from_str(&config.default_format).map_err(|e| anyhow::anyhow!(e))
}

fn spinner(format: OutputFormat, message: &'static str) -> Option<ProgressBar> {
    if format != OutputFormat::Table {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    Some(pb)
}

fn finish(
    mut result: ScanResult,
    spinner: Option<ProgressBar>,
    options: &ScanOptions,
    config: &Config,
    format: OutputFormat,
) -> Result<u8> {
    if let Some(pb) = spinner {
        pb.finish_with_message(format!(
            "Found {} packages",
            result.inventory.packages.len()
        ));
    }
    config.ignore.apply(&mut result.inventory);

    // Handle output
    if let Some(path) = &options.output {
        std::fs::write(path, format_result_to_string(&result, format)?)?;
        if format == OutputFormat::Table {
            println!("Results written to: {}", path);
        }
    } else {
        print_result(&result, format)?;
    }

    Ok(determine_exit_code(&result, options.fail_on))
}

/// Determine the exit code from the scan status and the --fail-on setting
fn determine_exit_code(result: &ScanResult, fail_on: Option<FailLevel>) -> u8 {
    if result.status.is_failed() {
        return exit_codes::ERROR;
    }
    let Some(fail_on) = fail_on else {
        return exit_codes::SUCCESS;
    };

    match result.max_severity() {
        Some(max) if max >= fail_on.severity() => match max {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            _ => exit_codes::LOW_VULN,
        },
        _ => exit_codes::SUCCESS,
    }
}

fn list_plugins(registry: &Registry, env: Capabilities) {
    println!("Available plugins:");
    println!();

    for plugin in registry.all() {
        let supported = match validate_requirements(&plugin, &env) {
            Ok(()) => "yes".to_string(),
            Err(err) => format!("no ({})", err),
        };
        println!(
            "  {:<26} {:<22} v{}",
            plugin.name(),
            plugin.kind_name(),
            plugin.version()
        );
        let deps = plugin.dependencies();
        if !deps.is_empty() {
            println!("  {:<26} Requires: {}", "", deps.join(", "));
        }
        println!("  {:<26} Supported: {}", "", supported);
        println!();
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'invscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
