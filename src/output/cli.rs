use crate::model::{Package, PluginStatus, ScanStatus, Severity};
use crate::scanner::ScanResult;
use anyhow::Result;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Found By")]
    plugins: String,
}

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Target")]
    target: String,
}

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Plugin")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    println!();
    println!(
        "Scan completed at: {} ({} ms)",
        result.end_time.format("%Y-%m-%d %H:%M:%S UTC"),
        (result.end_time - result.start_time).num_milliseconds()
    );
    println!();

    let inventory = &result.inventory;

    // Packages table
    if inventory.packages.is_empty() {
        println!("No packages found.");
    } else {
        println!("Found {} packages:", inventory.packages.len());
        println!();

        let rows: Vec<PackageRow> = inventory.packages.iter().map(package_row).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    // Vulnerabilities
    if !inventory.package_vulns.is_empty() {
        println!();
        println!("Found {} vulnerabilities:", inventory.package_vulns.len());
        println!();

        let mut vulns: Vec<_> = inventory.package_vulns.iter().collect();
        vulns.sort_by_key(|v| std::cmp::Reverse(v.advisory.as_ref().map(|a| a.severity)));

        let rows: Vec<VulnRow> = vulns
            .iter()
            .map(|v| {
                let (severity, title) = match &v.advisory {
                    Some(a) => (format_severity(&a.severity), truncate(&a.title, 50)),
                    None => (format_severity(&Severity::Unknown), String::new()),
                };
                VulnRow {
                    severity,
                    package: format!("{}@{}", v.package.name, v.package.version),
                    id: v.id().to_string(),
                    title,
                    fixed_in: v.fixed_version.clone().unwrap_or_else(|| "-".to_string()),
                }
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    // Generic findings
    if !inventory.generic_findings.is_empty() {
        println!();
        println!("Found {} other findings:", inventory.generic_findings.len());
        println!();

        let rows: Vec<FindingRow> = inventory
            .generic_findings
            .iter()
            .map(|f| FindingRow {
                severity: f
                    .advisory
                    .as_ref()
                    .map(|a| format_severity(&a.severity))
                    .unwrap_or_default(),
                id: f.reference().to_string(),
                title: f
                    .advisory
                    .as_ref()
                    .map(|a| truncate(&a.title, 50))
                    .unwrap_or_default(),
                target: f
                    .target
                    .as_ref()
                    .and_then(|t| t.locations.first().cloned())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    print_plugin_problems(&result.plugin_statuses);

    // Summary
    println!();
    print_summary(result);

    Ok(())
}

fn package_row(package: &Package) -> PackageRow {
    let location = match package.locations.as_slice() {
        [] => "-".to_string(),
        [only] => truncate(only, 50),
        [first, rest @ ..] => format!("{} (+{})", truncate(first, 45), rest.len()),
    };
    PackageRow {
        ecosystem: package
            .ecosystem
            .as_ref()
            .map(|e| e.as_str().to_string())
            .unwrap_or_else(|| "-".to_string()),
        name: truncate(&package.name, 40),
        version: format_version(&package.version),
        location,
        plugins: package.plugins.join(", "),
    }
}

/// Lists plugins that didn't fully succeed.
fn print_plugin_problems(statuses: &[PluginStatus]) {
    let rows: Vec<PluginRow> = statuses
        .iter()
        .filter(|s| !s.status.is_succeeded())
        .map(|s| PluginRow {
            name: s.name.clone(),
            status: s.status.as_str().to_string(),
            reason: truncate(s.status.reason().unwrap_or("-"), 60),
        })
        .collect();
    if rows.is_empty() {
        return;
    }

    println!();
    println!("{} plugins reported problems:", rows.len());
    println!();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn format_version(version: &str) -> String {
    if version.is_empty() {
        "-".to_string()
    } else {
        version.to_string()
    }
}

fn print_summary(result: &ScanResult) {
    let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
    for advisory in result
        .inventory
        .package_vulns
        .iter()
        .filter_map(|v| v.advisory.as_ref())
    {
        *by_severity.entry(advisory.severity).or_default() += 1;
    }
    let count = |s: Severity| by_severity.get(&s).copied().unwrap_or(0);

    // Count packages by ecosystem
    let mut by_ecosystem: BTreeMap<&str, usize> = BTreeMap::new();
    for pkg in &result.inventory.packages {
        let ecosystem = pkg.ecosystem.as_ref().map(|e| e.as_str()).unwrap_or("other");
        *by_ecosystem.entry(ecosystem).or_default() += 1;
    }

    println!("Summary:");
    println!("  Total packages: {}", result.inventory.packages.len());

    if by_ecosystem.len() > 1 {
        let ecosystem_summary: Vec<String> = by_ecosystem
            .iter()
            .map(|(e, c)| format!("{} {}", c, e))
            .collect();
        println!("  By ecosystem: {}", ecosystem_summary.join(", "));
    }

    if !result.inventory.package_vulns.is_empty() {
        println!(
            "  Vulnerabilities: {} critical, {} high, {} medium, {} low",
            count(Severity::Critical),
            count(Severity::High),
            count(Severity::Medium),
            count(Severity::Low)
        );
    }

    let status = match &result.status {
        ScanStatus::Failed { .. } => format!("\x1b[31m{}\x1b[0m", result.status),
        ScanStatus::PartiallySucceeded { .. } => format!("\x1b[33m{}\x1b[0m", result.status),
        _ => result.status.to_string(),
    };
    println!("  Status: {}", status);
}
