use std::collections::HashMap;

use crate::error::{Result, ScanError};
use crate::model::{Advisory, AdvisoryId, Inventory};

/// Checks that every finding carries an advisory with an ID, and that all
/// findings sharing an ID carry identical advisories.
pub fn validate_advisories(findings: &Inventory) -> Result<()> {
    let entries = findings
        .package_vulns
        .iter()
        .map(|v| (v.advisory.as_ref(), &v.plugins))
        .chain(
            findings
                .generic_findings
                .iter()
                .map(|f| (f.advisory.as_ref(), &f.plugins)),
        );

    let mut seen: HashMap<&AdvisoryId, &Advisory> = HashMap::new();
    for (advisory, plugins) in entries {
        let Some(advisory) = advisory else {
            return Err(ScanError::MissingAdvisory {
                plugin: plugins.join(", "),
            });
        };
        let Some(id) = advisory.id.as_ref() else {
            return Err(ScanError::MissingAdvisoryId {
                plugin: plugins.join(", "),
            });
        };
        match seen.get(id) {
            Some(first) if *first != advisory => {
                return Err(ScanError::AdvisoryConflict(id.clone()));
            }
            Some(_) => {}
            None => {
                seen.insert(id, advisory);
            }
        }
    }
    Ok(())
}
