use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Read patient ids from a file, see [`parse_patient_ids`].
pub fn read_patient_ids(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read patient file {}", path.display()))?;
    Ok(parse_patient_ids(&contents))
}

/// First comma-separated column of each non-blank line. A leading
/// `patient_id` or `id` header line is skipped.
pub fn parse_patient_ids(contents: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for line in contents.lines() {
        let value = line.split(',').next().unwrap_or("").trim().trim_matches('"');
        if value.is_empty() {
            continue;
        }
        if ids.is_empty() && matches!(value.to_lowercase().as_str(), "patient_id" | "id") {
            continue;
        }
        ids.push(value.to_string());
    }
    ids
}
