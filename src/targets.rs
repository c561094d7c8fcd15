//! Target list input

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Column holding scholarship names in the input CSV
pub const TARGET_COLUMN: &str = "Scholarship_Name";

/// Distinct, non-empty values of `column`, in file order
pub fn load_targets(csv_path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;

    let headers = reader.headers()?.clone();
    let index = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found in {}", column, csv_path.display()))?;

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("Failed to read row {}", idx + 1))?;
        let Some(value) = row.get(index).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        if seen.insert(value.to_string()) {
            targets.push(value.to_string());
        }
    }

    Ok(targets)
}

/// Window `[start, end)` of the target list, clamped to its length
pub fn slice_targets(targets: &[String], start: usize, end: Option<usize>) -> &[String] {
    let end = end.unwrap_or(targets.len()).min(targets.len());
    let start = start.min(end);
    &targets[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_targets_distinct_in_order() {
        let file = csv_file(
            "Id,Scholarship_Name,Country\n\
             1,Chevening Scholarship,UK\n\
             2,  ,US\n\
             3,Fulbright Program,US\n\
             4,Chevening Scholarship,UK\n",
        );

        let targets = load_targets(file.path(), TARGET_COLUMN).unwrap();

        assert_eq!(targets, names(&["Chevening Scholarship", "Fulbright Program"]));
    }

    #[test]
    fn test_load_targets_missing_column() {
        let file = csv_file("Name\nChevening\n");
        let err = load_targets(file.path(), TARGET_COLUMN).unwrap_err();
        assert!(err.to_string().contains("Scholarship_Name"));
    }

    #[test]
    fn test_load_targets_missing_file() {
        assert!(load_targets(Path::new("/nonexistent/Master_raw.csv"), TARGET_COLUMN).is_err());
    }

    #[test]
    fn test_slice_targets() {
        let targets = names(&["a", "b", "c", "d"]);

        assert_eq!(slice_targets(&targets, 1, Some(3)), &targets[1..3]);
        assert_eq!(slice_targets(&targets, 2, None), &targets[2..]);
        assert_eq!(slice_targets(&targets, 0, Some(10)), &targets[..]);
        assert!(slice_targets(&targets, 5, None).is_empty());
        assert!(slice_targets(&targets, 3, Some(1)).is_empty());
    }
}
