use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::VizError;

#[derive(Debug, Deserialize)]
struct PriorRow {
    key: Option<String>,
    #[serde(default)]
    old_prior: Option<String>,
}

/// First non-empty `old_prior` of every key, sorted by key.
pub fn first_old_priors(path: &Path, delimiter: u8) -> Result<BTreeMap<String, String>, VizError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|err| VizError::load(path, err))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| VizError::load(path, err))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let missing: Vec<&'static str> = ["key", "old_prior"]
        .into_iter()
        .filter(|name| !columns.iter().any(|c| c == name))
        .collect();
    if !missing.is_empty() {
        return Err(VizError::Schema {
            required: vec!["key", "old_prior"],
            missing,
        });
    }
    reader.set_headers(csv::StringRecord::from(columns));

    let mut firsts: BTreeMap<String, Option<String>> = BTreeMap::new();
    for row in reader.deserialize::<PriorRow>() {
        let row = row.map_err(|err| VizError::load(path, err))?;
        let Some(key) = row.key else { continue };
        let slot = firsts.entry(key).or_insert(None);
        if slot.is_none() {
            *slot = row.old_prior.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        }
    }

    Ok(firsts
        .into_iter()
        .map(|(key, prior)| (key, prior.unwrap_or_default()))
        .collect())
}

pub fn write_first_priors(priors: &BTreeMap<String, String>, output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["key", "old_prior"])?;
    for (key, prior) in priors {
        writer.write_record([key, prior])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn keeps_first_prior_per_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key\tvalue\told_prior\nb\tx\t0.3\na\tx\t\na\ty\t0.6\nb\ty\t0.9\n")
            .unwrap();
        let priors = first_old_priors(file.path(), b'\t').unwrap();
        let rows: Vec<(&str, &str)> = priors.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(rows, vec![("a", "0.6"), ("b", "0.3")]);
    }

    #[test]
    fn missing_column_is_schema_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"key\tvalue\nk\tv\n").unwrap();
        let err = first_old_priors(file.path(), b'\t').unwrap_err();
        assert!(matches!(err, VizError::Schema { .. }));
    }

    #[test]
    fn writes_csv_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("first.csv");
        let priors = BTreeMap::from([("k".to_string(), "0.5".to_string())]);
        write_first_priors(&priors, &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "key,old_prior\nk,0.5\n");
    }
}
