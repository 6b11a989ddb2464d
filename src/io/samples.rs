use crate::types::{SamplePairs, ValResult, ValidationError};
use std::path::Path;

/// Persist paired valid-pixel samples as a two-column CSV
///
/// One row per sample, `reference,candidate`, matching the in-memory pairing
/// order so files written per site can be pooled later without re-alignment.
pub fn write_sample_pairs<P: AsRef<Path>>(path: P, pairs: &SamplePairs) -> ValResult<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["reference", "candidate"])?;
    for (r, c) in pairs.reference.iter().zip(pairs.candidate.iter()) {
        writer.write_record([r.to_string(), c.to_string()])?;
    }
    writer.flush()?;

    log::info!("Saved {} samples to {}", pairs.len(), path.display());
    Ok(())
}

/// Load paired samples written by `write_sample_pairs`
pub fn read_sample_pairs<P: AsRef<Path>>(path: P) -> ValResult<SamplePairs> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut pairs = SamplePairs::new();

    for record in reader.records() {
        let record = record?;
        if record.len() != 2 {
            return Err(ValidationError::Configuration(format!(
                "Malformed sample row in {}: expected 2 fields, got {}",
                path.display(),
                record.len()
            )));
        }
        let reference = parse_field(&record[0], path)?;
        let candidate = parse_field(&record[1], path)?;
        pairs.reference.push(reference);
        pairs.candidate.push(candidate);
    }

    Ok(pairs)
}

/// Pool several per-site sample files into one stacked accumulator
pub fn merge_sample_files<P: AsRef<Path>>(paths: &[P]) -> ValResult<SamplePairs> {
    let mut stacked = SamplePairs::new();
    for path in paths {
        let pairs = read_sample_pairs(path)?;
        log::info!("Adding {} samples from {}", pairs.len(), path.as_ref().display());
        stacked.merge(pairs);
    }
    log::info!("Stacked {} samples from {} files", stacked.len(), paths.len());
    Ok(stacked)
}

fn parse_field(field: &str, path: &Path) -> ValResult<f32> {
    field.trim().parse::<f32>().map_err(|e| {
        ValidationError::Configuration(format!(
            "Bad sample value '{}' in {}: {}",
            field,
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pairs(reference: &[f32], candidate: &[f32]) -> SamplePairs {
        let mut p = SamplePairs::new();
        p.push_pair(reference.to_vec(), candidate.to_vec()).unwrap();
        p
    }

    #[test]
    fn test_sample_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SITE_band02.csv");
        let original = pairs(&[0.125, 0.5, 0.0625], &[0.1, 0.45, 0.0625]);

        write_sample_pairs(&path, &original).unwrap();
        let restored = read_sample_pairs(&path).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_merge_sample_files_pools_in_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("SITE_A_band02.csv");
        let second = dir.path().join("SITE_B_band02.csv");
        write_sample_pairs(&first, &pairs(&[0.25], &[0.5])).unwrap();
        write_sample_pairs(&second, &pairs(&[0.75, 1.0], &[0.5, 1.0])).unwrap();

        let stacked = merge_sample_files(&[&first, &second]).unwrap();
        assert_eq!(stacked.len(), 3);
        assert_eq!(stacked.reference, vec![0.25, 0.75, 1.0]);
        assert_eq!(stacked.candidate, vec![0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_read_rejects_malformed_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "reference,candidate\n0.1,not-a-number\n").unwrap();

        let result = read_sample_pairs(&path);
        assert!(matches!(result, Err(ValidationError::Configuration(_))));
    }
}
