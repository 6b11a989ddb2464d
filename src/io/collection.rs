use crate::types::{ContainerKind, ValResult, ValidationError};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// A directory of raster products sharing one container kind
///
/// Discovery classifies every directory entry, keeps the dominant kind by
/// majority vote, and extracts one 8-digit acquisition date per retained
/// entry. Entries whose name holds zero or several date runs are dropped from
/// `timestamps` with a warning; they shrink the joinable set but are not an
/// error.
#[derive(Debug, Clone)]
pub struct Collection {
    pub path: PathBuf,
    pub kind: ContainerKind,
    /// Retained product locators of the dominant kind, sorted by name
    pub entries: Vec<PathBuf>,
    /// (locator, YYYYMMDD) pairs in entry order
    pub timestamps: Vec<(PathBuf, String)>,
}

impl Collection {
    /// Discover the products of a collection directory
    pub fn discover<P: AsRef<Path>>(path: P) -> ValResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut items: Vec<PathBuf> = fs::read_dir(&path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        // Directory listing order is filesystem-dependent; sort so that match
        // iteration order is reproducible across runs.
        items.sort();

        if items.is_empty() {
            return Err(ValidationError::Discovery(format!(
                "No items found in collection path {}",
                path.display()
            )));
        }

        let kind = Self::dominant_kind(&items, &path)?;

        let entries: Vec<PathBuf> = items
            .into_iter()
            .filter(|item| Self::classify(item) == Some(kind))
            .collect();

        log::info!(
            "Collection {} holds {} {} products",
            path.display(),
            entries.len(),
            kind
        );

        let timestamps = Self::extract_timestamps(&entries)?;

        Ok(Self {
            path,
            kind,
            entries,
            timestamps,
        })
    }

    /// Classify one directory entry by filesystem type and extension
    fn classify(item: &Path) -> Option<ContainerKind> {
        if item.is_dir() {
            return Some(ContainerKind::Directory);
        }
        if item.is_file() {
            let ext = item.extension().and_then(|e| e.to_str())?;
            return match ext.to_ascii_lowercase().as_str() {
                "zip" => Some(ContainerKind::Archive),
                "hdf" => Some(ContainerKind::ScientificDataset),
                _ => None,
            };
        }
        None
    }

    /// Majority vote over the entry kinds; ties resolve in the order
    /// Archive, ScientificDataset, Directory, unrecognized.
    fn dominant_kind(items: &[PathBuf], path: &Path) -> ValResult<ContainerKind> {
        let mut counts = [0usize; 4]; // ZIP, HDF, DIR, unrecognized
        for item in items {
            match Self::classify(item) {
                Some(ContainerKind::Archive) => counts[0] += 1,
                Some(ContainerKind::ScientificDataset) => counts[1] += 1,
                Some(ContainerKind::Directory) => counts[2] += 1,
                None => counts[3] += 1,
            }
        }
        log::debug!(
            "Found {} ZIP, {} HDF, {} DIR, {} UNKNOWN",
            counts[0],
            counts[1],
            counts[2],
            counts[3]
        );

        let mut winner = 0;
        for (i, &count) in counts.iter().enumerate() {
            if count > counts[winner] {
                winner = i;
            }
        }

        match winner {
            0 => Ok(ContainerKind::Archive),
            1 => Ok(ContainerKind::ScientificDataset),
            2 => Ok(ContainerKind::Directory),
            _ => Err(ValidationError::Discovery(format!(
                "No recognized product kind in collection path {}",
                path.display()
            ))),
        }
    }

    /// Identify a YYYYMMDD pattern in each retained entry name
    fn extract_timestamps(entries: &[PathBuf]) -> ValResult<Vec<(PathBuf, String)>> {
        let date_run = Regex::new(r"[0-9]{8}")
            .map_err(|e| ValidationError::Configuration(format!("Invalid date pattern: {}", e)))?;

        let mut timestamps = Vec::new();
        for entry in entries {
            let name = entry
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let found: Vec<&str> = date_run.find_iter(name).map(|m| m.as_str()).collect();
            if found.len() == 1 {
                timestamps.push((entry.clone(), found[0].to_string()));
            } else {
                log::warn!(
                    "Found {} date patterns for item {}, excluding it from matching",
                    found.len(),
                    name
                );
            }
        }

        log::debug!("{} of {} entries carry a timestamp", timestamps.len(), entries.len());
        Ok(timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_discover_majority_vote_ignores_strays() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "SITE_20230101_SR.zip");
        touch(dir.path(), "SITE_20230115_SR.zip");
        touch(dir.path(), "readme.txt");

        let collection = Collection::discover(dir.path()).unwrap();
        assert_eq!(collection.kind, ContainerKind::Archive);
        assert_eq!(collection.entries.len(), 2);
        assert_eq!(collection.timestamps.len(), 2);
        assert_eq!(collection.timestamps[0].1, "20230101");
    }

    #[test]
    fn test_discover_prefers_directories_when_dominant() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("PRODUCT_20230101")).unwrap();
        fs::create_dir(dir.path().join("PRODUCT_20230115")).unwrap();
        touch(dir.path(), "stray_20230120.zip");

        let collection = Collection::discover(dir.path()).unwrap();
        assert_eq!(collection.kind, ContainerKind::Directory);
        assert_eq!(collection.entries.len(), 2);
    }

    #[test]
    fn test_discover_empty_directory_fails() {
        let dir = tempdir().unwrap();
        let result = Collection::discover(dir.path());
        assert!(matches!(result, Err(ValidationError::Discovery(_))));
    }

    #[test]
    fn test_discover_unrecognized_majority_fails() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "notes_20230101.txt");
        touch(dir.path(), "notes_20230115.txt");

        let result = Collection::discover(dir.path());
        assert!(matches!(result, Err(ValidationError::Discovery(_))));
    }

    #[test]
    fn test_timestamps_drop_ambiguous_entries() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "SITE_20230101_SR.hdf");
        // two 8-digit runs, excluded from matching
        touch(dir.path(), "SITE_20230115_20230116_SR.hdf");
        // no 8-digit run, excluded as well
        touch(dir.path(), "SITE_nodate_SR.hdf");

        let collection = Collection::discover(dir.path()).unwrap();
        assert_eq!(collection.kind, ContainerKind::ScientificDataset);
        assert_eq!(collection.entries.len(), 3);
        assert_eq!(collection.timestamps.len(), 1);
        assert_eq!(collection.timestamps[0].1, "20230101");
    }

    #[test]
    fn test_entries_are_sorted_by_name() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "B_20230115.zip");
        touch(dir.path(), "A_20230101.zip");

        let collection = Collection::discover(dir.path()).unwrap();
        assert_eq!(collection.timestamps[0].1, "20230101");
        assert_eq!(collection.timestamps[1].1, "20230115");
    }
}
