use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Surface reflectance or auxiliary-layer pixel value
pub type Reflectance = f32;

/// 2D raster grid (rows x cols)
pub type Grid = Array2<Reflectance>;

/// Per-pixel validity grid, true = usable pixel
pub type Mask = Array2<bool>;

/// Container kind of a raster product on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// ZIP archive of band images
    Archive,
    /// Single scientific-dataset file (HDF) with subdatasets
    ScientificDataset,
    /// Directory of band images
    Directory,
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Archive => write!(f, "ZIP"),
            ContainerKind::ScientificDataset => write!(f, "HDF"),
            ContainerKind::Directory => write!(f, "DIR"),
        }
    }
}

/// Spatial resolution tier of a multi-resolution product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionTier {
    /// Native resolution
    R1,
    /// Half native resolution
    R2,
}

impl ResolutionTier {
    pub fn tag(&self) -> &'static str {
        match self {
            ResolutionTier::R1 => "R1",
            ResolutionTier::R2 => "R2",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One entry of the fixed validation band table
///
/// `reference_id` is resolved against the reference product catalog,
/// `candidate_pattern` against the candidate product catalog. Cloud and edge
/// layers are read from the candidate side at the band's resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandDef {
    pub reference_id: &'static str,
    pub candidate_pattern: &'static str,
    pub resolution: ResolutionTier,
}

/// Fixed band definition table for the reference/candidate comparison
pub const VALIDATION_BANDS: [BandDef; 10] = [
    BandDef { reference_id: "band02", candidate_pattern: "SRE_B2.", resolution: ResolutionTier::R1 },
    BandDef { reference_id: "band03", candidate_pattern: "SRE_B3.", resolution: ResolutionTier::R1 },
    BandDef { reference_id: "band04", candidate_pattern: "SRE_B4.", resolution: ResolutionTier::R1 },
    BandDef { reference_id: "band05", candidate_pattern: "SRE_B5.", resolution: ResolutionTier::R2 },
    BandDef { reference_id: "band06", candidate_pattern: "SRE_B6.", resolution: ResolutionTier::R2 },
    BandDef { reference_id: "band07", candidate_pattern: "SRE_B7.", resolution: ResolutionTier::R2 },
    BandDef { reference_id: "band08", candidate_pattern: "SRE_B8.", resolution: ResolutionTier::R1 },
    BandDef { reference_id: "band8a", candidate_pattern: "SRE_B8A.", resolution: ResolutionTier::R2 },
    BandDef { reference_id: "band11", candidate_pattern: "SRE_B11.", resolution: ResolutionTier::R2 },
    BandDef { reference_id: "band12", candidate_pattern: "SRE_B12.", resolution: ResolutionTier::R2 },
];

/// A (reference, candidate) product pair bound by acquisition date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// 8-digit acquisition date (YYYYMMDD), compared by exact string equality
    pub timestamp: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
}

/// Paired reference/candidate valid-pixel samples
///
/// Append-only accumulator carried through the validation fold. Both vectors
/// grow in lockstep; `push_pair` rejects unequal extensions so the pairing
/// invariant cannot drift across matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplePairs {
    pub reference: Vec<Reflectance>,
    pub candidate: Vec<Reflectance>,
}

impl SamplePairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Append one match's worth of paired samples
    pub fn push_pair(
        &mut self,
        reference: Vec<Reflectance>,
        candidate: Vec<Reflectance>,
    ) -> ValResult<()> {
        if reference.len() != candidate.len() {
            return Err(ValidationError::DimensionMismatch {
                reference: reference.len(),
                candidate: candidate.len(),
            });
        }
        self.reference.extend(reference);
        self.candidate.extend(candidate);
        Ok(())
    }

    /// Merge another accumulator shard, preserving its internal order
    pub fn merge(&mut self, other: SamplePairs) {
        self.reference.extend(other.reference);
        self.candidate.extend(other.candidate);
    }

    /// Per-sample differences, reference minus candidate
    pub fn deltas(&self) -> Vec<Reflectance> {
        self.reference
            .iter()
            .zip(self.candidate.iter())
            .map(|(r, c)| r - c)
            .collect()
    }
}

/// Error types for the validation pipeline
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Dimension mismatch: reference has {reference} valid samples, candidate has {candidate}")]
    DimensionMismatch { reference: usize, candidate: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for validation operations
pub type ValResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_table_layout() {
        assert_eq!(VALIDATION_BANDS.len(), 10);
        let half_res = VALIDATION_BANDS
            .iter()
            .filter(|b| b.resolution == ResolutionTier::R2)
            .count();
        assert_eq!(half_res, 6);
        assert_eq!(VALIDATION_BANDS[0].reference_id, "band02");
        assert_eq!(VALIDATION_BANDS[7].candidate_pattern, "SRE_B8A.");
    }

    #[test]
    fn test_sample_pairs_push_and_merge() {
        let mut pairs = SamplePairs::new();
        pairs.push_pair(vec![0.1, 0.2], vec![0.1, 0.3]).unwrap();
        assert_eq!(pairs.len(), 2);

        let mut shard = SamplePairs::new();
        shard.push_pair(vec![0.5], vec![0.4]).unwrap();
        pairs.merge(shard);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.reference, vec![0.1, 0.2, 0.5]);

        let deltas = pairs.deltas();
        assert!((deltas[1] - (-0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_sample_pairs_rejects_unpaired_extension() {
        let mut pairs = SamplePairs::new();
        let result = pairs.push_pair(vec![0.1, 0.2], vec![0.1]);
        assert!(matches!(
            result,
            Err(ValidationError::DimensionMismatch { reference: 2, candidate: 1 })
        ));
        assert!(pairs.is_empty());
    }
}
