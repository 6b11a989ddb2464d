use crate::core::comparison::Comparison;
use crate::core::stats::{self, binned_apu, describe, masked_samples, upsample2, Apu, BinApu, BinnedApu};
use crate::io::collection::Collection;
use crate::io::product::{open_product, RasterProduct, SensorProfile};
use crate::io::samples::write_sample_pairs;
use crate::types::{
    BandDef, ContainerKind, Grid, Mask, Match, Reflectance, ResolutionTier, SamplePairs,
    ValResult, ValidationError, VALIDATION_BANDS,
};
use chrono::{DateTime, Utc};
use ndarray::Zip;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One validation site: a reference and a candidate collection directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub name: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
}

/// Parse a site list, one `<reference_path>,<candidate_path>` entry per line
///
/// The site name is the last component of the reference collection path.
pub fn read_site_list<P: AsRef<Path>>(path: P) -> ValResult<Vec<Site>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let mut sites = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 2 {
            return Err(ValidationError::Configuration(format!(
                "Malformed site entry '{}' in {}: expected <reference_path>,<candidate_path>",
                line,
                path.display()
            )));
        }
        let reference = PathBuf::from(fields[0].trim());
        let candidate = PathBuf::from(fields[1].trim());
        let name = reference
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        sites.push(Site {
            name,
            reference,
            candidate,
        });
    }

    if sites.is_empty() {
        return Err(ValidationError::Configuration(format!(
            "Site list {} is empty",
            path.display()
        )));
    }

    log::info!("Read {} sites from {}", sites.len(), path.display());
    Ok(sites)
}

/// Validation run parameters
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Index into the fixed validation band table
    pub band_index: usize,
    /// Number of reflectance bins over [0, 1)
    pub bins: usize,
    /// Treat NaN as the valid-indicator when building the cloud/edge mask
    pub use_nodata: bool,
    /// AND the reference quality-assurance layer (== 1 valid) into the mask
    pub apply_reference_qa: bool,
    /// Drop pairs whose reference reflectance is negative
    pub positive_only: bool,
    /// Lift half-resolution candidate bands onto the native grid before
    /// comparing, reading the native-tier cloud/edge layers
    pub upsample_half_resolution: bool,
    /// Log per-match ancillary-layer statistics when the profile carries them
    pub log_ancillary: bool,
    /// Write per-site samples to this directory instead of pooling in memory
    pub save_dir: Option<PathBuf>,
    pub reference_profile: SensorProfile,
    pub candidate_profile: SensorProfile,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            band_index: 0,
            bins: 100,
            use_nodata: false,
            apply_reference_qa: false,
            positive_only: false,
            upsample_half_resolution: false,
            log_ancillary: false,
            save_dir: None,
            reference_profile: SensorProfile::acix_reference(),
            candidate_profile: SensorProfile::maja(),
        }
    }
}

/// Per-site validation outcome
#[derive(Debug, Clone, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub samples: usize,
    pub rmse: f64,
    pub apu: Apu,
}

/// Pooled outcome across every site
#[derive(Debug, Clone, Serialize)]
pub struct StackedReport {
    pub samples: usize,
    pub rmse: f64,
    pub apu: Apu,
    pub bins: Vec<BinApu>,
}

/// Full validation report for one band
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub generated: DateTime<Utc>,
    pub band: BandDef,
    pub sites: Vec<SiteReport>,
    /// Absent when per-site samples were saved to disk instead of pooled
    pub stacked: Option<StackedReport>,
}

/// Site-by-site validation pipeline for one band of the validation table
pub struct Validator {
    config: ValidationConfig,
    band: BandDef,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> ValResult<Self> {
        if config.band_index >= VALIDATION_BANDS.len() {
            return Err(ValidationError::Configuration(format!(
                "Band ID out of range with value {}",
                config.band_index
            )));
        }
        if config.bins == 0 {
            return Err(ValidationError::Configuration(
                "Reflectance sampling must be positive".to_string(),
            ));
        }
        for profile in [&config.reference_profile, &config.candidate_profile] {
            if !(profile.sre_scale > 0.0) {
                return Err(ValidationError::Configuration(format!(
                    "Scale factor of profile '{}' must be positive, got {}",
                    profile.name, profile.sre_scale
                )));
            }
        }

        let band = VALIDATION_BANDS[config.band_index];
        Ok(Self { config, band })
    }

    /// Validate every site and reduce the pooled samples
    ///
    /// Collection discovery and date-join failures abort the run; a failed
    /// match is logged and skipped, preserving what earlier matches already
    /// contributed.
    pub fn run(&self, sites: &[Site]) -> ValResult<ValidationReport> {
        if sites.is_empty() {
            return Err(ValidationError::Configuration(
                "No sites to validate".to_string(),
            ));
        }

        log::info!(
            "Validating {} against {} over {} sites",
            self.band.candidate_pattern,
            self.band.reference_id,
            sites.len()
        );

        let mut stacked = SamplePairs::new();
        let mut site_reports = Vec::with_capacity(sites.len());

        for site in sites {
            let samples = self.process_site(site)?;
            site_reports.push(self.report_site(site, &samples));

            match &self.config.save_dir {
                Some(dir) => {
                    let file = dir.join(format!("{}_{}.csv", site.name, self.band.reference_id));
                    write_sample_pairs(&file, &samples)?;
                }
                None => stacked.merge(samples),
            }
        }

        let stacked_report = match self.config.save_dir {
            Some(_) => None,
            None => Some(self.report_stacked(&stacked)?),
        };

        Ok(ValidationReport {
            generated: Utc::now(),
            band: self.band,
            sites: site_reports,
            stacked: stacked_report,
        })
    }

    /// Extract the paired valid-pixel samples of every match of one site
    fn process_site(&self, site: &Site) -> ValResult<SamplePairs> {
        log::info!("Validating site {}", site.name);

        let reference = Collection::discover(&site.reference)?;
        let candidate = Collection::discover(&site.candidate)?;
        let comparison = Comparison::new(&reference, &candidate)?;

        #[cfg(feature = "parallel")]
        let shards: Vec<ValResult<SamplePairs>> = {
            use rayon::prelude::*;
            comparison
                .matches
                .par_iter()
                .map(|m| self.extract_match(m, reference.kind, candidate.kind))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let shards: Vec<ValResult<SamplePairs>> = comparison
            .matches
            .iter()
            .map(|m| self.extract_match(m, reference.kind, candidate.kind))
            .collect();

        // Merge shards in match order so the accumulator is identical to a
        // sequential fold over the match list.
        let mut samples = SamplePairs::new();
        for (m, shard) in comparison.matches.iter().zip(shards) {
            match shard {
                Ok(pairs) => {
                    log::debug!("Match {} contributes {} samples", m.timestamp, pairs.len());
                    samples.merge(pairs);
                }
                Err(e) => {
                    log::warn!("Skipping match {} for site {}: {}", m.timestamp, site.name, e);
                }
            }
        }

        log::info!("Site {} holds {} valid samples", site.name, samples.len());
        Ok(samples)
    }

    /// Read, mask and pair the band of one match
    fn extract_match(
        &self,
        m: &Match,
        reference_kind: ContainerKind,
        candidate_kind: ContainerKind,
    ) -> ValResult<SamplePairs> {
        log::info!(
            "One-by-one for {} between {} and {}",
            m.timestamp,
            m.reference.display(),
            m.candidate.display()
        );

        let p_ref = open_product(
            &m.reference,
            reference_kind,
            self.config.reference_profile.clone(),
        )?;
        let p_cand = open_product(
            &m.candidate,
            candidate_kind,
            self.config.candidate_profile.clone(),
        )?;

        let upsample =
            self.config.upsample_half_resolution && self.band.resolution == ResolutionTier::R2;
        let mask_tier = if upsample {
            ResolutionTier::R1
        } else {
            self.band.resolution
        };

        let cloud_name = self
            .config
            .candidate_profile
            .cloud_layer(mask_tier)
            .ok_or_else(|| {
                ValidationError::Configuration(format!(
                    "Profile '{}' defines no cloud layer",
                    self.config.candidate_profile.name
                ))
            })?;
        let edge_name = self
            .config
            .candidate_profile
            .edge_layer(mask_tier)
            .ok_or_else(|| {
                ValidationError::Configuration(format!(
                    "Profile '{}' defines no edge layer",
                    self.config.candidate_profile.name
                ))
            })?;

        let cloud = p_cand.read_band(p_cand.find_band(&cloud_name)?, None, None)?;
        let edge = p_cand.read_band(p_cand.find_band(&edge_name)?, None, None)?;
        let (mut mask, ratio) = p_cand.get_mask_with_stats(&cloud, &edge, self.config.use_nodata)?;
        drop(cloud);
        drop(edge);
        log::debug!("Match {} mask keeps {:4.2}% of pixels", m.timestamp, ratio);

        if self.config.apply_reference_qa {
            let qa_name = self.config.reference_profile.qa_name.ok_or_else(|| {
                ValidationError::Configuration(format!(
                    "Profile '{}' defines no quality-assurance layer",
                    self.config.reference_profile.name
                ))
            })?;
            let qa = p_ref.read_band(p_ref.find_band(qa_name)?, None, None)?;
            and_quality_layer(&mut mask, &qa)?;
        }

        if self.config.log_ancillary {
            for (name, layer) in [
                ("AOT", self.config.candidate_profile.aot),
                ("VAP", self.config.candidate_profile.vap),
            ] {
                if let Some(layer) = layer {
                    let grid = p_cand.read_ancillary(&layer)?;
                    let s = describe(&grid);
                    log::debug!(
                        "Match {} {}: mean={:6.4}, min={:6.4}, max={:6.4}",
                        m.timestamp,
                        name,
                        s.mean,
                        s.min,
                        s.max
                    );
                }
            }
        }

        let b_ref = p_ref.read_band(
            p_ref.find_band(self.band.reference_id)?,
            Some(p_ref.scale_factor()),
            None,
        )?;
        let ref_valid = masked_samples(&b_ref, &mask)?;
        drop(b_ref);

        let mut b_cand = p_cand.read_band(
            p_cand.find_band(self.band.candidate_pattern)?,
            Some(p_cand.scale_factor()),
            None,
        )?;
        if upsample {
            b_cand = upsample2(&b_cand);
        }
        let cand_valid = masked_samples(&b_cand, &mask)?;
        drop(b_cand);
        drop(mask);

        if ref_valid.len() != cand_valid.len() {
            return Err(ValidationError::DimensionMismatch {
                reference: ref_valid.len(),
                candidate: cand_valid.len(),
            });
        }

        let (ref_valid, cand_valid) = if self.config.positive_only {
            filter_positive(ref_valid, cand_valid)
        } else {
            (ref_valid, cand_valid)
        };

        let mut pairs = SamplePairs::new();
        pairs.push_pair(ref_valid, cand_valid)?;
        Ok(pairs)
    }

    fn report_site(&self, site: &Site, samples: &SamplePairs) -> SiteReport {
        let rmse = stats::rmse(&samples.reference, &samples.candidate);
        let apu = Apu::from_deltas(&samples.deltas());
        log::info!(
            "RESULT, {}, {}, {:8.6}, {:8.6}, {:8.6}, {:8.6}",
            site.name,
            self.band.reference_id,
            rmse,
            apu.accuracy,
            apu.precision,
            apu.uncertainty
        );
        SiteReport {
            site: site.name.clone(),
            samples: samples.len(),
            rmse,
            apu,
        }
    }

    fn report_stacked(&self, stacked: &SamplePairs) -> ValResult<StackedReport> {
        let rmse = stats::rmse(&stacked.reference, &stacked.candidate);
        let BinnedApu { bins, stacked: apu } = binned_apu(stacked, self.config.bins)?;

        for bin in &bins {
            log::debug!(
                "RESULT, STACKED, {}, {:8.3}, {:8.3}, {}, {:8.6}, {:8.6}, {:8.6}",
                self.band.reference_id,
                bin.lower,
                bin.upper,
                bin.apu.count,
                bin.apu.accuracy,
                bin.apu.precision,
                bin.apu.uncertainty
            );
        }

        log::info!(
            "RESULT, STACKED, {}, {:8.6}, {:8.6}, {:8.6}, {:8.6}",
            self.band.reference_id,
            rmse,
            apu.accuracy,
            apu.precision,
            apu.uncertainty
        );

        Ok(StackedReport {
            samples: stacked.len(),
            rmse,
            apu,
            bins,
        })
    }
}

/// Clear mask cells where the quality layer is not flagged valid (== 1)
fn and_quality_layer(mask: &mut Mask, qa: &Grid) -> ValResult<()> {
    if mask.dim() != qa.dim() {
        return Err(ValidationError::DimensionMismatch {
            reference: qa.len(),
            candidate: mask.len(),
        });
    }
    Zip::from(mask).and(qa).for_each(|m, &q| {
        if q != 1.0 {
            *m = false;
        }
    });
    Ok(())
}

/// Drop pairs whose reference reflectance is negative
fn filter_positive(
    reference: Vec<Reflectance>,
    candidate: Vec<Reflectance>,
) -> (Vec<Reflectance>, Vec<Reflectance>) {
    let negative = reference.iter().filter(|&&v| v < 0.0).count();
    log::info!("Negative reflectances in reference count {} samples", negative);

    let mut kept_ref = Vec::with_capacity(reference.len() - negative);
    let mut kept_cand = Vec::with_capacity(reference.len() - negative);
    for (r, c) in reference.into_iter().zip(candidate) {
        if r >= 0.0 {
            kept_ref.push(r);
            kept_cand.push(c);
        }
    }
    (kept_ref, kept_cand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_site_list_parses_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sites.txt");
        std::fs::write(
            &path,
            "/data/acix/MOBY/ref,/data/acix/MOBY/maja\n/data/acix/GOBA/ref,/data/acix/GOBA/maja\n",
        )
        .unwrap();

        let sites = read_site_list(&path).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "ref");
        assert_eq!(sites[0].candidate, PathBuf::from("/data/acix/MOBY/maja"));
    }

    #[test]
    fn test_read_site_list_rejects_malformed_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sites.txt");
        std::fs::write(&path, "/data/acix/MOBY/ref\n").unwrap();

        let result = read_site_list(&path);
        assert!(matches!(result, Err(ValidationError::Configuration(_))));
    }

    #[test]
    fn test_read_site_list_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sites.txt");
        std::fs::write(&path, "\n\n").unwrap();

        let result = read_site_list(&path);
        assert!(matches!(result, Err(ValidationError::Configuration(_))));
    }

    #[test]
    fn test_validator_rejects_band_out_of_range() {
        let config = ValidationConfig {
            band_index: VALIDATION_BANDS.len(),
            ..Default::default()
        };
        assert!(matches!(
            Validator::new(config),
            Err(ValidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_validator_rejects_zero_bins() {
        let config = ValidationConfig {
            bins: 0,
            ..Default::default()
        };
        assert!(matches!(
            Validator::new(config),
            Err(ValidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_validator_rejects_zero_scale_profile() {
        let mut config = ValidationConfig::default();
        config.candidate_profile.sre_scale = 0.0;
        assert!(matches!(
            Validator::new(config),
            Err(ValidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_run_requires_sites() {
        let validator = Validator::new(ValidationConfig::default()).unwrap();
        assert!(matches!(
            validator.run(&[]),
            Err(ValidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_filter_positive_drops_paired_samples() {
        let (r, c) = filter_positive(vec![0.1, -0.05, 0.3], vec![0.2, 0.4, 0.6]);
        assert_eq!(r, vec![0.1, 0.3]);
        assert_eq!(c, vec![0.2, 0.6]);
    }

    #[test]
    fn test_and_quality_layer_clears_unflagged_cells() {
        let mut mask = Mask::from_elem((2, 2), true);
        let mut qa = Grid::zeros((2, 2));
        qa[[0, 0]] = 1.0;
        qa[[1, 1]] = 1.0;

        and_quality_layer(&mut mask, &qa).unwrap();
        assert!(mask[[0, 0]]);
        assert!(!mask[[0, 1]]);
        assert!(!mask[[1, 0]]);
        assert!(mask[[1, 1]]);
    }

    #[test]
    fn test_and_quality_layer_requires_matching_shapes() {
        let mut mask = Mask::from_elem((2, 2), true);
        let qa = Grid::zeros((3, 3));
        assert!(matches!(
            and_quality_layer(&mut mask, &qa),
            Err(ValidationError::DimensionMismatch { .. })
        ));
    }
}
