use crate::core::stats::{describe, Describe};
use crate::io::product::{GeoWindow, RasterProduct};
use crate::types::{ValResult, ValidationError};
use serde::Serialize;
use std::path::Path;

/// Square region of interest centred on projected map coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roi {
    pub id: String,
    pub utmx: f64,
    pub utmy: f64,
    /// Window side length in meters
    pub extent: f64,
}

impl Roi {
    pub fn new(id: impl Into<String>, utmx: f64, utmy: f64, extent: f64) -> Self {
        let roi = Self {
            id: id.into(),
            utmx,
            utmy,
            extent,
        };
        let w = roi.window();
        log::info!(
            "ROI id {}: ulx={:.0}, uly={:.0}, lrx={:.0}, lry={:.0}",
            roi.id,
            w.ulx,
            w.uly,
            w.lrx,
            w.lry
        );
        roi
    }

    /// Geographic window of the ROI, centre +/- extent / 2
    pub fn window(&self) -> GeoWindow {
        GeoWindow {
            ulx: self.utmx - self.extent / 2.0,
            uly: self.utmy + self.extent / 2.0,
            lrx: self.utmx + self.extent / 2.0,
            lry: self.utmy - self.extent / 2.0,
        }
    }
}

/// Subset statistics of one band cut to one ROI
#[derive(Debug, Clone, Serialize)]
pub struct RoiBandStats {
    pub roi_id: String,
    pub band: String,
    pub stats: Describe,
}

/// ROIs loaded from a delimited coordinate file
#[derive(Debug, Clone)]
pub struct RoiCollection {
    pub rois: Vec<Roi>,
}

impl RoiCollection {
    /// Load `id,utmx,utmy` rows; the shared extent applies to every ROI
    pub fn from_file<P: AsRef<Path>>(path: P, extent: f64, delimiter: u8) -> ValResult<Self> {
        let path = path.as_ref();

        if extent <= 0.0 {
            return Err(ValidationError::Configuration(format!(
                "Wrong extent given: {}",
                extent
            )));
        }

        log::info!("Checking coordinates consistency...");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut rois = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() != 3 {
                return Err(ValidationError::Configuration(format!(
                    "Malformed coordinate row in {}: expected id,utmx,utmy, got {} fields",
                    path.display(),
                    record.len()
                )));
            }
            let id = record[0].to_string();
            let utmx = parse_coordinate(&record[1], path)?;
            let utmy = parse_coordinate(&record[2], path)?;
            rois.push(Roi::new(id, utmx, utmy, extent));
        }

        if rois.is_empty() {
            return Err(ValidationError::Configuration(format!(
                "No coordinates found in {}",
                path.display()
            )));
        }

        log::info!("Found {} coordinate pairs", rois.len());
        Ok(Self { rois })
    }

    /// Cut every profile band of `product` to each ROI and reduce the subsets
    ///
    /// A window falling outside the raster is logged and skipped; the product
    /// stays usable for the remaining windows.
    pub fn stats_all_bands(&self, product: &dyn RasterProduct) -> ValResult<Vec<RoiBandStats>> {
        let product_name = product
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let mut all_stats = Vec::new();
        for roi in &self.rois {
            let window = roi.window();
            for band in product.profile().band_names {
                let entry = product.find_band(band)?;
                let subset = match product.read_subset(entry, &window, None, None) {
                    Ok(subset) => subset,
                    Err(e) => {
                        log::warn!("Skipping ROI {} band {}: {}", roi.id, band, e);
                        continue;
                    }
                };
                let stats = describe(&subset);
                log::info!(
                    "{}, {}, {}, {}, {:6.4}, {:6.4}, {:6.4}, {:6.4}, {:6.4}, {:6.4}",
                    product_name,
                    roi.id,
                    band,
                    stats.count,
                    stats.min,
                    stats.max,
                    stats.mean,
                    stats.variance,
                    stats.skewness,
                    stats.kurtosis
                );
                all_stats.push(RoiBandStats {
                    roi_id: roi.id.clone(),
                    band: band.to_string(),
                    stats,
                });
            }
        }

        Ok(all_stats)
    }
}

fn parse_coordinate(field: &str, path: &Path) -> ValResult<f64> {
    field.parse::<f64>().map_err(|e| {
        ValidationError::Configuration(format!(
            "Wrong value '{}' in coordinates file {}: {}",
            field,
            path.display(),
            e
        ))
    })
}
