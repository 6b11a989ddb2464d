use crate::types::{ContainerKind, Grid, Mask, ResolutionTier, ValResult, ValidationError};
use gdal::{Dataset, Metadata};
use ndarray::{Array2, Zip};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Multi-layer ancillary band reference (e.g. aerosol optical thickness)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct AncillaryLayer {
    /// Band pattern resolved through `find_band`
    pub pattern: &'static str,
    /// Divisor converting stored counts to physical units
    pub scale: f32,
    /// 0-based layer index inside the multi-layer file
    pub layer: usize,
}

/// Per-sensor band naming and scaling conventions
#[derive(Debug, Clone, serde::Serialize)]
pub struct SensorProfile {
    pub name: &'static str,
    pub band_names: &'static [&'static str],
    /// Divisor converting stored digital counts to reflectance units, > 0
    pub sre_scale: f32,
    pub cloud_name: Option<&'static str>,
    pub edge_name: Option<&'static str>,
    pub qa_name: Option<&'static str>,
    pub aot: Option<AncillaryLayer>,
    pub vap: Option<AncillaryLayer>,
}

impl SensorProfile {
    /// Candidate processor output: directory products, CLM/EDG quality layers
    pub fn maja() -> Self {
        Self {
            name: "maja",
            band_names: &[
                "SRE_B1.", "SRE_B2.", "SRE_B3.", "SRE_B4.", "SRE_B5.", "SRE_B6.", "SRE_B7.",
                "SRE_B8.", "SRE_B8A.", "SRE_B9.", "SRE_B10.", "SRE_B11.", "SRE_B12.",
            ],
            sre_scale: 10000.0,
            cloud_name: Some("CLM_R1"),
            edge_name: Some("EDG_R1"),
            qa_name: None,
            aot: None,
            vap: None,
        }
    }

    /// Reference surface-reflectance product: HDF subdatasets, QA layer
    pub fn acix_reference() -> Self {
        Self {
            name: "acix_reference",
            band_names: &[
                "band02", "band03", "band04", "band05", "band06", "band07", "band08", "band8a",
                "band11", "band12",
            ],
            sre_scale: 10000.0,
            cloud_name: None,
            edge_name: None,
            qa_name: Some("refqa"),
            aot: None,
            vap: None,
        }
    }

    /// Cloud-layer name for a resolution tier
    ///
    /// Tiered sensors carry one CLM/EDG pair per tier; a single-tier layer
    /// name keeps its fixed name whatever tier is asked for.
    pub fn cloud_layer(&self, tier: ResolutionTier) -> Option<String> {
        self.cloud_name.map(|name| retag(name, tier))
    }

    /// Edge-layer name for a resolution tier
    pub fn edge_layer(&self, tier: ResolutionTier) -> Option<String> {
        self.edge_name.map(|name| retag(name, tier))
    }

    /// Venus L2A archives: single-tier XS layers, ATB ancillary stack
    pub fn venus() -> Self {
        Self {
            name: "venus",
            band_names: &[
                "SRE_B1.", "SRE_B2.", "SRE_B3.", "SRE_B4.", "SRE_B5.", "SRE_B6.", "SRE_B7.",
                "SRE_B8.", "SRE_B9.", "SRE_B10.", "SRE_B11.", "SRE_B12.",
            ],
            sre_scale: 1000.0,
            cloud_name: Some("CLM_XS"),
            edge_name: Some("EDG_XS"),
            qa_name: None,
            aot: Some(AncillaryLayer { pattern: "ATB_XS", scale: 200.0, layer: 1 }),
            vap: Some(AncillaryLayer { pattern: "ATB_XS", scale: 20.0, layer: 0 }),
        }
    }
}

/// Swap the trailing resolution tag of a layer name, if it carries one
fn retag(name: &str, tier: ResolutionTier) -> String {
    match name.strip_suffix("R1").or_else(|| name.strip_suffix("R2")) {
        Some(prefix) => format!("{}{}", prefix, tier.tag()),
        None => name.to_string(),
    }
}

/// One locatable band inside a product container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandEntry {
    /// Identifier searched by `find_band`: file name or subdataset description
    pub label: String,
    /// URI accepted by the raster reader
    pub uri: String,
}

/// Geographic window in projected map coordinates (meters)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GeoWindow {
    pub ulx: f64,
    pub uly: f64,
    pub lrx: f64,
    pub lry: f64,
}

/// Common interface over the supported raster containers
///
/// One concrete implementation exists per `ContainerKind`; sensor-specific
/// naming and scaling live in `SensorProfile` data rather than in further
/// subtypes.
pub trait RasterProduct {
    fn path(&self) -> &Path;
    fn kind(&self) -> ContainerKind;
    fn profile(&self) -> &SensorProfile;
    /// Ordered band locator list, format-specific
    fn catalog(&self) -> &[BandEntry];

    /// Divisor converting stored counts to reflectance units
    fn scale_factor(&self) -> f32 {
        self.profile().sre_scale
    }

    /// Unique catalog entry whose label contains `pattern`
    ///
    /// Zero matches and ambiguous matches are both hard lookup failures; an
    /// arbitrary pick among several matches would silently compare the wrong
    /// layers.
    fn find_band(&self, pattern: &str) -> ValResult<&BandEntry> {
        let hits: Vec<&BandEntry> = self
            .catalog()
            .iter()
            .filter(|entry| entry.label.contains(pattern))
            .collect();

        match hits.len() {
            1 => {
                log::debug!("Found {} for band pattern {}", hits[0].label, pattern);
                Ok(hits[0])
            }
            0 => Err(ValidationError::Lookup(format!(
                "No band matching '{}' in {}",
                pattern,
                self.path().display()
            ))),
            n => {
                for hit in &hits {
                    log::error!("Band pattern '{}' also matches {}", pattern, hit.label);
                }
                Err(ValidationError::Lookup(format!(
                    "Ambiguous band pattern '{}' in {}: {} matches",
                    pattern,
                    self.path().display(),
                    n
                )))
            }
        }
    }

    /// Full-resolution read, optionally scaled and layer-selected
    fn read_band(
        &self,
        band: &BandEntry,
        scale: Option<f32>,
        layer: Option<usize>,
    ) -> ValResult<Grid> {
        log::debug!("Reading {} from {}", band.label, self.path().display());
        let dataset = Dataset::open(band.uri.as_str())?;
        let (width, height) = dataset.raster_size();
        read_grid(&dataset, (0, 0), (width, height), scale, layer)
    }

    /// Windowed read bounded by geographic corner coordinates
    ///
    /// Failures here are per-call: a window falling outside the raster leaves
    /// the product usable for other reads.
    fn read_subset(
        &self,
        band: &BandEntry,
        window: &GeoWindow,
        scale: Option<f32>,
        layer: Option<usize>,
    ) -> ValResult<Grid> {
        log::debug!(
            "Reading {} window ulx={} uly={} lrx={} lry={}",
            band.label,
            window.ulx,
            window.uly,
            window.lrx,
            window.lry
        );
        let dataset = Dataset::open(band.uri.as_str())?;
        let (offset, size) = pixel_window(&dataset, window)?;
        read_grid(&dataset, offset, size, scale, layer)
    }

    /// Multi-layer ancillary band in physical units
    fn read_ancillary(&self, layer: &AncillaryLayer) -> ValResult<Grid> {
        let entry = self.find_band(layer.pattern)?;
        self.read_band(entry, Some(layer.scale), Some(layer.layer))
    }

    /// Validity mask from cloud and edge layers, true = usable pixel
    fn get_mask(&self, cloud: &Grid, edge: &Grid, use_nodata: bool) -> ValResult<Mask> {
        build_validity_mask(cloud, edge, use_nodata)
    }

    /// Validity mask plus the percentage of usable pixels
    fn get_mask_with_stats(
        &self,
        cloud: &Grid,
        edge: &Grid,
        use_nodata: bool,
    ) -> ValResult<(Mask, f64)> {
        let mask = build_validity_mask(cloud, edge, use_nodata)?;
        let ratio = valid_ratio(&mask);
        log::debug!(
            "get_mask: NaN in cloud={}, NaN in edge={}, valid={}, ratio={:4.2}%",
            count_nan(cloud),
            count_nan(edge),
            mask.iter().filter(|&&m| m).count(),
            ratio
        );
        Ok((mask, ratio))
    }
}

/// Product stored as a ZIP archive of band images
pub struct ArchiveProduct {
    path: PathBuf,
    profile: SensorProfile,
    catalog: Vec<BandEntry>,
}

impl ArchiveProduct {
    pub fn open<P: AsRef<Path>>(path: P, profile: SensorProfile) -> ValResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ValidationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut catalog = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let name = archive.by_index(i)?.name().to_string();
            let uri = format!("/vsizip/{}/{}", path.display(), name);
            catalog.push(BandEntry { label: name, uri });
        }

        log::info!("Archive product {} lists {} members", path.display(), catalog.len());
        Ok(Self { path, profile, catalog })
    }
}

impl RasterProduct for ArchiveProduct {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Archive
    }

    fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    fn catalog(&self) -> &[BandEntry] {
        &self.catalog
    }
}

/// Product stored as a directory of band images
pub struct DirectoryProduct {
    path: PathBuf,
    profile: SensorProfile,
    catalog: Vec<BandEntry>,
}

impl DirectoryProduct {
    pub fn open<P: AsRef<Path>>(path: P, profile: SensorProfile) -> ValResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(ValidationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory not found: {}", path.display()),
            )));
        }

        let mut members: Vec<PathBuf> = std::fs::read_dir(&path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        members.sort();

        let catalog = members
            .into_iter()
            .map(|member| BandEntry {
                label: member
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string(),
                uri: member.to_string_lossy().into_owned(),
            })
            .collect();

        Ok(Self { path, profile, catalog })
    }
}

impl RasterProduct for DirectoryProduct {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Directory
    }

    fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    fn catalog(&self) -> &[BandEntry] {
        &self.catalog
    }
}

/// Product stored as a single scientific-dataset file with subdatasets
pub struct SciDatasetProduct {
    path: PathBuf,
    profile: SensorProfile,
    catalog: Vec<BandEntry>,
}

impl SciDatasetProduct {
    pub fn open<P: AsRef<Path>>(path: P, profile: SensorProfile) -> ValResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ValidationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let dataset = Dataset::open(&path)?;
        let catalog = subdataset_catalog(&dataset);
        if catalog.is_empty() {
            log::warn!("No subdatasets found in {}", path.display());
        }

        Ok(Self { path, profile, catalog })
    }
}

impl RasterProduct for SciDatasetProduct {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::ScientificDataset
    }

    fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    fn catalog(&self) -> &[BandEntry] {
        &self.catalog
    }
}

/// Open a product of a known container kind
pub fn open_product<P: AsRef<Path>>(
    path: P,
    kind: ContainerKind,
    profile: SensorProfile,
) -> ValResult<Box<dyn RasterProduct>> {
    if !(profile.sre_scale > 0.0) {
        return Err(ValidationError::Configuration(format!(
            "Scale factor of profile '{}' must be positive, got {}",
            profile.name, profile.sre_scale
        )));
    }

    match kind {
        ContainerKind::Archive => Ok(Box::new(ArchiveProduct::open(path, profile)?)),
        ContainerKind::Directory => Ok(Box::new(DirectoryProduct::open(path, profile)?)),
        ContainerKind::ScientificDataset => Ok(Box::new(SciDatasetProduct::open(path, profile)?)),
    }
}

/// Pair SUBDATASET_n_NAME / SUBDATASET_n_DESC metadata into catalog entries
fn subdataset_catalog(dataset: &Dataset) -> Vec<BandEntry> {
    let mut names: HashMap<usize, String> = HashMap::new();
    let mut descs: HashMap<usize, String> = HashMap::new();

    for item in dataset.metadata_domain("SUBDATASETS").unwrap_or_default() {
        if let Some((key, value)) = item.split_once('=') {
            if let Some(rest) = key.strip_prefix("SUBDATASET_") {
                if let Some(index) = rest.strip_suffix("_NAME") {
                    if let Ok(index) = index.parse::<usize>() {
                        names.insert(index, value.to_string());
                    }
                } else if let Some(index) = rest.strip_suffix("_DESC") {
                    if let Ok(index) = index.parse::<usize>() {
                        descs.insert(index, value.to_string());
                    }
                }
            }
        }
    }

    let mut indices: Vec<usize> = names.keys().copied().collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .filter_map(|index| {
            let uri = names.get(&index)?.clone();
            // The description carries the band identifier; fall back to the
            // URI when the driver omits it.
            let label = descs.get(&index).cloned().unwrap_or_else(|| uri.clone());
            Some(BandEntry { label, uri })
        })
        .collect()
}

/// Read a pixel window of one raster layer as an f32 grid
fn read_grid(
    dataset: &Dataset,
    offset: (isize, isize),
    size: (usize, usize),
    scale: Option<f32>,
    layer: Option<usize>,
) -> ValResult<Grid> {
    if let Some(s) = scale {
        if !(s > 0.0) {
            return Err(ValidationError::Configuration(format!(
                "Scale factor must be positive, got {}",
                s
            )));
        }
    }

    let band_count = dataset.raster_count();
    let band_index = match layer {
        Some(layer) => {
            let index = layer as isize + 1;
            if index > band_count {
                return Err(ValidationError::Lookup(format!(
                    "Layer {} out of range, dataset has {} layers",
                    layer, band_count
                )));
            }
            index
        }
        None => 1,
    };

    let band = dataset.rasterband(band_index)?;
    let buffer = band.read_as::<f32>(offset, size, size, None)?;

    let (width, height) = size;
    let mut grid = Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
        ValidationError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to reshape band data: {}", e),
        ))
    })?;

    if let Some(s) = scale {
        grid.mapv_inplace(|v| v / s);
    }

    Ok(grid)
}

/// Convert geographic corner coordinates to a pixel window
fn pixel_window(dataset: &Dataset, window: &GeoWindow) -> ValResult<((isize, isize), (usize, usize))> {
    let gt = dataset.geo_transform()?;
    if gt[1] == 0.0 || gt[5] == 0.0 {
        return Err(ValidationError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Degenerate geotransform, cannot derive a pixel window".to_string(),
        )));
    }

    let col = ((window.ulx - gt[0]) / gt[1]).floor() as isize;
    let row = ((window.uly - gt[3]) / gt[5]).floor() as isize;
    let cols = ((window.lrx - window.ulx) / gt[1]).round() as isize;
    let rows = ((window.lry - window.uly) / gt[5]).round() as isize;

    let (width, height) = dataset.raster_size();
    if col < 0
        || row < 0
        || cols <= 0
        || rows <= 0
        || col + cols > width as isize
        || row + rows > height as isize
    {
        return Err(ValidationError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!(
                "Window {:?} maps to pixels ({}, {}) + ({} x {}) outside raster {} x {}",
                window, col, row, cols, rows, width, height
            ),
        )));
    }

    Ok(((col, row), (cols as usize, rows as usize)))
}

/// Validity mask from cloud and edge auxiliary layers, true = usable pixel
///
/// With `use_nodata` unset, any non-zero cell in either layer is cleared.
/// With `use_nodata` set, NaN is the valid-indicator: a cell stays usable only
/// where BOTH layers are NaN.
pub fn build_validity_mask(cloud: &Grid, edge: &Grid, use_nodata: bool) -> ValResult<Mask> {
    if cloud.dim() != edge.dim() {
        return Err(ValidationError::DimensionMismatch {
            reference: cloud.len(),
            candidate: edge.len(),
        });
    }

    let mut mask = Array2::from_elem(cloud.raw_dim(), true);
    if use_nodata {
        Zip::from(&mut mask).and(cloud).and(edge).for_each(|m, &c, &e| {
            if !c.is_nan() || !e.is_nan() {
                *m = false;
            }
        });
    } else {
        Zip::from(&mut mask).and(cloud).and(edge).for_each(|m, &c, &e| {
            if c != 0.0 || e != 0.0 {
                *m = false;
            }
        });
    }

    Ok(mask)
}

/// Percentage of usable pixels in a validity mask
pub fn valid_ratio(mask: &Mask) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let valid = mask.iter().filter(|&&m| m).count();
    valid as f64 / mask.len() as f64 * 100.0
}

/// Number of NaN cells in a grid
pub fn count_nan(grid: &Grid) -> usize {
    grid.iter().filter(|v| v.is_nan()).count()
}

/// Number of non-NaN cells in a grid
pub fn count_not_nan(grid: &Grid) -> usize {
    grid.len() - count_nan(grid)
}
