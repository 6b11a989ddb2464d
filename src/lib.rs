//! SRVAL: A Fast, Modular Surface-Reflectance Validation Toolkit
//!
//! This library validates a candidate atmospheric-correction processor against
//! an independent reference surface-reflectance product: two collections of
//! raster products are paired by acquisition date, their spectral bands are
//! masked with the cloud and scene-edge quality layers, and the paired
//! valid-pixel differences are reduced to accuracy/precision/uncertainty
//! statistics, per site and pooled across sites.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BandDef, ContainerKind, Grid, Mask, Match, Reflectance, ResolutionTier, SamplePairs,
    ValResult, ValidationError, VALIDATION_BANDS,
};

pub use io::{open_product, Collection, RasterProduct, SensorProfile};

pub use core::{
    find_matching, read_site_list, Apu, BinnedApu, Comparison, Roi, RoiCollection,
    ValidationConfig, ValidationReport, Validator,
};
