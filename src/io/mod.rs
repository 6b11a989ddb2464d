//! Collection discovery and raster product access

pub mod collection;
pub mod product;
pub mod samples;

// Re-export main types
pub use collection::Collection;
pub use product::{
    build_validity_mask, count_nan, count_not_nan, open_product, valid_ratio, AncillaryLayer,
    ArchiveProduct, BandEntry, DirectoryProduct, GeoWindow, RasterProduct, SciDatasetProduct,
    SensorProfile,
};
pub use samples::{merge_sample_files, read_sample_pairs, write_sample_pairs};
