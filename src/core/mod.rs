//! Core matching, masking and statistical-reduction modules

pub mod comparison;
pub mod roi;
pub mod stats;
pub mod validate;

// Re-export main types
pub use comparison::{find_matching, Comparison};
pub use roi::{Roi, RoiBandStats, RoiCollection};
pub use stats::{
    accuracy, binned_apu, describe, masked_samples, mse, precision, rmse, rmse_from_delta,
    uncertainty, upsample2, Apu, BinApu, BinnedApu, Describe,
};
pub use validate::{
    read_site_list, Site, SiteReport, StackedReport, ValidationConfig, ValidationReport, Validator,
};
