use std::path::{Path, PathBuf};

use crate::anonymize::DEFAULT_PLACEHOLDER;
use crate::image::RasterFormat;

/// Default link table file name, placed in the target root.
pub const DEFAULT_LINK_TABLE: &str = "link_anonymize.csv";

/// Suffix of the raster root next to the target root.
pub const DEFAULT_RASTER_SUFFIX: &str = "_jpg";

/// Options controlling where output goes and what extraction does.
#[derive(Debug, Clone)]
pub struct DeidOptions {
    pub target_root: PathBuf,
    pub link_table: Option<PathBuf>,
    pub convert_images: bool,
    pub raster_suffix: String,
    pub raster_format: RasterFormat,
    pub placeholder: String,
    pub scrub_index: bool,
}

impl DeidOptions {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            link_table: None,
            convert_images: true,
            raster_suffix: DEFAULT_RASTER_SUFFIX.to_string(),
            raster_format: RasterFormat::default(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            scrub_index: true,
        }
    }

    /// Explicit table path, else `<target_root>/link_anonymize.csv`.
    pub fn link_table_path(&self) -> PathBuf {
        self.link_table
            .clone()
            .unwrap_or_else(|| self.target_root.join(DEFAULT_LINK_TABLE))
    }

    pub fn raster_suffix(&self) -> Option<&str> {
        self.convert_images.then_some(self.raster_suffix.as_str())
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }
}
