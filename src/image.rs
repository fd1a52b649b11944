//
// image.rs
// Dicom-Deid-rs
//
// Renders decoded DICOM pixel data into 8-bit grayscale rasters for quick visual review.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use clap::ValueEnum;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use image::{GrayImage, ImageFormat};
use ndarray::Axis;

use crate::error::{DeidError, Result};
use crate::storage::sanitize_component;

/// Output encoding of rendered images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RasterFormat {
    #[default]
    Jpg,
    Png,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Jpg => "jpg",
            RasterFormat::Png => "png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Jpg => ImageFormat::Jpeg,
            RasterFormat::Png => ImageFormat::Png,
        }
    }
}

/// Scale stored values into 0..=255: negatives clamp to zero and the maximum maps to 255.
/// Images whose maximum is not positive come out all zero instead of dividing by zero.
pub fn rescale_to_u8(values: &[f32]) -> Vec<u8> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f32, f32::max);
    if max <= 0.0 {
        return vec![0; values.len()];
    }

    values
        .iter()
        .map(|&v| {
            let v = if v.is_finite() { v.max(0.0) } else { 0.0 };
            // `as` saturates and truncates, like an unsigned 8-bit cast of the scaled value.
            (v / max * 255.0) as u8
        })
        .collect()
}

/// First frame, first sample of the raw stored values, rescaled to 8-bit grayscale.
pub fn render_grayscale(
    obj: &FileDicomObject<InMemDicomObject<StandardDataDictionary>>,
) -> Result<GrayImage> {
    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| DeidError::Dicom(format!("Failed to decode pixel data: {}", e)))?;

    // No modality LUT: raw stored values, like a plain pixel array read.
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let pixels = decoded
        .to_ndarray_with_options::<f32>(&options)
        .map_err(|e| DeidError::Dicom(format!("Failed to convert pixel data: {}", e)))?;

    if pixels.len_of(Axis(0)) == 0 || pixels.len_of(Axis(3)) == 0 {
        return Err(DeidError::Dicom("Pixel data has no frames".into()));
    }
    let plane = pixels.index_axis(Axis(0), 0);
    let plane = plane.index_axis(Axis(2), 0);
    let (rows, columns) = plane.dim();

    let values: Vec<f32> = plane.iter().copied().collect();
    GrayImage::from_raw(columns as u32, rows as u32, rescale_to_u8(&values))
        .ok_or_else(|| DeidError::Dicom("Pixel buffer does not match image size".into()))
}

pub fn save_raster(
    obj: &FileDicomObject<InMemDicomObject<StandardDataDictionary>>,
    output: &Path,
    format: RasterFormat,
) -> Result<()> {
    let image = render_grayscale(obj)?;
    image.save_with_format(output, format.image_format())?;
    Ok(())
}

/// `<file id components>_<plane>.<ext>`; the plane part is dropped when unknown.
pub fn raster_file_name(file_id: &[String], plane: Option<&str>, format: RasterFormat) -> String {
    let stem = sanitize_component(&file_id.join("_"));
    match plane.map(sanitize_component).filter(|p| !p.is_empty()) {
        Some(plane) => format!("{}_{}.{}", stem, plane, format.extension()),
        None => format!("{}.{}", stem, format.extension()),
    }
}
