//
// extract.rs
// Dicom-Deid-rs
//
// Walks a folder's DICOMDIR, records what it finds, scrubs person names in a working copy and renders rasters.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use dicom::object::open_file;
use tracing::{debug, info, warn};

use crate::anonymize::{records_have_defined_length, scrub_index_names, scrub_person_names};
use crate::config::DeidOptions;
use crate::dicom_access::{
    ElementAccess, DIRECTORY_RECORD_SEQUENCE, IMAGE_ORIENTATION_PATIENT, IMAGE_TYPE,
    PATIENT_BIRTH_DATE, PATIENT_ID, PATIENT_NAME, PATIENT_SEX,
};
use crate::dicomdir::{index_from_object, SeriesEntry, INDEX_FILE};
use crate::error::{DeidError, Result};
use crate::image::{raster_file_name, save_raster};
use crate::models::ScanRecord;
use crate::plane::Plane;
use crate::storage::{sanitize_component, OutputLayout, WorkingCopy};

/// Substitute for a series without a description.
pub const MISSING_SERIES_DESCRIPTION: &str = "N/A";

/// Result of extraction: the observed record and the scrubbed working copy.
#[derive(Debug)]
pub struct Extraction {
    pub record: ScanRecord,
    pub working: WorkingCopy,
}

/// Name of the source folder, which doubles as its ground-truth identifier.
pub fn folder_name(source: &Path) -> Result<String> {
    if !source.is_dir() {
        return Err(DeidError::InvalidInput {
            path: source.to_path_buf(),
            reason: "source folder does not exist".into(),
        });
    }
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DeidError::InvalidInput {
            path: source.to_path_buf(),
            reason: "source folder has no name".into(),
        })
}

/// Copy `source` under a working id, collect its metadata and scrub person names.
/// The working copy is removed again if anything fails.
pub fn extract(source: &Path, options: &DeidOptions) -> Result<Extraction> {
    let folder = folder_name(source)?;
    let layout = OutputLayout::new(options.target_root(), options.raster_suffix())?;
    let working = WorkingCopy::create(source, &layout)?;

    match collect(&folder, &working, options) {
        Ok(record) => {
            info!(
                folder = %folder,
                working_id = %working.id,
                series = record.series.len(),
                images = record.image_count(),
                "extraction finished"
            );
            Ok(Extraction { record, working })
        }
        Err(e) => {
            if let Err(cleanup) = working.discard() {
                warn!(folder = %folder, error = %cleanup, "could not remove working copy");
            }
            Err(e)
        }
    }
}

fn collect(folder: &str, working: &WorkingCopy, options: &DeidOptions) -> Result<ScanRecord> {
    let index_path = working.dicom_dir.join(INDEX_FILE);
    if !index_path.is_file() {
        return Err(DeidError::ExtractionFailure {
            folder: folder.to_string(),
            reason: format!("no {} index in folder", INDEX_FILE),
        });
    }
    let mut index_obj = open_file(&index_path)?;
    let index = index_from_object(&index_obj, folder)?;
    if index.image_count() == 0 {
        warn!(folder, "index references no images");
    }

    let mut record = ScanRecord::new(folder, &working.id);

    for patient in &index.patients {
        insert_value(&mut record.patient_names, patient.name.clone());
        insert_value(&mut record.patient_id, patient.id.clone());
        insert_value(&mut record.birth_date, patient.birth_date.clone());
        insert_value(&mut record.patient_sex, patient.sex.clone());

        for study in &patient.studies {
            debug!(folder, study = ?study.id, date = ?study.date, description = ?study.description, "study");
            insert_value(&mut record.study_descriptions, study.description.clone());
            insert_value(&mut record.study_dates, study.date.clone());

            for series in &study.series {
                let description = series_description(folder, series).unwrap_or_else(|e| {
                    warn!(error = %e, "substituting {}", MISSING_SERIES_DESCRIPTION);
                    MISSING_SERIES_DESCRIPTION.to_string()
                });
                let planes = process_series(folder, working, series, &description, &mut record, options)?;
                record.add_series(&description, series.images.len(), planes);
            }
        }
    }

    if options.scrub_index {
        // Rewriting defined-length records would move every record after the
        // first changed one and break the stored offsets.
        if records_have_defined_length(&index_obj, DIRECTORY_RECORD_SEQUENCE) {
            warn!(folder, "index records have explicit lengths; index names left in place");
        } else {
            let replaced = scrub_index_names(&mut index_obj, &options.placeholder);
            index_obj.write_to_file(&index_path)?;
            debug!(folder, replaced, "index person names scrubbed");
        }
    }

    Ok(record)
}

/// Reads, scrubs and optionally renders every image of one series; returns the planes seen.
fn process_series(
    folder: &str,
    working: &WorkingCopy,
    series: &SeriesEntry,
    description: &str,
    record: &mut ScanRecord,
    options: &DeidOptions,
) -> Result<BTreeSet<String>> {
    debug!(folder, series = description, images = series.images.len(), "reading images");

    let raster_dir = match &working.raster_dir {
        Some(dir) => {
            let dir = dir.join(sanitize_component(description));
            fs::create_dir_all(&dir)?;
            Some(dir)
        }
        None => None,
    };

    let mut planes = BTreeSet::new();
    for image in &series.images {
        let path = resolve_image_path(&working.dicom_dir, &image.file_id, folder)?;
        let mut obj = open_file(&path).map_err(|e| DeidError::ExtractionFailure {
            folder: folder.to_string(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

        insert_value(&mut record.patient_names, obj.element_str(PATIENT_NAME));
        insert_value(&mut record.patient_id, obj.element_str(PATIENT_ID));
        insert_value(&mut record.birth_date, obj.element_str(PATIENT_BIRTH_DATE));
        insert_value(&mut record.patient_sex, obj.element_str(PATIENT_SEX));

        let plane = image_plane(&obj);
        if let Some(plane) = &plane {
            planes.insert(plane.clone());
        }

        scrub_person_names(&mut obj, &options.placeholder);
        obj.write_to_file(&path)?;

        if let Some(dir) = &raster_dir {
            let output = dir.join(raster_file_name(
                &image.file_id,
                plane.as_deref(),
                options.raster_format,
            ));
            // Rendering is best effort; the scrubbed DICOM is what matters.
            if let Err(e) = save_raster(&obj, &output, options.raster_format) {
                warn!(folder, file = %path.display(), error = %e, "raster conversion skipped");
            }
        }
    }

    Ok(planes)
}

fn insert_value(set: &mut BTreeSet<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        set.insert(value);
    }
}

pub fn series_description(folder: &str, series: &SeriesEntry) -> Result<String> {
    series
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| DeidError::MissingField {
            folder: folder.to_string(),
            field: "SeriesDescription".into(),
        })
}

/// Anatomical plane from the orientation, else the image type text.
pub fn image_plane<T: ElementAccess>(obj: &T) -> Option<String> {
    match obj.element_f64s(IMAGE_ORIENTATION_PATIENT) {
        Some(iop) => Plane::from_orientation(&iop).map(|p| p.to_string()),
        None => {
            let image_type = obj.element_strings(IMAGE_TYPE);
            (!image_type.is_empty()).then(|| image_type.join("\\"))
        }
    }
}

/// Resolve a referenced file id under `root`. A missing file gets exactly one
/// retry with the `<name>(1)` convention left behind by some copy tools.
pub fn resolve_image_path(root: &Path, file_id: &[String], folder: &str) -> Result<PathBuf> {
    let failure = |reason: String| DeidError::ExtractionFailure {
        folder: folder.to_string(),
        reason,
    };

    let mut primary = root.to_path_buf();
    for component in file_id {
        let mut parts = Path::new(component).components();
        match (parts.next(), parts.next()) {
            (Some(Component::Normal(part)), None) => primary.push(part),
            _ => return Err(failure(format!("unsafe file reference {:?}", file_id))),
        }
    }
    if primary.is_file() {
        return Ok(primary);
    }

    let mut alternate = primary.as_os_str().to_owned();
    alternate.push("(1)");
    let alternate = PathBuf::from(alternate);
    if alternate.is_file() {
        debug!(folder, file = %alternate.display(), "using alternate file name");
        return Ok(alternate);
    }

    Err(failure(format!(
        "referenced image {} is missing (also tried {})",
        primary.display(),
        alternate.display()
    )))
}
