//
// dicomdir.rs
// Dicom-Deid-rs
//
// Reads a DICOMDIR media index into its patient, study, series and image hierarchy.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt::Write;
use std::path::Path;

use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{open_file, InMemDicomObject};

use crate::dicom_access::{
    ElementAccess, DIRECTORY_RECORD_SEQUENCE, DIRECTORY_RECORD_TYPE, MODALITY, PATIENT_BIRTH_DATE,
    PATIENT_ID, PATIENT_NAME, PATIENT_SEX, REFERENCED_FILE_ID, SERIES_DESCRIPTION, SERIES_NUMBER,
    STUDY_DATE, STUDY_DESCRIPTION, STUDY_ID,
};
use crate::error::{DeidError, Result};

/// File name of the media index inside a folder.
pub const INDEX_FILE: &str = "DICOMDIR";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaIndex {
    pub patients: Vec<PatientEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientEntry {
    pub name: Option<String>,
    pub id: Option<String>,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub studies: Vec<StudyEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyEntry {
    pub id: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub series: Vec<SeriesEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesEntry {
    pub number: Option<String>,
    pub modality: Option<String>,
    pub description: Option<String>,
    pub images: Vec<ImageEntry>,
}

/// Leaf record referencing one file, relative to the folder root.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub record_type: String,
    pub file_id: Vec<String>,
}

impl MediaIndex {
    pub fn image_count(&self) -> usize {
        self.patients
            .iter()
            .flat_map(|p| &p.studies)
            .flat_map(|s| &s.series)
            .map(|s| s.images.len())
            .sum()
    }

    /// Indented tree of the hierarchy, one line per patient, study and series.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for patient in &self.patients {
            let _ = writeln!(
                out,
                "Patient {}: {}",
                na(&patient.id),
                na(&patient.name)
            );
            for study in &patient.studies {
                let _ = writeln!(
                    out,
                    "    Study {}: {}: {}",
                    na(&study.id),
                    na(&study.date),
                    na(&study.description)
                );
                for series in &study.series {
                    let count = series.images.len();
                    let plural = if count > 1 { "s" } else { "" };
                    let _ = writeln!(
                        out,
                        "        Series {}: {}: {} ({} image{})",
                        na(&series.number),
                        na(&series.modality),
                        na(&series.description),
                        count,
                        plural
                    );
                }
            }
        }
        out
    }
}

fn na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

/// Open `<folder>/DICOMDIR` and build the hierarchy.
pub fn read_index(folder: &Path) -> Result<MediaIndex> {
    let folder_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = folder.join(INDEX_FILE);
    if !path.is_file() {
        return Err(DeidError::ExtractionFailure {
            folder: folder_name,
            reason: format!("no {} index at {}", INDEX_FILE, path.display()),
        });
    }

    let obj = open_file(&path)?;
    index_from_object(&obj, &folder_name)
}

/// Walks the directory record sequence in stored order: each record attaches
/// to the most recent record of the level above it.
pub fn index_from_object(
    obj: &InMemDicomObject<StandardDataDictionary>,
    folder: &str,
) -> Result<MediaIndex> {
    let failure = |reason: String| DeidError::ExtractionFailure {
        folder: folder.to_string(),
        reason,
    };

    let records = obj
        .element(DIRECTORY_RECORD_SEQUENCE)
        .ok()
        .and_then(|e| e.items())
        .ok_or_else(|| failure("index has no directory record sequence".into()))?;

    let mut index = MediaIndex::default();

    for (pos, record) in records.iter().enumerate() {
        let record_type = record
            .element_str(DIRECTORY_RECORD_TYPE)
            .ok_or_else(|| failure(format!("directory record {} has no type", pos)))?
            .to_uppercase();

        match record_type.as_str() {
            "PATIENT" => index.patients.push(PatientEntry {
                name: record.element_str(PATIENT_NAME),
                id: record.element_str(PATIENT_ID),
                birth_date: record.element_str(PATIENT_BIRTH_DATE),
                sex: record.element_str(PATIENT_SEX),
                studies: Vec::new(),
            }),
            "STUDY" => {
                let patient = index
                    .patients
                    .last_mut()
                    .ok_or_else(|| failure(format!("study record {} precedes any patient", pos)))?;
                patient.studies.push(StudyEntry {
                    id: record.element_str(STUDY_ID),
                    date: record.element_str(STUDY_DATE),
                    description: record.element_str(STUDY_DESCRIPTION),
                    series: Vec::new(),
                });
            }
            "SERIES" => {
                let study = index
                    .patients
                    .last_mut()
                    .and_then(|p| p.studies.last_mut())
                    .ok_or_else(|| failure(format!("series record {} precedes any study", pos)))?;
                study.series.push(SeriesEntry {
                    number: record.element_str(SERIES_NUMBER),
                    modality: record.element_str(MODALITY),
                    description: record.element_str(SERIES_DESCRIPTION),
                    images: Vec::new(),
                });
            }
            _ => {
                let file_id = record.element_strings(REFERENCED_FILE_ID);
                if file_id.is_empty() {
                    // Records without a file (private, topic...) carry nothing to scrub.
                    continue;
                }
                let series = index
                    .patients
                    .last_mut()
                    .and_then(|p| p.studies.last_mut())
                    .and_then(|s| s.series.last_mut())
                    .ok_or_else(|| {
                        failure(format!("{} record {} precedes any series", record_type, pos))
                    })?;
                series.images.push(ImageEntry {
                    record_type,
                    file_id,
                });
            }
        }
    }

    Ok(index)
}
