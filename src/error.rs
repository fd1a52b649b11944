//
// error.rs
// Dicom-Deid-rs
//
// Error taxonomy shared by extraction, identity resolution and the link table.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for de-identification operations.
pub type Result<T> = std::result::Result<T, DeidError>;

#[derive(Error, Debug)]
pub enum DeidError {
    /// Source folder missing or not a directory.
    #[error("Invalid input {path:?}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// More than one patient name survived placeholder removal.
    #[error("More than one patient name in folder {folder}: {}", join(.names))]
    AmbiguousIdentity {
        folder: String,
        names: BTreeSet<String>,
    },

    /// Studies in one folder disagree on their description.
    #[error("More than one study description in folder {folder}: {}", join(.descriptions))]
    AmbiguousStudy {
        folder: String,
        descriptions: BTreeSet<String>,
    },

    #[error("Folder {folder} was already processed (link table row {row})")]
    DuplicateFolder { folder: String, row: usize },

    /// One patient name mapped to several patient codes.
    #[error("Link table maps patient name {patient_name:?} to several patient codes: {}", join(.codes))]
    CorruptLinkTable {
        patient_name: String,
        codes: BTreeSet<String>,
    },

    #[error("Extraction failed for folder {folder}: {reason}")]
    ExtractionFailure { folder: String, reason: String },

    #[error("Missing field {field} in folder {folder}")]
    MissingField { folder: String, field: String },

    #[error("DICOM error: {0}")]
    Dicom(String),

    #[error("Image error: {0}")]
    Image(#[from] ::image::ImageError),

    #[error("Link table error: {0}")]
    Table(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeidError {
    /// True for errors an operator can settle by supplying a value.
    pub fn is_resolvable(&self) -> bool {
        matches!(
            self,
            DeidError::AmbiguousIdentity { .. }
                | DeidError::AmbiguousStudy { .. }
                | DeidError::MissingField { .. }
        )
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<dicom::object::ReadError> for DeidError {
    fn from(e: dicom::object::ReadError) -> Self {
        DeidError::Dicom(e.to_string())
    }
}

impl From<dicom::object::WriteError> for DeidError {
    fn from(e: dicom::object::WriteError) -> Self {
        DeidError::Dicom(e.to_string())
    }
}

impl From<csv::Error> for DeidError {
    fn from(e: csv::Error) -> Self {
        DeidError::Table(e.to_string())
    }
}

impl From<serde_json::Error> for DeidError {
    fn from(e: serde_json::Error) -> Self {
        DeidError::Table(e.to_string())
    }
}

impl From<walkdir::Error> for DeidError {
    fn from(e: walkdir::Error) -> Self {
        DeidError::Io(e.into())
    }
}
