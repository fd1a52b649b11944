//
// models.rs
// Dicom-Deid-rs
//
// Records produced by extraction and the finalized rows kept in the link table.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes::{PatientCode, ScanCode};

/// Per-series summary: how many images and which planes were seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub image_count: usize,
    pub plane: BTreeSet<String>,
}

/// Everything extraction observed in one folder. Multi-valued fields stay sets
/// so inconsistent metadata is reported instead of hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub source_folder: String,
    pub working_id: String,
    pub patient_names: BTreeSet<String>,
    pub patient_sex: BTreeSet<String>,
    pub patient_id: BTreeSet<String>,
    pub birth_date: BTreeSet<String>,
    pub study_descriptions: BTreeSet<String>,
    pub study_dates: BTreeSet<String>,
    pub series: BTreeMap<String, SeriesSummary>,
}

impl ScanRecord {
    pub fn new(source_folder: impl Into<String>, working_id: impl Into<String>) -> Self {
        Self {
            source_folder: source_folder.into(),
            working_id: working_id.into(),
            ..Default::default()
        }
    }

    /// Adds one series worth of images, merging with a same-named series.
    pub fn add_series(&mut self, description: &str, image_count: usize, planes: BTreeSet<String>) {
        let entry = self.series.entry(description.to_string()).or_default();
        entry.image_count += image_count;
        entry.plane.extend(planes);
    }

    pub fn image_count(&self) -> usize {
        self.series.values().map(|s| s.image_count).sum()
    }
}

/// A finalized link table row. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub source_folder: String,
    pub working_id: String,
    pub patient_name: String,
    pub patient_sex: BTreeSet<String>,
    pub patient_id: BTreeSet<String>,
    pub birth_date: BTreeSet<String>,
    pub study_description: String,
    pub study_dates: BTreeSet<String>,
    pub series: BTreeMap<String, SeriesSummary>,
    pub patient_code: PatientCode,
    pub scan_code: ScanCode,
    pub processed_at: Option<DateTime<Utc>>,
}
