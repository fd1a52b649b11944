//
// identity.rs
// Dicom-Deid-rs
//
// Resolves the patient behind a scan record and assigns patient and scan codes against the link table.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::codes::{PatientCode, ScanCode};
use crate::error::{DeidError, Result};
use crate::link_table::LinkTable;
use crate::models::ScanRecord;

/// Authoritative values supplied by an operator (or a policy) for ambiguous fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityChoice {
    pub patient_name: Option<String>,
    pub study_description: Option<String>,
}

/// Codes and normalized values for one record. Nothing is written anywhere yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub patient_name: String,
    pub study_description: String,
    pub patient_code: PatientCode,
    pub scan_code: ScanCode,
    pub new_patient: bool,
}

/// Resolve identity and assign codes. Fatal table conflicts are checked before
/// anything that an operator could settle.
pub fn resolve(
    record: &ScanRecord,
    table: &LinkTable,
    choice: &IdentityChoice,
    placeholder: &str,
) -> Result<Resolution> {
    if let Some(row) = table.find_folder(&record.source_folder) {
        return Err(DeidError::DuplicateFolder {
            folder: record.source_folder.clone(),
            row,
        });
    }

    let patient_name = resolve_patient_name(record, choice, placeholder)?;
    let study_description = resolve_study_description(record, choice)?;
    let (patient_code, scan_code, new_patient) = assign_codes(&patient_name, table)?;

    info!(
        folder = %record.source_folder,
        patient = %patient_code,
        scan = %scan_code,
        new_patient,
        "codes assigned"
    );
    Ok(Resolution {
        patient_name,
        study_description,
        patient_code,
        scan_code,
        new_patient,
    })
}

/// Collapse the observed names to one. The placeholder is dropped when other
/// names exist (it appears when an already processed folder comes back); on
/// its own it is no name at all.
pub fn resolve_patient_name(
    record: &ScanRecord,
    choice: &IdentityChoice,
    placeholder: &str,
) -> Result<String> {
    if let Some(name) = choice.patient_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        debug!(folder = %record.source_folder, "using supplied patient name");
        return Ok(name.to_string());
    }

    let mut names: BTreeSet<String> = record.patient_names.clone();
    if names.len() > 1 {
        names.remove(placeholder);
    }

    let mut remaining = names.iter();
    match (remaining.next(), remaining.next()) {
        (Some(name), None) if name != placeholder => Ok(name.clone()),
        (Some(_), Some(_)) => Err(DeidError::AmbiguousIdentity {
            folder: record.source_folder.clone(),
            names,
        }),
        _ => Err(DeidError::MissingField {
            folder: record.source_folder.clone(),
            field: "PatientName".into(),
        }),
    }
}

/// Studies must agree on a description; none at all is an empty description.
pub fn resolve_study_description(record: &ScanRecord, choice: &IdentityChoice) -> Result<String> {
    if let Some(description) = &choice.study_description {
        return Ok(description.trim().to_string());
    }

    let mut descriptions = record.study_descriptions.iter();
    match (descriptions.next(), descriptions.next()) {
        (None, _) => Ok(String::new()),
        (Some(description), None) => Ok(description.clone()),
        (Some(_), Some(_)) => Err(DeidError::AmbiguousStudy {
            folder: record.source_folder.clone(),
            descriptions: record.study_descriptions.clone(),
        }),
    }
}

/// Reuse the patient's code and take the next scan index, or open a new patient.
pub fn assign_codes(patient_name: &str, table: &LinkTable) -> Result<(PatientCode, ScanCode, bool)> {
    let rows: Vec<_> = table.rows_for_patient(patient_name).collect();

    if rows.is_empty() {
        let patient = PatientCode::new(table.max_patient_index().map_or(1, |max| max + 1));
        return Ok((patient, patient.first_scan(), true));
    }

    let codes: BTreeSet<PatientCode> = rows.iter().map(|r| r.patient_code).collect();
    if codes.len() > 1 {
        return Err(DeidError::CorruptLinkTable {
            patient_name: patient_name.to_string(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
        });
    }

    let patient = rows[0].patient_code;
    let last_scan = rows.iter().map(|r| r.scan_code.index()).max().unwrap_or(0);
    Ok((patient, ScanCode::new(patient, last_scan + 1), false))
}
