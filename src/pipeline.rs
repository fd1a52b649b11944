//
// pipeline.rs
// Dicom-Deid-rs
//
// Runs one folder through extraction, identity resolution and the rename/append step.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::DeidOptions;
use crate::error::{DeidError, Result};
use crate::extract::{extract, folder_name, Extraction};
use crate::identity::{resolve, IdentityChoice, Resolution};
use crate::link_table::LinkTable;
use crate::models::LinkRecord;
use crate::storage::FinalPaths;

/// What a successfully processed folder produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: LinkRecord,
    pub paths: FinalPaths,
}

/// Validate the source and extract it. Folders already in the table are
/// rejected here, before anything is copied.
pub fn prepare(source: &Path, options: &DeidOptions, table: &LinkTable) -> Result<Extraction> {
    let folder = folder_name(source)?;
    if let Some(row) = table.find_folder(&folder) {
        return Err(DeidError::DuplicateFolder { folder, row });
    }
    extract(source, options)
}

/// Append the record to a copy of `table`, then rename the working copy to its
/// scan code. The updated table is only returned once the rename succeeded;
/// `table` itself is never modified.
pub fn commit(
    extraction: Extraction,
    resolution: Resolution,
    table: &LinkTable,
) -> Result<(Outcome, LinkTable)> {
    let Extraction { record, working } = extraction;

    let link = LinkRecord {
        source_folder: record.source_folder,
        working_id: record.working_id,
        patient_name: resolution.patient_name,
        patient_sex: record.patient_sex,
        patient_id: record.patient_id,
        birth_date: record.birth_date,
        study_description: resolution.study_description,
        study_dates: record.study_dates,
        series: record.series,
        patient_code: resolution.patient_code,
        scan_code: resolution.scan_code,
        processed_at: Some(Utc::now()),
    };
    let mut updated = table.clone();
    if let Err(e) = updated.append(link.clone()) {
        if let Err(cleanup) = working.discard() {
            warn!(folder = %link.source_folder, error = %cleanup, "could not remove working copy");
        }
        return Err(e);
    }

    let paths = match working.finalize(&link.scan_code.to_string()) {
        Ok(paths) => paths,
        Err(e) => {
            if let Err(cleanup) = working.discard() {
                warn!(folder = %link.source_folder, error = %cleanup, "could not remove working copy");
            }
            return Err(e);
        }
    };

    info!(
        folder = %link.source_folder,
        scan = %link.scan_code,
        output = %paths.dicom_dir.display(),
        "folder de-identified"
    );
    Ok((Outcome { record: link, paths }, updated))
}

/// Drop a working copy after a fatal resolution error.
pub fn abandon(extraction: Extraction) {
    let folder = extraction.record.source_folder.clone();
    if let Err(e) = extraction.working.discard() {
        warn!(folder = %folder, error = %e, "could not remove working copy");
    }
}

/// Extract, resolve and commit one folder without any interaction. The
/// updated table is returned; saving it is up to the caller.
pub fn deidentify_folder(
    source: &Path,
    options: &DeidOptions,
    table: &LinkTable,
    choice: &IdentityChoice,
) -> Result<(Outcome, LinkTable)> {
    let extraction = prepare(source, options, table)?;
    match resolve(&extraction.record, table, choice, &options.placeholder) {
        Ok(resolution) => commit(extraction, resolution, table),
        Err(e) => {
            abandon(extraction);
            Err(e)
        }
    }
}
