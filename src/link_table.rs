//
// link_table.rs
// Dicom-Deid-rs
//
// Persisted table linking source folders to anonymized codes, with CSV storage and invariant checks.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codes::{PatientCode, ScanCode};
use crate::error::{DeidError, Result};
use crate::models::{LinkRecord, SeriesSummary};

const BOM: &str = "\u{feff}";
const SET_DELIMITER: char = ';';

/// Ordered, append-only collection of finalized records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    rows: Vec<LinkRecord>,
}

/// One broken invariant found by [`LinkTable::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DuplicateFolder {
        folder: String,
        rows: Vec<usize>,
    },
    ConflictingPatientCodes {
        patient_name: String,
        codes: BTreeSet<String>,
    },
    DuplicateScanCode {
        scan_code: String,
        rows: Vec<usize>,
    },
    ScanGap {
        patient_code: String,
        indices: Vec<u32>,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::DuplicateFolder { folder, rows } => {
                write!(f, "folder {} appears in rows {:?}", folder, rows)
            }
            Violation::ConflictingPatientCodes {
                patient_name,
                codes,
            } => write!(
                f,
                "patient name {:?} maps to codes {:?}",
                patient_name, codes
            ),
            Violation::DuplicateScanCode { scan_code, rows } => {
                write!(f, "scan code {} appears in rows {:?}", scan_code, rows)
            }
            Violation::ScanGap {
                patient_code,
                indices,
            } => write!(
                f,
                "scan indices of {} are not 1..k: {:?}",
                patient_code, indices
            ),
        }
    }
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the table from `path`, or returns an empty table if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no link table yet, starting empty");
            Ok(Self::new())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let table = Self::from_csv(&text)?;
        info!(path = %path.display(), rows = table.len(), "link table loaded");
        Ok(table)
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for (idx, row) in reader.deserialize::<LinkRow>().enumerate() {
            let row = row?;
            let record = row
                .into_record()
                .map_err(|e| DeidError::Table(format!("row {}: {}", idx, e)))?;
            rows.push(record);
        }
        Ok(Self { rows })
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.rows.is_empty() {
            writer.write_record(LinkRow::HEADERS)?;
        }
        for record in &self.rows {
            writer.serialize(LinkRow::from_record(record)?)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DeidError::Table(e.to_string()))?;
        let body = String::from_utf8(bytes).map_err(|e| DeidError::Table(e.to_string()))?;
        Ok(format!("{}{}", BOM, body))
    }

    /// Writes the table next to `path` and renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = Path::new(&staging);

        fs::write(staging, self.to_csv()?)?;
        fs::rename(staging, path)?;
        info!(path = %path.display(), rows = self.len(), "link table saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[LinkRecord] {
        &self.rows
    }

    /// Row index of a previously processed folder.
    pub fn find_folder(&self, folder: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.source_folder == folder)
    }

    pub fn rows_for_patient<'a>(&'a self, patient_name: &'a str) -> impl Iterator<Item = &'a LinkRecord> {
        self.rows.iter().filter(move |r| r.patient_name == patient_name)
    }

    pub fn max_patient_index(&self) -> Option<u32> {
        self.rows.iter().map(|r| r.patient_code.index()).max()
    }

    /// Appends a finalized record after checking it keeps every invariant.
    pub fn append(&mut self, record: LinkRecord) -> Result<()> {
        if let Some(row) = self.find_folder(&record.source_folder) {
            return Err(DeidError::DuplicateFolder {
                folder: record.source_folder,
                row,
            });
        }

        let mut codes: BTreeSet<String> = self
            .rows_for_patient(&record.patient_name)
            .map(|r| r.patient_code.to_string())
            .collect();
        if !codes.is_empty() && !codes.contains(&record.patient_code.to_string()) {
            codes.insert(record.patient_code.to_string());
            return Err(DeidError::CorruptLinkTable {
                patient_name: record.patient_name,
                codes,
            });
        }

        if let Some(row) = self.rows.iter().position(|r| r.scan_code == record.scan_code) {
            return Err(DeidError::Table(format!(
                "scan code {} already assigned in row {}",
                record.scan_code, row
            )));
        }

        debug!(folder = %record.source_folder, scan = %record.scan_code, "appending link row");
        self.rows.push(record);
        Ok(())
    }

    /// Lists every invariant the table currently breaks.
    pub fn verify(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        let mut by_folder: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut by_name: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut by_scan: BTreeMap<ScanCode, Vec<usize>> = BTreeMap::new();
        let mut by_patient: BTreeMap<PatientCode, Vec<u32>> = BTreeMap::new();

        for (idx, row) in self.rows.iter().enumerate() {
            by_folder.entry(&row.source_folder).or_default().push(idx);
            by_name
                .entry(&row.patient_name)
                .or_default()
                .insert(row.patient_code.to_string());
            by_scan.entry(row.scan_code).or_default().push(idx);
            by_patient
                .entry(row.scan_code.patient())
                .or_default()
                .push(row.scan_code.index());
        }

        for (folder, rows) in by_folder {
            if rows.len() > 1 {
                violations.push(Violation::DuplicateFolder {
                    folder: folder.to_string(),
                    rows,
                });
            }
        }
        for (name, codes) in by_name {
            if codes.len() > 1 {
                violations.push(Violation::ConflictingPatientCodes {
                    patient_name: name.to_string(),
                    codes,
                });
            }
        }
        for (scan, rows) in by_scan {
            if rows.len() > 1 {
                violations.push(Violation::DuplicateScanCode {
                    scan_code: scan.to_string(),
                    rows,
                });
            }
        }
        for (patient, mut indices) in by_patient {
            indices.sort_unstable();
            indices.dedup();
            let dense = indices.iter().copied().eq(1..=indices.len() as u32);
            if !dense {
                violations.push(Violation::ScanGap {
                    patient_code: patient.to_string(),
                    indices,
                });
            }
        }

        violations
    }
}

/// Joins a set with `;`, escaping delimiter and backslash inside values.
pub fn join_set(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(|v| v.replace('\\', "\\\\").replace(SET_DELIMITER, "\\;"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Inverse of [`join_set`].
pub fn split_set(joined: &str) -> BTreeSet<String> {
    let mut values = BTreeSet::new();
    if joined.is_empty() {
        return values;
    }

    let mut current = String::new();
    let mut chars = joined.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            SET_DELIMITER => {
                values.insert(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    values.insert(current);
    values
}

/// `series` cell: JSON, or the dict literal older tables hold, where `plane`
/// is a plain `;`-joined string. Anything else loads as no series.
fn parse_series(cell: &str, folder: &str) -> BTreeMap<String, SeriesSummary> {
    let cell = cell.trim();
    if cell.is_empty() {
        return BTreeMap::new();
    }
    if let Ok(series) = serde_json::from_str(cell) {
        return series;
    }

    match serde_json::from_str::<BTreeMap<String, LegacySeries>>(&cell.replace('\'', "\"")) {
        Ok(legacy) => legacy
            .into_iter()
            .map(|(description, series)| {
                let plane = series
                    .plane
                    .split(SET_DELIMITER)
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                (
                    description,
                    SeriesSummary {
                        image_count: series.image_count,
                        plane,
                    },
                )
            })
            .collect(),
        Err(e) => {
            warn!(folder, error = %e, "series cell is not readable; loaded without series");
            BTreeMap::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacySeries {
    image_count: usize,
    #[serde(default)]
    plane: String,
}

/// Storage shape of a row. Header names follow the older tables; their
/// `series` cells are read by [`parse_series`].
#[derive(Debug, Serialize, Deserialize)]
struct LinkRow {
    folder_gt: String,
    hash_folder_id: String,
    #[serde(rename = "PatientName")]
    patient_name: String,
    #[serde(rename = "PatientSex")]
    patient_sex: String,
    #[serde(rename = "PatientID")]
    patient_id: String,
    #[serde(rename = "PatientBirthDate")]
    birth_date: String,
    #[serde(rename = "StudyDescription")]
    study_description: String,
    #[serde(rename = "StudyDate")]
    study_date: String,
    series: String,
    anonymized_pt: String,
    anonymized_scanfolder: String,
    #[serde(default)]
    processed_at: String,
}

impl LinkRow {
    const HEADERS: [&'static str; 12] = [
        "folder_gt",
        "hash_folder_id",
        "PatientName",
        "PatientSex",
        "PatientID",
        "PatientBirthDate",
        "StudyDescription",
        "StudyDate",
        "series",
        "anonymized_pt",
        "anonymized_scanfolder",
        "processed_at",
    ];

    fn from_record(record: &LinkRecord) -> Result<Self> {
        Ok(Self {
            folder_gt: record.source_folder.clone(),
            hash_folder_id: record.working_id.clone(),
            patient_name: record.patient_name.clone(),
            patient_sex: join_set(&record.patient_sex),
            patient_id: join_set(&record.patient_id),
            birth_date: join_set(&record.birth_date),
            study_description: record.study_description.clone(),
            study_date: join_set(&record.study_dates),
            series: serde_json::to_string(&record.series)?,
            anonymized_pt: record.patient_code.to_string(),
            anonymized_scanfolder: record.scan_code.to_string(),
            processed_at: record
                .processed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        })
    }

    fn into_record(self) -> Result<LinkRecord> {
        let patient_code: PatientCode = self.anonymized_pt.parse()?;
        let scan_code: ScanCode = self.anonymized_scanfolder.parse()?;
        if scan_code.patient() != patient_code {
            return Err(DeidError::Table(format!(
                "scan code {} does not belong to patient {}",
                scan_code, patient_code
            )));
        }

        let series = parse_series(&self.series, &self.folder_gt);

        let processed_at = if self.processed_at.is_empty() {
            None
        } else {
            Some(
                DateTime::parse_from_rfc3339(&self.processed_at)
                    .map_err(|e| DeidError::Table(e.to_string()))?
                    .with_timezone(&Utc),
            )
        };

        Ok(LinkRecord {
            source_folder: self.folder_gt,
            working_id: self.hash_folder_id,
            patient_name: self.patient_name,
            patient_sex: split_set(&self.patient_sex),
            patient_id: split_set(&self.patient_id),
            birth_date: split_set(&self.birth_date),
            study_description: self.study_description,
            study_dates: split_set(&self.study_date),
            series,
            patient_code,
            scan_code,
            processed_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn record(folder: &str, name: &str, patient: u32, scan: u32) -> LinkRecord {
        let patient_code = PatientCode::new(patient);
        let mut series = BTreeMap::new();
        series.insert(
            "T1 AX".to_string(),
            SeriesSummary {
                image_count: 2,
                plane: ["Axial".to_string()].into(),
            },
        );
        LinkRecord {
            source_folder: folder.into(),
            working_id: format!("work-{}", folder),
            patient_name: name.into(),
            patient_sex: ["F".to_string()].into(),
            patient_id: ["ID1".to_string()].into(),
            birth_date: ["19800101".to_string()].into(),
            study_description: "MRI BRAIN".into(),
            study_dates: ["20240101".to_string()].into(),
            series,
            patient_code,
            scan_code: ScanCode::new(patient_code, scan),
            processed_at: None,
        }
    }

    #[test]
    fn set_join_escapes_delimiter() {
        let values: BTreeSet<String> = ["a;b".to_string(), "c\\d".to_string(), "e".to_string()].into();
        let joined = join_set(&values);
        assert_eq!(split_set(&joined), values);
        assert!(split_set("").is_empty());
        assert_eq!(split_set("M;F"), ["F".to_string(), "M".to_string()].into());
    }

    #[test]
    fn persisted_table_reloads_identically() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("link.csv");

        let mut table = LinkTable::new();
        let mut first = record("GT001", "Jane Doe", 1, 1);
        first.processed_at = Some(
            DateTime::parse_from_rfc3339("2025-11-03T10:00:00+00:00")
                .expect("timestamp")
                .with_timezone(&Utc),
        );
        table.append(first).expect("append first");
        table
            .append(record("GT002", "Jane Doe", 1, 2))
            .expect("append second");
        table.save(&path).expect("save");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.starts_with(BOM));
        assert!(raw.contains("anonymized_scanfolder"));

        let reloaded = LinkTable::load(&path).expect("load");
        assert_eq!(reloaded, table);
    }

    #[test]
    fn empty_table_saves_header_only() {
        let csv = LinkTable::new().to_csv().expect("csv");
        let reloaded = LinkTable::from_csv(&csv).expect("parse");
        assert!(reloaded.is_empty());
        assert!(csv.contains("folder_gt,hash_folder_id,PatientName"));
    }

    #[test]
    fn legacy_rows_without_timestamp_load() {
        let csv = "folder_gt,hash_folder_id,PatientName,PatientSex,PatientID,PatientBirthDate,StudyDescription,StudyDate,series,anonymized_pt,anonymized_scanfolder\n\
                   GT001,123,Jane Doe,F,ID1,19800101,MRI,20240101,,P0001,P0001_01\n";
        let table = LinkTable::from_csv(csv).expect("parse");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].processed_at, None);
        assert_eq!(table.rows()[0].scan_code.to_string(), "P0001_01");
    }

    #[test]
    fn dict_literal_series_cells_load() {
        let csv = "folder_gt,hash_folder_id,PatientName,PatientSex,PatientID,PatientBirthDate,StudyDescription,StudyDate,series,anonymized_pt,anonymized_scanfolder\n\
                   GT001,123,Jane Doe,F,ID1,19800101,MRI,20240101,\"{'T1 AX': {'image_count': 2, 'plane': 'Axial;Coronal'}, 'LOC': {'image_count': 1, 'plane': ''}}\",P0001,P0001_01\n\
                   GT002,456,Jane Doe,F,ID1,19800101,MRI,20240102,not a series,P0001,P0001_02\n";
        let table = LinkTable::from_csv(csv).expect("parse");
        assert_eq!(table.len(), 2);

        let series = &table.rows()[0].series;
        assert_eq!(series["T1 AX"].image_count, 2);
        assert_eq!(
            series["T1 AX"].plane,
            ["Axial".to_string(), "Coronal".to_string()].into()
        );
        assert!(series["LOC"].plane.is_empty());
        assert!(table.rows()[1].series.is_empty());

        // Saved again, the cell is JSON.
        let reloaded = LinkTable::from_csv(&table.to_csv().expect("csv")).expect("reparse");
        assert_eq!(reloaded.rows()[0].series, table.rows()[0].series);
    }

    #[test]
    fn mismatched_codes_are_rejected_on_load() {
        let csv = "folder_gt,hash_folder_id,PatientName,PatientSex,PatientID,PatientBirthDate,StudyDescription,StudyDate,series,anonymized_pt,anonymized_scanfolder\n\
                   GT001,123,Jane Doe,F,ID1,19800101,MRI,20240101,,P0001,P0002_01\n";
        assert!(LinkTable::from_csv(csv).is_err());
    }

    #[test]
    fn append_guards_invariants() {
        let mut table = LinkTable::new();
        table.append(record("GT001", "Jane Doe", 1, 1)).expect("first");

        let dup = table.append(record("GT001", "Jane Doe", 1, 2));
        assert!(matches!(dup, Err(DeidError::DuplicateFolder { row: 0, .. })));

        let conflict = table.append(record("GT002", "Jane Doe", 2, 1));
        assert!(matches!(conflict, Err(DeidError::CorruptLinkTable { .. })));

        let reused = table.append(record("GT003", "John Roe", 1, 1));
        assert!(reused.is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn verify_reports_gaps_and_conflicts() {
        let table = LinkTable {
            rows: vec![
                record("GT001", "Jane Doe", 1, 1),
                record("GT002", "Jane Doe", 1, 3),
                record("GT003", "Jane Doe", 2, 1),
            ],
        };
        let violations = table.verify();
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::ScanGap { patient_code, .. } if patient_code == "P0001")));
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::ConflictingPatientCodes { .. })));

        let clean = LinkTable {
            rows: vec![record("GT001", "Jane Doe", 1, 1), record("GT002", "Jane Doe", 1, 2)],
        };
        assert!(clean.verify().is_empty());
    }
}
