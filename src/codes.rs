//
// codes.rs
// Dicom-Deid-rs
//
// Anonymized patient and scan codes (P0001, P0001_02) with parsing and formatting.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;

use crate::error::DeidError;

/// Stable anonymized identifier for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatientCode(u32);

impl PatientCode {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// First scan code for this patient.
    pub fn first_scan(self) -> ScanCode {
        ScanCode {
            patient: self,
            index: 1,
        }
    }
}

impl fmt::Display for PatientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:04}", self.0)
    }
}

impl FromStr for PatientCode {
    type Err = DeidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix('P')
            .and_then(|digits| digits.parse::<u32>().ok())
            .map(PatientCode)
            .ok_or_else(|| DeidError::Table(format!("Malformed patient code {:?}", s)))
    }
}

/// Identifier of one scan session, scoped to a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanCode {
    patient: PatientCode,
    index: u32,
}

impl ScanCode {
    pub fn new(patient: PatientCode, index: u32) -> Self {
        Self { patient, index }
    }

    pub fn patient(self) -> PatientCode {
        self.patient
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}", self.patient, self.index)
    }
}

impl FromStr for ScanCode {
    type Err = DeidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DeidError::Table(format!("Malformed scan code {:?}", s));
        let (patient, index) = s.trim().split_once('_').ok_or_else(malformed)?;
        let patient = patient.parse::<PatientCode>().map_err(|_| malformed())?;
        let index = index.parse::<u32>().map_err(|_| malformed())?;
        Ok(ScanCode { patient, index })
    }
}
