use std::fmt;

/// Acquisition plane derived from ImageOrientationPatient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Plane {
    Sagittal,
    Coronal,
    Axial,
}

impl Plane {
    /// Rounds the row/column direction cosines (half to even) and takes their cross product;
    /// the unit axis of the normal picks the plane. Oblique or malformed
    /// orientations yield `None`.
    pub fn from_orientation(iop: &[f64]) -> Option<Plane> {
        if iop.len() < 6 {
            return None;
        }
        let r: Vec<f64> = iop[..6].iter().map(|v| v.round_ties_even()).collect();
        let normal = [
            r[1] * r[5] - r[2] * r[4],
            r[2] * r[3] - r[0] * r[5],
            r[0] * r[4] - r[1] * r[3],
        ];
        let normal = normal.map(f64::abs);

        if normal[0] == 1.0 {
            Some(Plane::Sagittal)
        } else if normal[1] == 1.0 {
            Some(Plane::Coronal)
        } else if normal[2] == 1.0 {
            Some(Plane::Axial)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plane::Sagittal => "Sagittal",
            Plane::Coronal => "Coronal",
            Plane::Axial => "Axial",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
