use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, InMemDicomObject};

// Patient module
pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
pub const PATIENT_SEX: Tag = Tag(0x0010, 0x0040);

// Study / series
pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
pub const STUDY_ID: Tag = Tag(0x0020, 0x0010);
pub const SERIES_DESCRIPTION: Tag = Tag(0x0008, 0x103E);
pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
pub const MODALITY: Tag = Tag(0x0008, 0x0060);

// Image
pub const IMAGE_TYPE: Tag = Tag(0x0008, 0x0008);
pub const IMAGE_ORIENTATION_PATIENT: Tag = Tag(0x0020, 0x0037);

// Media storage directory (DICOMDIR)
pub const DIRECTORY_RECORD_SEQUENCE: Tag = Tag(0x0004, 0x1220);
pub const DIRECTORY_RECORD_TYPE: Tag = Tag(0x0004, 0x1430);
pub const REFERENCED_FILE_ID: Tag = Tag(0x0004, 0x1500);

/// Small helper trait to pull string values from different DICOM object shapes.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_strings(&self, tag: Tag) -> Vec<String>;
    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>>;
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
    }

    /// Every component of a multi-valued element, trimmed, empties dropped.
    fn element_strings(&self, tag: Tag) -> Vec<String> {
        let Some(values) = self.element(tag).ok().and_then(|e| e.to_multi_str().ok()) else {
            return Vec::new();
        };
        values
            .iter()
            .flat_map(|v| v.split('\\'))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Numeric components of a decimal string element; `None` if absent or unparsable.
    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>> {
        let values = self.element_strings(tag);
        if values.is_empty() {
            return None;
        }
        values.iter().map(|v| v.parse::<f64>().ok()).collect()
    }
}

impl<O: ElementAccess> ElementAccess for FileDicomObject<O> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        (**self).element_str(tag)
    }

    fn element_strings(&self, tag: Tag) -> Vec<String> {
        (**self).element_strings(tag)
    }

    fn element_f64s(&self, tag: Tag) -> Option<Vec<f64>> {
        (**self).element_f64s(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    #[test]
    fn multi_valued_strings_are_split_and_trimmed() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            REFERENCED_FILE_ID,
            VR::CS,
            PrimitiveValue::from("IMAGES\\IM0001 "),
        ));
        obj.put(DataElement::new(
            PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("Doe^Jane "),
        ));

        assert_eq!(obj.element_strings(REFERENCED_FILE_ID), vec!["IMAGES", "IM0001"]);
        assert_eq!(obj.element_str(PATIENT_NAME).as_deref(), Some("Doe^Jane"));
        assert!(obj.element_strings(STUDY_ID).is_empty());

        obj.put(DataElement::new(
            IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            PrimitiveValue::from("1\\0\\0\\0\\1\\0"),
        ));
        assert_eq!(
            obj.element_f64s(IMAGE_ORIENTATION_PATIENT),
            Some(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        );
        assert_eq!(obj.element_f64s(STUDY_ID), None);
    }
}
