use dicom::core::header::HasLength;
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;

/// Placeholder written over every person name.
pub const DEFAULT_PLACEHOLDER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Placeholder,
    /// Same encoded length as the value being replaced.
    Original,
}

/// Replace every PN element, including those nested in sequences, with `placeholder`.
/// Returns the number of elements replaced.
pub fn scrub_person_names(obj: &mut InMemDicomObject<StandardDataDictionary>, placeholder: &str) -> usize {
    scrub(obj, placeholder, Width::Placeholder)
}

/// Like [`scrub_person_names`], but each replacement is padded or cut to the
/// encoded length of the name it replaces. Directory records point at each
/// other by byte offset, so the index must not grow or shrink.
///
/// Only items of undefined length keep their position after a rewrite; check
/// [`records_have_defined_length`] first.
pub fn scrub_index_names(obj: &mut InMemDicomObject<StandardDataDictionary>, placeholder: &str) -> usize {
    scrub(obj, placeholder, Width::Original)
}

/// Whether any item of the sequence at `tag` was read with an explicit length.
pub fn records_have_defined_length(obj: &InMemDicomObject<StandardDataDictionary>, tag: Tag) -> bool {
    obj.element(tag)
        .ok()
        .and_then(|elem| elem.items())
        .map_or(false, |items| items.iter().any(|item| item.length().is_defined()))
}

fn scrub(obj: &mut InMemDicomObject<StandardDataDictionary>, placeholder: &str, width: Width) -> usize {
    let mut replaced = 0;
    let mut updates = Vec::new();

    for elem in obj.iter() {
        let tag = elem.header().tag;
        match elem.header().vr {
            VR::PN => {
                let value = match width {
                    Width::Placeholder => placeholder.to_string(),
                    Width::Original => {
                        let encoded = elem.header().len.get().map(|len| len as usize).unwrap_or_else(|| {
                            elem.value().to_str().map(|s| s.len()).unwrap_or_default()
                        });
                        fit_to_width(placeholder, encoded + encoded % 2)
                    }
                };
                updates.push(DataElement::new(tag, VR::PN, PrimitiveValue::from(value)));
                replaced += 1;
            }
            VR::SQ => {
                // Items are cloned, scrubbed, and the sequence put back whole.
                if let Some(items) = elem.items() {
                    let mut items = items.to_vec();
                    let nested: usize = items.iter_mut().map(|item| scrub(item, placeholder, width)).sum();
                    if nested > 0 {
                        updates.push(DataElement::new(
                            tag,
                            VR::SQ,
                            DataSetSequence::new(items, Length::UNDEFINED),
                        ));
                        replaced += nested;
                    }
                }
            }
            _ => {}
        }
    }

    for elem in updates {
        obj.put(elem);
    }
    replaced
}

/// `placeholder` cut or space-padded to exactly `width` bytes.
fn fit_to_width(placeholder: &str, width: usize) -> String {
    let mut value: String = placeholder.chars().take(width).collect();
    while value.len() > width {
        value.pop();
    }
    while value.len() < width {
        value.push(' ');
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom_access::{ElementAccess, DIRECTORY_RECORD_SEQUENCE, PATIENT_ID, PATIENT_NAME};

    const REFERRING_PHYSICIAN: Tag = Tag(0x0008, 0x0090);
    const OPERATORS_NAME: Tag = Tag(0x0008, 0x1070);
    const REQUEST_ATTRIBUTES: Tag = Tag(0x0040, 0x0275);

    #[test]
    fn scrub_reaches_nested_person_names() {
        let mut nested = InMemDicomObject::new_empty();
        nested.put(DataElement::new(
            OPERATORS_NAME,
            VR::PN,
            PrimitiveValue::from("Tech^Tom"),
        ));

        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^Jane")));
        obj.put(DataElement::new(
            REFERRING_PHYSICIAN,
            VR::PN,
            PrimitiveValue::from("House^Greg"),
        ));
        obj.put(DataElement::new(PATIENT_ID, VR::LO, PrimitiveValue::from("ID1")));
        obj.put(DataElement::new(
            REQUEST_ATTRIBUTES,
            VR::SQ,
            DataSetSequence::new(vec![nested], Length::UNDEFINED),
        ));

        let replaced = scrub_person_names(&mut obj, DEFAULT_PLACEHOLDER);
        assert_eq!(replaced, 3);
        assert_eq!(obj.element_str(PATIENT_NAME).as_deref(), Some("anonymous"));
        assert_eq!(obj.element_str(REFERRING_PHYSICIAN).as_deref(), Some("anonymous"));
        assert_eq!(obj.element_str(PATIENT_ID).as_deref(), Some("ID1"));

        let items = obj
            .element(REQUEST_ATTRIBUTES)
            .expect("sequence")
            .items()
            .expect("items");
        assert_eq!(items[0].element_str(OPERATORS_NAME).as_deref(), Some("anonymous"));
    }

    #[test]
    fn index_names_keep_their_encoded_length() {
        let mut record = InMemDicomObject::new_empty();
        record.put(DataElement::new(PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^Jane")));
        record.put(DataElement::new(
            REFERRING_PHYSICIAN,
            VR::PN,
            PrimitiveValue::from("Li^Bo"),
        ));
        record.put(DataElement::new(
            OPERATORS_NAME,
            VR::PN,
            PrimitiveValue::from("Featherstonehaugh^Ann"),
        ));

        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            DIRECTORY_RECORD_SEQUENCE,
            VR::SQ,
            DataSetSequence::new(vec![record], Length::UNDEFINED),
        ));
        assert!(!records_have_defined_length(&obj, DIRECTORY_RECORD_SEQUENCE));

        assert_eq!(scrub_index_names(&mut obj, DEFAULT_PLACEHOLDER), 3);
        let items = obj
            .element(DIRECTORY_RECORD_SEQUENCE)
            .expect("sequence")
            .items()
            .expect("items");
        assert_eq!(items[0].element_str(PATIENT_NAME).as_deref(), Some("anonymou"));
        assert_eq!(items[0].element_str(REFERRING_PHYSICIAN).as_deref(), Some("anonym"));
        assert_eq!(items[0].element_str(OPERATORS_NAME).as_deref(), Some("anonymous"));
    }

    #[test]
    fn placeholder_is_cut_or_padded() {
        assert_eq!(fit_to_width("anonymous", 4), "anon");
        assert_eq!(fit_to_width("anonymous", 12), "anonymous   ");
        assert_eq!(fit_to_width("anonymous", 0), "");
    }
}
