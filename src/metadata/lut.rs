use dicom::core::PrimitiveValue;
use dicom_dictionary_std::{tags, uids};
use tracing::debug;

use crate::enums::PixelRepresentation;
use crate::tag_accessor::{Dataset, TagKey, find_element, get_f64, get_i64, get_int_values, get_items, get_string};

/// A LUT descriptor entry count of zero stands for this many entries.
pub const MAX_LUT_ENTRIES: usize = 65536;

/// One item of a Modality LUT or VOI LUT sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LutSequenceEntry {
    pub first_value_mapped: i32,
    pub num_bits_per_entry: u16,
    pub entries: Vec<u16>,
}

/// The words of a LUT data element, whatever VR it was read with.
pub(crate) fn lut_words(dataset: &Dataset, tag: impl TagKey) -> Option<Vec<u16>> {
    let primitive = find_element(dataset, tag)?.value().primitive()?;
    let words = match primitive {
        PrimitiveValue::Empty => return None,
        PrimitiveValue::U16(values) => values.to_vec(),
        PrimitiveValue::I16(values) => bytemuck::cast_slice::<i16, u16>(&values[..]).to_vec(),
        other => other
            .to_bytes()
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    };
    Some(words)
}

fn parse_lut(pixel_representation: PixelRepresentation, item: &Dataset) -> Option<LutSequenceEntry> {
    let descriptor = get_int_values(item, tags::LUT_DESCRIPTOR).filter(|d| d.len() >= 3)?;

    let num_entries = match descriptor[0] & 0xFFFF {
        0 => MAX_LUT_ENTRIES,
        n => n as usize,
    };
    // the first value mapped follows the signedness of the LUT input
    let first_value_mapped = if pixel_representation.is_signed() {
        i32::from(descriptor[1] as u16 as i16)
    } else {
        i32::from(descriptor[1] as u16)
    };
    let num_bits_per_entry = descriptor[2] as u16;

    let mut entries = lut_words(item, tags::LUT_DATA).unwrap_or_default();
    if entries.len() < num_entries {
        debug!(
            declared = num_entries,
            stored = entries.len(),
            "skipping LUT item with fewer entries than its descriptor declares"
        );
        return None;
    }
    entries.truncate(num_entries);

    Some(LutSequenceEntry {
        first_value_mapped,
        num_bits_per_entry,
        entries,
    })
}

/// Parse every item of a LUT sequence. `None` when the sequence is absent or empty.
///
/// Items whose LUT Data is shorter than the descriptor's entry count are skipped.
pub fn get_luts(
    pixel_representation: PixelRepresentation,
    sequence: Option<&[Dataset]>,
) -> Option<Vec<LutSequenceEntry>> {
    let items = sequence.filter(|items| !items.is_empty())?;
    Some(
        items
            .iter()
            .filter_map(|item| parse_lut(pixel_representation, item))
            .collect(),
    )
}

fn min_stored_pixel_value(dataset: &Dataset) -> i64 {
    let pixel_representation = get_i64(dataset, tags::PIXEL_REPRESENTATION).unwrap_or(0);
    if pixel_representation == 0 {
        return 0;
    }
    let bits_stored = get_i64(dataset, tags::BITS_STORED)
        .or_else(|| get_i64(dataset, tags::BITS_ALLOCATED))
        .unwrap_or(16)
        .clamp(1, 32);
    -(1_i64 << (bits_stored - 1))
}

/// Whether the output of the modality LUT stage is signed.
pub fn get_modality_lut_output_pixel_representation(dataset: &Dataset) -> Option<PixelRepresentation> {
    // CT images are always signed
    let sop_class_uid = get_string(dataset, tags::SOP_CLASS_UID);
    if matches!(
        sop_class_uid.as_deref(),
        Some(uids::CT_IMAGE_STORAGE | uids::ENHANCED_CT_IMAGE_STORAGE)
    ) {
        return Some(PixelRepresentation::Signed);
    }

    let intercept = get_f64(dataset, tags::RESCALE_INTERCEPT);
    let slope = get_f64(dataset, tags::RESCALE_SLOPE);
    if let (Some(intercept), Some(slope)) = (intercept, slope) {
        let min_value = min_stored_pixel_value(dataset) as f64 * slope + intercept;
        return Some(if min_value < 0.0 {
            PixelRepresentation::Signed
        } else {
            PixelRepresentation::Unsigned
        });
    }

    // a non linear modality LUT always maps to unsigned values
    if get_items(dataset, tags::MODALITY_LUT_SEQUENCE).is_some() {
        return Some(PixelRepresentation::Unsigned);
    }

    get_i64(dataset, tags::PIXEL_REPRESENTATION).map(PixelRepresentation::from_value)
}
