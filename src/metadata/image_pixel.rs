use dicom::core::Tag;
use dicom_dictionary_std::tags;
use tracing::warn;

use super::lut::{MAX_LUT_ENTRIES, lut_words};
use crate::enums::PixelRepresentation;
use crate::tag_accessor::{Dataset, get_bytes, get_i64, get_int_values, get_number_values, get_string, get_u16};

/// The three values of a (palette color) LUT descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutDescriptor {
    pub num_entries: u32,
    pub first_value_mapped: i32,
    pub bits_per_entry: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteChannel {
    pub descriptor: LutDescriptor,
    pub data: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteColorLut {
    pub red: PaletteChannel,
    pub green: PaletteChannel,
    pub blue: PaletteChannel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePixelModule {
    pub samples_per_pixel: Option<u16>,
    pub photometric_interpretation: Option<String>,
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: Option<u16>,
    pub bits_stored: Option<u16>,
    pub high_bit: Option<u16>,
    pub pixel_representation: Option<PixelRepresentation>,
    pub planar_configuration: Option<u16>,
    pub pixel_aspect_ratio: Option<Vec<f64>>,
    pub smallest_pixel_value: Option<i64>,
    pub largest_pixel_value: Option<i64>,
    pub palette_color_lut: Option<PaletteColorLut>,
}

fn lut_descriptor(dataset: &Dataset, tag: Tag) -> Option<LutDescriptor> {
    let values = get_int_values(dataset, tag).filter(|values| values.len() == 3)?;
    Some(LutDescriptor {
        num_entries: (values[0] & 0xFFFF) as u32,
        first_value_mapped: values[1] as i32,
        bits_per_entry: values[2] as u16,
    })
}

fn palette_data(dataset: &Dataset, tag: Tag, descriptor: &LutDescriptor) -> Vec<u16> {
    if descriptor.bits_per_entry == 16 {
        return lut_words(dataset, tag).unwrap_or_default();
    }
    get_bytes(dataset, tag)
        .map(|bytes| {
            bytes
                .iter()
                .take(descriptor.num_entries as usize)
                .map(|&b| u16::from(b))
                .collect()
        })
        .unwrap_or_default()
}

/// Read the red, green and blue palettes.
///
/// Descriptors are corrected for two encoder quirks before the data is read:
/// an entry count of 0 means 65536 entries, and the bits per entry are
/// derived from the red data length (one byte per entry means 8 bits,
/// anything else 16) rather than trusted from the descriptor.
fn palette_color_lut(dataset: &Dataset) -> Option<PaletteColorLut> {
    let mut red = lut_descriptor(dataset, tags::RED_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR)?;
    let (Some(mut green), Some(mut blue)) = (
        lut_descriptor(dataset, tags::GREEN_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR),
        lut_descriptor(dataset, tags::BLUE_PALETTE_COLOR_LOOKUP_TABLE_DESCRIPTOR),
    ) else {
        warn!("palette color image is missing its green or blue LUT descriptor");
        return None;
    };

    if red.num_entries == 0 {
        for descriptor in [&mut red, &mut green, &mut blue] {
            descriptor.num_entries = MAX_LUT_ENTRIES as u32;
        }
    }

    let red_data_length = get_bytes(dataset, tags::RED_PALETTE_COLOR_LOOKUP_TABLE_DATA).map_or(0, |b| b.len());
    let lut_bits_allocated = if red_data_length == red.num_entries as usize { 8 } else { 16 };
    if red.bits_per_entry != lut_bits_allocated {
        for descriptor in [&mut red, &mut green, &mut blue] {
            descriptor.bits_per_entry = lut_bits_allocated;
        }
    }

    Some(PaletteColorLut {
        red: PaletteChannel {
            data: palette_data(dataset, tags::RED_PALETTE_COLOR_LOOKUP_TABLE_DATA, &red),
            descriptor: red,
        },
        green: PaletteChannel {
            data: palette_data(dataset, tags::GREEN_PALETTE_COLOR_LOOKUP_TABLE_DATA, &green),
            descriptor: green,
        },
        blue: PaletteChannel {
            data: palette_data(dataset, tags::BLUE_PALETTE_COLOR_LOOKUP_TABLE_DATA, &blue),
            descriptor: blue,
        },
    })
}

/// Build the image pixel module. `None` unless both Rows and Columns are present.
pub fn get_image_pixel_module(dataset: &Dataset) -> Option<ImagePixelModule> {
    let rows = get_u16(dataset, tags::ROWS)?;
    let columns = get_u16(dataset, tags::COLUMNS)?;
    let photometric_interpretation = get_string(dataset, tags::PHOTOMETRIC_INTERPRETATION);

    let palette_color_lut = match photometric_interpretation.as_deref() {
        Some("PALETTE COLOR") => palette_color_lut(dataset),
        _ => None,
    };

    Some(ImagePixelModule {
        samples_per_pixel: get_u16(dataset, tags::SAMPLES_PER_PIXEL),
        photometric_interpretation,
        rows,
        columns,
        bits_allocated: get_u16(dataset, tags::BITS_ALLOCATED),
        bits_stored: get_u16(dataset, tags::BITS_STORED),
        high_bit: get_u16(dataset, tags::HIGH_BIT),
        pixel_representation: get_i64(dataset, tags::PIXEL_REPRESENTATION).map(PixelRepresentation::from_value),
        planar_configuration: get_u16(dataset, tags::PLANAR_CONFIGURATION),
        pixel_aspect_ratio: get_number_values(dataset, tags::PIXEL_ASPECT_RATIO, None),
        smallest_pixel_value: get_i64(dataset, tags::SMALLEST_IMAGE_PIXEL_VALUE),
        largest_pixel_value: get_i64(dataset, tags::LARGEST_IMAGE_PIXEL_VALUE),
        palette_color_lut,
    })
}
