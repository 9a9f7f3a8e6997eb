//! Extraction of single frames from the Pixel Data element.

use std::borrow::Cow;

use dicom::object::mem::InMemElement;
use dicom_dictionary_std::tags;
use thiserror::Error;
use tracing::warn;

use crate::tag_accessor::{Dataset, find_element, get_string, get_u16};

/// Value length marking encapsulated pixel data.
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Missing required attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Frame {frame_index} exceeds size of pixelData (offset {offset}, length {length})")]
    FrameOutOfBounds {
        frame_index: usize,
        offset: usize,
        length: usize,
    },

    #[error("Frame {frame_index} has no fragment ({fragments} fragments available)")]
    FragmentOutOfRange { frame_index: usize, fragments: usize },

    #[error("Unsupported pixel format: bits allocated = {0}")]
    UnsupportedBitsAllocated(u16),

    #[error("Pixel data element holds no readable bytes")]
    InvalidPixelData,
}

impl FrameError {
    /// Whether this error is about addressing past the available data.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            FrameError::FrameOutOfBounds { .. } | FrameError::FragmentOutOfRange { .. }
        )
    }
}

/// The bytes of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBytes<'a> {
    /// One compressed fragment, passed through verbatim.
    Encapsulated(Cow<'a, [u8]>),
    /// Raw samples. 1-bit data is unpacked to one byte per sample.
    Native { data: Cow<'a, [u8]>, bits_allocated: u16 },
}

impl FrameBytes<'_> {
    pub fn is_encapsulated(&self) -> bool {
        matches!(self, FrameBytes::Encapsulated(_))
    }

    pub fn data(&self) -> &[u8] {
        match self {
            FrameBytes::Encapsulated(data) | FrameBytes::Native { data, .. } => data,
        }
    }

    /// Width in bytes of one sample in [`data`](Self::data), if known.
    pub fn bytes_per_sample(&self) -> Option<usize> {
        match self {
            FrameBytes::Encapsulated(_) => None,
            FrameBytes::Native { bits_allocated: 1, .. } => Some(1),
            FrameBytes::Native { bits_allocated, .. } => Some(usize::from(*bits_allocated) / 8),
        }
    }

    pub fn into_owned(self) -> FrameBytes<'static> {
        match self {
            FrameBytes::Encapsulated(data) => FrameBytes::Encapsulated(Cow::Owned(data.into_owned())),
            FrameBytes::Native { data, bits_allocated } => FrameBytes::Native {
                data: Cow::Owned(data.into_owned()),
                bits_allocated,
            },
        }
    }
}

fn pixel_data_element(dataset: &Dataset) -> Option<&InMemElement> {
    find_element(dataset, tags::PIXEL_DATA).or_else(|| find_element(dataset, tags::FLOAT_PIXEL_DATA))
}

/// Whether the pixel data element was written with an undefined length.
pub fn is_encapsulated(dataset: &Dataset) -> bool {
    pixel_data_element(dataset).is_some_and(|element| element.header().len.0 == UNDEFINED_LENGTH)
}

/// Extract frame `frame_index` (zero based).
///
/// Returns `Ok(None)` when the dataset has no pixel data element.
pub fn get_pixel_data(dataset: &Dataset, frame_index: usize) -> Result<Option<FrameBytes<'_>>, FrameError> {
    let Some(element) = pixel_data_element(dataset) else {
        return Ok(None);
    };

    if element.header().len.0 == UNDEFINED_LENGTH {
        get_encapsulated_frame(element, frame_index).map(Some)
    } else {
        get_native_frame(dataset, element, frame_index).map(Some)
    }
}

/// One fragment per frame; frames spanning several fragments are not reassembled.
fn get_encapsulated_frame(element: &InMemElement, frame_index: usize) -> Result<FrameBytes<'_>, FrameError> {
    let fragments = element.value().fragments().unwrap_or_default();
    fragments
        .get(frame_index)
        .map(|fragment| FrameBytes::Encapsulated(Cow::Borrowed(fragment.as_slice())))
        .ok_or(FrameError::FragmentOutOfRange {
            frame_index,
            fragments: fragments.len(),
        })
}

/// Samples per pixel as stored, except for YBR_FULL_422 whose chroma
/// subsampling leaves two stored samples per pixel.
fn stored_samples_per_pixel(dataset: &Dataset) -> Result<usize, FrameError> {
    let samples_per_pixel = get_u16(dataset, tags::SAMPLES_PER_PIXEL)
        .ok_or(FrameError::MissingAttribute("SamplesPerPixel"))?;

    if get_string(dataset, tags::PHOTOMETRIC_INTERPRETATION).as_deref() == Some("YBR_FULL_422") {
        warn!(
            stored = samples_per_pixel,
            "using SamplesPerPixel of 2 for YBR_FULL_422 photometric interpretation"
        );
        return Ok(2);
    }
    Ok(usize::from(samples_per_pixel))
}

fn get_native_frame<'a>(
    dataset: &Dataset,
    element: &'a InMemElement,
    frame_index: usize,
) -> Result<FrameBytes<'a>, FrameError> {
    let bits_allocated =
        get_u16(dataset, tags::BITS_ALLOCATED).ok_or(FrameError::MissingAttribute("BitsAllocated"))?;
    let rows = get_u16(dataset, tags::ROWS).ok_or(FrameError::MissingAttribute("Rows"))?;
    let columns = get_u16(dataset, tags::COLUMNS).ok_or(FrameError::MissingAttribute("Columns"))?;
    let samples_per_pixel = stored_samples_per_pixel(dataset)?;

    let pixels_per_frame = usize::from(rows) * usize::from(columns) * samples_per_pixel;

    let bytes_per_sample = match bits_allocated {
        1 => None,
        8 => Some(1),
        16 => Some(2),
        32 => Some(4),
        other => return Err(FrameError::UnsupportedBitsAllocated(other)),
    };

    let pixel_bytes = element
        .value()
        .to_bytes()
        .map_err(|_| FrameError::InvalidPixelData)?;

    let Some(bytes_per_sample) = bytes_per_sample else {
        let data = unpack_binary_frame(&pixel_bytes, frame_index, pixels_per_frame)?;
        return Ok(FrameBytes::Native {
            data: Cow::Owned(data),
            bits_allocated,
        });
    };

    let length = pixel_bytes.len();
    let frame_length = pixels_per_frame.checked_mul(bytes_per_sample);
    let offset = frame_length.and_then(|frame_length| frame_index.checked_mul(frame_length));
    let end = offset
        .zip(frame_length)
        .and_then(|(offset, frame_length)| offset.checked_add(frame_length));
    let (Some(offset), Some(end)) = (offset, end) else {
        return Err(FrameError::FrameOutOfBounds {
            frame_index,
            offset: usize::MAX,
            length,
        });
    };
    if offset >= length || end > length {
        return Err(FrameError::FrameOutOfBounds {
            frame_index,
            offset,
            length,
        });
    }

    let data = match pixel_bytes {
        Cow::Borrowed(bytes) => Cow::Borrowed(&bytes[offset..end]),
        Cow::Owned(bytes) => Cow::Owned(bytes[offset..end].to_vec()),
    };
    Ok(FrameBytes::Native { data, bits_allocated })
}

/// Unpack one frame of 1-bit samples into one byte per sample.
///
/// Bits are read least significant first. Frames need not start on a byte
/// boundary: frame `n` starts at bit `n * pixels_per_frame`.
pub fn unpack_binary_frame(
    packed: &[u8],
    frame_index: usize,
    pixels_per_frame: usize,
) -> Result<Vec<u8>, FrameError> {
    let Some((first_bit, end_bit)) = frame_index
        .checked_mul(pixels_per_frame)
        .and_then(|first_bit| Some((first_bit, first_bit.checked_add(pixels_per_frame)?)))
    else {
        return Err(FrameError::FrameOutOfBounds {
            frame_index,
            offset: usize::MAX,
            length: packed.len(),
        });
    };
    let offset = first_bit / 8;
    let bytes_needed = end_bit.div_ceil(8);
    if offset >= packed.len() || bytes_needed > packed.len() {
        return Err(FrameError::FrameOutOfBounds {
            frame_index,
            offset,
            length: packed.len(),
        });
    }

    Ok((first_bit..end_bit)
        .map(|bit| (packed[bit / 8] >> (bit % 8)) & 1)
        .collect())
}

/// Unpack every bit of `packed`, least significant bit first.
pub fn unpack_bits(packed: &[u8]) -> Vec<u8> {
    packed
        .iter()
        .flat_map(|byte| (0..8).map(move |bit| (byte >> bit) & 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::value::{PixelFragmentSequence, Value};
    use dicom::core::{DataElement, PrimitiveValue, VR, dicom_value};

    fn native(bits_allocated: u16, samples: u16, photometric: &str, pixels: Vec<u8>) -> Dataset {
        Dataset::from_element_iter([
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [2])),
            DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [2])),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, dicom_value!(U16, [samples])),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [bits_allocated])),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from(photometric),
            ),
            DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(pixels.into())),
        ])
    }

    #[test]
    fn no_pixel_data_is_none() {
        let ds = Dataset::new_empty();
        assert_eq!(get_pixel_data(&ds, 0), Ok(None));
    }

    #[test]
    fn sixteen_bit_second_frame_starts_at_byte_8() {
        let ds = native(16, 1, "MONOCHROME2", (0..16).collect());
        let frame = get_pixel_data(&ds, 1).unwrap().unwrap();
        assert_eq!(frame.data(), &[8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(frame.bytes_per_sample(), Some(2));
        assert!(!frame.is_encapsulated());
    }

    #[test]
    fn ybr_full_422_uses_two_samples_per_pixel() {
        // 2x2 pixels * 2 samples = 8 bytes per frame, although 3 samples are stored
        let ds = native(8, 3, "YBR_FULL_422", (0..24).collect());
        let frame = get_pixel_data(&ds, 1).unwrap().unwrap();
        assert_eq!(frame.data(), &[8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn frame_past_the_buffer_is_a_bounds_error() {
        let ds = native(16, 1, "MONOCHROME2", (0..16).collect());
        let err = get_pixel_data(&ds, 2).unwrap_err();
        assert!(err.is_out_of_bounds());
        assert_eq!(
            err,
            FrameError::FrameOutOfBounds {
                frame_index: 2,
                offset: 16,
                length: 16
            }
        );
    }

    #[test]
    fn partial_frame_is_not_truncated() {
        let ds = native(32, 1, "MONOCHROME2", (0..20).collect());
        assert!(get_pixel_data(&ds, 1).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn huge_frame_index_does_not_wrap_around() {
        let ds = native(16, 1, "MONOCHROME2", (0..16).collect());
        assert!(get_pixel_data(&ds, 1 << 61).unwrap_err().is_out_of_bounds());

        let ds = native(1, 1, "MONOCHROME2", vec![0xFF; 16]);
        assert!(get_pixel_data(&ds, 1 << 62).unwrap_err().is_out_of_bounds());
        assert!(unpack_binary_frame(&[0xFF; 16], usize::MAX, 4).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn unsupported_bit_depth() {
        let ds = native(12, 1, "MONOCHROME2", vec![0; 8]);
        assert_eq!(
            get_pixel_data(&ds, 0),
            Err(FrameError::UnsupportedBitsAllocated(12))
        );
    }

    #[test]
    fn one_bit_frames_unpack_lsb_first() {
        let bits = [1, 0, 1, 1, 0, 0, 0, 1];
        let packed = bits
            .iter()
            .enumerate()
            .fold(0_u8, |byte, (i, bit)| byte | (bit << i));
        assert_eq!(unpack_bits(&[packed]), bits);

        // 2x2 frames: the second frame lives in the high nibble
        let ds = native(1, 1, "MONOCHROME2", vec![packed]);
        let frame = get_pixel_data(&ds, 1).unwrap().unwrap();
        assert_eq!(frame.data(), &bits[4..]);
        assert_eq!(frame.bytes_per_sample(), Some(1));
        assert!(get_pixel_data(&ds, 2).unwrap_err().is_out_of_bounds());
    }

    #[test]
    fn encapsulated_frames_are_fragments() {
        let fragments = vec![vec![0xff, 0xd8, 0x01], vec![0xff, 0xd8, 0x02]];
        let ds = Dataset::from_element_iter([DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            Value::from(PixelFragmentSequence::new(vec![], fragments)),
        )]);

        assert!(is_encapsulated(&ds));
        let frame = get_pixel_data(&ds, 1).unwrap().unwrap();
        assert!(frame.is_encapsulated());
        assert_eq!(frame.data(), &[0xff, 0xd8, 0x02]);
        assert_eq!(
            get_pixel_data(&ds, 2),
            Err(FrameError::FragmentOutOfRange {
                frame_index: 2,
                fragments: 2
            })
        );
    }

    #[test]
    fn float_pixel_data_is_the_fallback_element() {
        let ds = Dataset::from_element_iter([
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [1])),
            DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [1])),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, dicom_value!(U16, [1])),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [32])),
            DataElement::new(tags::FLOAT_PIXEL_DATA, VR::OF, dicom_value!(U8, [0, 0, 128, 63])),
        ]);
        let frame = get_pixel_data(&ds, 0).unwrap().unwrap();
        assert_eq!(frame.data(), &[0, 0, 128, 63]);
    }
}
