//! Uniform access to single values of a parsed dataset.
//!
//! Lookups never fail for absent attributes: a missing tag, an empty value
//! or an out of range index all resolve to `None`.

use std::borrow::Cow;

use dicom::core::{PrimitiveValue, Tag};
use dicom::object::InMemDicomObject;
use dicom::object::mem::InMemElement;
use tracing::debug;

/// The parsed tag to value dictionary of one DICOM instance.
pub type Dataset = InMemDicomObject;

/// Anything that can address a data element.
///
/// Implemented for [`Tag`] and for textual identifiers made of 8 hex digits
/// (`"00280010"`), optionally preceded by a single non-hex prefix
/// character (`"x00280010"`).
pub trait TagKey {
    fn to_tag(&self) -> Option<Tag>;
}

impl TagKey for Tag {
    fn to_tag(&self) -> Option<Tag> {
        Some(*self)
    }
}

impl TagKey for str {
    fn to_tag(&self) -> Option<Tag> {
        parse_tag_key(self)
    }
}

impl TagKey for String {
    fn to_tag(&self) -> Option<Tag> {
        parse_tag_key(self)
    }
}

impl<T: TagKey + ?Sized> TagKey for &T {
    fn to_tag(&self) -> Option<Tag> {
        (**self).to_tag()
    }
}

/// Parse `GGGGEEEE` or `xGGGGEEEE` into a tag.
pub fn parse_tag_key(key: &str) -> Option<Tag> {
    let digits = match key.chars().next() {
        Some(prefix) if key.len() == 9 && !prefix.is_ascii_hexdigit() => {
            key.get(prefix.len_utf8()..)?
        }
        _ => key,
    };

    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        debug!(key, "ignoring malformed tag identifier");
        return None;
    }

    let group = u16::from_str_radix(&digits[..4], 16).ok()?;
    let element = u16::from_str_radix(&digits[4..], 16).ok()?;
    Some(Tag(group, element))
}

/// One value of a data element.
#[derive(Debug, Clone)]
pub enum TagValue<'a> {
    /// A textual value, stripped of trailing padding.
    Str(Cow<'a, str>),
    Int(i64),
    Float(f64),
    /// A whole binary blob, or one encapsulated fragment.
    Bytes(&'a [u8]),
    /// One item of a sequence.
    Item(&'a Dataset),
}

impl<'a> TagValue<'a> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            TagValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&'a Dataset> {
        match self {
            TagValue::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Numeric view of the value. Text is parsed the way DS and IS values are written.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v),
            TagValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            TagValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            TagValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            TagValue::Str(s) => Some(s.into_owned()),
            TagValue::Int(v) => Some(v.to_string()),
            TagValue::Float(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

pub(crate) fn find_element(dataset: &Dataset, tag: impl TagKey) -> Option<&InMemElement> {
    dataset.get(tag.to_tag()?)
}

/// Fetch the value at `index` of the element addressed by `tag`.
pub fn get_value(dataset: &Dataset, tag: impl TagKey, index: usize) -> Option<TagValue<'_>> {
    let value = find_element(dataset, tag)?.value();

    if let Some(items) = value.items() {
        return items.get(index).map(TagValue::Item);
    }
    if let Some(fragments) = value.fragments() {
        return fragments.get(index).map(|fragment| TagValue::Bytes(fragment));
    }
    primitive_at(value.primitive()?, index)
}

fn trim_padding(s: &str) -> &str {
    s.trim_end_matches(['\0', ' '])
}

fn primitive_at(primitive: &PrimitiveValue, index: usize) -> Option<TagValue<'_>> {
    match primitive {
        PrimitiveValue::Empty => None,
        PrimitiveValue::Str(s) => (index == 0).then(|| TagValue::Str(Cow::Borrowed(trim_padding(s)))),
        PrimitiveValue::Strs(values) => values
            .get(index)
            .map(|s| TagValue::Str(Cow::Borrowed(trim_padding(s)))),
        PrimitiveValue::U8(bytes) => (index == 0 && !bytes.is_empty()).then(|| TagValue::Bytes(&bytes[..])),
        PrimitiveValue::I16(values) => values.get(index).map(|&v| TagValue::Int(v.into())),
        PrimitiveValue::U16(values) => values.get(index).map(|&v| TagValue::Int(v.into())),
        PrimitiveValue::I32(values) => values.get(index).map(|&v| TagValue::Int(v.into())),
        PrimitiveValue::U32(values) => values.get(index).map(|&v| TagValue::Int(v.into())),
        PrimitiveValue::I64(values) => values.get(index).map(|&v| TagValue::Int(v)),
        PrimitiveValue::U64(values) => values.get(index).map(|&v| match i64::try_from(v) {
            Ok(v) => TagValue::Int(v),
            Err(_) => TagValue::Float(v as f64),
        }),
        PrimitiveValue::F32(values) => values.get(index).map(|&v| TagValue::Float(v.into())),
        PrimitiveValue::F64(values) => values.get(index).map(|&v| TagValue::Float(v)),
        other => other
            .to_str()
            .split('\\')
            .nth(index)
            .map(|s| TagValue::Str(Cow::Owned(trim_padding(s).to_owned()))),
    }
}

pub fn get_string(dataset: &Dataset, tag: impl TagKey) -> Option<String> {
    get_value(dataset, tag, 0)?.into_string()
}

pub fn get_f64(dataset: &Dataset, tag: impl TagKey) -> Option<f64> {
    get_value(dataset, tag, 0)?.to_f64()
}

pub fn get_i64(dataset: &Dataset, tag: impl TagKey) -> Option<i64> {
    get_value(dataset, tag, 0)?.to_i64()
}

pub fn get_u16(dataset: &Dataset, tag: impl TagKey) -> Option<u16> {
    get_i64(dataset, tag).and_then(|v| u16::try_from(v).ok())
}

/// Items of a sequence element, `None` when absent or empty.
pub fn get_items(dataset: &Dataset, tag: impl TagKey) -> Option<&[Dataset]> {
    find_element(dataset, tag)?
        .value()
        .items()
        .filter(|items| !items.is_empty())
}

/// The raw bytes of a primitive element, `None` when absent or empty.
pub fn get_bytes(dataset: &Dataset, tag: impl TagKey) -> Option<Cow<'_, [u8]>> {
    find_element(dataset, tag)?
        .value()
        .to_bytes()
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

/// All integer values of an element, e.g. a LUT descriptor.
pub fn get_int_values(dataset: &Dataset, tag: impl TagKey) -> Option<Vec<i64>> {
    let primitive = find_element(dataset, tag)?.value().primitive()?;
    (0..primitive.multiplicity() as usize)
        .map(|index| primitive_at(primitive, index)?.to_i64())
        .collect()
}

/// Split the string form of a multi-valued element on `\` and parse each
/// component as a float. Components which are not numbers become NaN.
///
/// Returns `None` when the element is absent or has fewer than
/// `min_length` components.
pub fn get_number_values(
    dataset: &Dataset,
    tag: impl TagKey,
    min_length: Option<usize>,
) -> Option<Vec<f64>> {
    let primitive = find_element(dataset, tag)?.value().primitive()?;
    if primitive.multiplicity() == 0 {
        return None;
    }

    let text = primitive.to_str();
    let parts: Vec<&str> = text.split('\\').collect();
    if min_length.is_some_and(|min| parts.len() < min) {
        return None;
    }

    Some(
        parts
            .into_iter()
            .map(|part| part.trim().parse().unwrap_or(f64::NAN))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, VR, dicom_value};
    use dicom_dictionary_std::tags;

    const OVERLAY_DATA: Tag = Tag(0x6000, 0x3000);

    fn dataset() -> Dataset {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [512])),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT ")),
            DataElement::new(
                tags::PIXEL_SPACING,
                VR::DS,
                dicom_value!(Strs, ["0.5", "0.75"]),
            ),
            DataElement::new(tags::WINDOW_CENTER, VR::DS, PrimitiveValue::from("40")),
            DataElement::new(
                OVERLAY_DATA,
                VR::OW,
                dicom_value!(U8, [0b0000_0101, 0xff]),
            ),
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::Empty),
        ])
    }

    #[test]
    fn parses_both_tag_conventions() {
        assert_eq!(parse_tag_key("00280010"), Some(Tag(0x0028, 0x0010)));
        assert_eq!(parse_tag_key("x7FE00010"), Some(Tag(0x7FE0, 0x0010)));
        assert_eq!(parse_tag_key("0028001"), None);
        assert_eq!(parse_tag_key("002800zz"), None);
    }

    #[test]
    fn get_value_addresses_by_tag_or_text() {
        let ds = dataset();
        assert_eq!(get_value(&ds, tags::ROWS, 0).and_then(|v| v.to_i64()), Some(512));
        assert_eq!(get_value(&ds, "x00280010", 0).and_then(|v| v.to_i64()), Some(512));
        assert_eq!(get_string(&ds, "00080060").as_deref(), Some("CT"));
    }

    #[test]
    fn absent_or_empty_values_are_none() {
        let ds = dataset();
        assert!(get_value(&ds, tags::COLUMNS, 0).is_none());
        assert!(get_value(&ds, tags::PATIENT_NAME, 0).is_none());
        assert!(get_value(&ds, tags::ROWS, 1).is_none());
        assert!(get_value(&ds, "garbage", 0).is_none());
    }

    #[test]
    fn indexes_into_multi_valued_elements() {
        let ds = dataset();
        assert_eq!(get_value(&ds, tags::PIXEL_SPACING, 1).and_then(|v| v.to_f64()), Some(0.75));
    }

    #[test]
    fn binary_elements_are_one_blob() {
        let ds = dataset();
        let blob = get_value(&ds, OVERLAY_DATA, 0).and_then(|v| v.as_bytes());
        assert_eq!(blob, Some(&[0b0000_0101, 0xff][..]));
    }

    #[test]
    fn number_values_honor_minimum_length() {
        let ds = dataset();
        assert_eq!(get_number_values(&ds, tags::PIXEL_SPACING, None), Some(vec![0.5, 0.75]));
        assert_eq!(get_number_values(&ds, tags::PIXEL_SPACING, Some(2)), Some(vec![0.5, 0.75]));
        assert_eq!(get_number_values(&ds, tags::PIXEL_SPACING, Some(3)), None);
        assert_eq!(get_number_values(&ds, tags::WINDOW_CENTER, Some(1)), Some(vec![40.0]));
        assert_eq!(get_number_values(&ds, tags::WINDOW_WIDTH, None), None);
    }
}
