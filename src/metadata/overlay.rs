use dicom::core::Tag;

use crate::pixel_data::unpack_bits;
use crate::tag_accessor::{Dataset, get_bytes, get_f64, get_string, get_u16, get_value};

/// First and last repeating overlay groups.
const FIRST_OVERLAY_GROUP: u16 = 0x6000;
const LAST_OVERLAY_GROUP: u16 = 0x601E;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPlane {
    /// Repeating group holding this overlay, 0x6000 to 0x601E.
    pub group: u16,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub overlay_type: Option<String>,
    /// Zero based column of the overlay origin.
    pub x: Option<i64>,
    /// Zero based row of the overlay origin.
    pub y: Option<i64>,
    /// One 0/1 value per overlay pixel.
    pub pixel_data: Vec<u8>,
    pub description: Option<String>,
    pub label: Option<String>,
    pub roi_area: Option<f64>,
    pub roi_mean: Option<f64>,
    pub roi_standard_deviation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPlaneModule {
    pub overlays: Vec<OverlayPlane>,
}

fn overlay_plane(dataset: &Dataset, group: u16) -> Option<OverlayPlane> {
    let data = get_bytes(dataset, Tag(group, 0x3000))?;

    // Overlay Origin is stored 1-based as row\column
    let origin = Tag(group, 0x0050);
    let origin_at = |index| get_value(dataset, origin, index).and_then(|v| v.to_i64()).map(|v| v - 1);

    Some(OverlayPlane {
        group,
        rows: get_u16(dataset, Tag(group, 0x0010)),
        columns: get_u16(dataset, Tag(group, 0x0011)),
        overlay_type: get_string(dataset, Tag(group, 0x0040)),
        x: origin_at(1),
        y: origin_at(0),
        pixel_data: unpack_bits(&data),
        description: get_string(dataset, Tag(group, 0x0022)),
        label: get_string(dataset, Tag(group, 0x1500)),
        roi_area: get_f64(dataset, Tag(group, 0x1301)),
        roi_mean: get_f64(dataset, Tag(group, 0x1302)),
        roi_standard_deviation: get_f64(dataset, Tag(group, 0x1303)),
    })
}

/// Collect every overlay group which carries Overlay Data.
pub fn get_overlay_plane_module(dataset: &Dataset) -> OverlayPlaneModule {
    let overlays = (FIRST_OVERLAY_GROUP..=LAST_OVERLAY_GROUP)
        .step_by(2)
        .filter_map(|group| overlay_plane(dataset, group))
        .collect();
    OverlayPlaneModule { overlays }
}
