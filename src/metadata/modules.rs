use dicom_dictionary_std::tags;

use super::lut::{LutSequenceEntry, get_luts, get_modality_lut_output_pixel_representation};
use crate::date_time::{DateValue, TimeValue, parse_da, parse_tm};
use crate::enums::PixelRepresentation;
use crate::tag_accessor::{Dataset, get_f64, get_i64, get_items, get_number_values, get_string, get_u16};

#[derive(Debug, Clone, PartialEq)]
pub struct GeneralSeriesModule {
    pub modality: Option<String>,
    pub series_instance_uid: Option<String>,
    pub series_number: Option<i64>,
    pub study_instance_uid: Option<String>,
    pub series_date: Option<DateValue>,
    pub series_time: Option<TimeValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientStudyModule {
    pub patient_age: Option<String>,
    pub patient_size: Option<f64>,
    pub patient_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlaneModule {
    pub frame_of_reference_uid: Option<String>,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub image_orientation_patient: Option<Vec<f64>>,
    pub row_cosines: Option<[f64; 3]>,
    pub column_cosines: Option<[f64; 3]>,
    pub image_position_patient: Option<Vec<f64>>,
    pub slice_thickness: Option<f64>,
    pub slice_location: Option<f64>,
    pub pixel_spacing: Option<Vec<f64>>,
    pub row_pixel_spacing: Option<f64>,
    pub column_pixel_spacing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalityLutModule {
    pub rescale_intercept: Option<f64>,
    pub rescale_slope: Option<f64>,
    pub rescale_type: Option<String>,
    pub modality_lut_sequence: Option<Vec<LutSequenceEntry>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiLutModule {
    pub window_center: Option<Vec<f64>>,
    pub window_width: Option<Vec<f64>>,
    pub voi_lut_sequence: Option<Vec<LutSequenceEntry>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SopCommonModule {
    pub sop_class_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadiopharmaceuticalInfo {
    pub radiopharmaceutical_start_time: Option<TimeValue>,
    pub radionuclide_total_dose: Option<f64>,
    pub radionuclide_half_life: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PetIsotopeModule {
    pub radiopharmaceutical_info: RadiopharmaceuticalInfo,
}

fn date(dataset: &Dataset, tag: dicom::core::Tag) -> Option<DateValue> {
    parse_da(&get_string(dataset, tag)?, false).ok().flatten()
}

fn time(dataset: &Dataset, tag: dicom::core::Tag) -> Option<TimeValue> {
    parse_tm(&get_string(dataset, tag)?, false).ok().flatten()
}

pub fn get_general_series_module(dataset: &Dataset) -> GeneralSeriesModule {
    GeneralSeriesModule {
        modality: get_string(dataset, tags::MODALITY),
        series_instance_uid: get_string(dataset, tags::SERIES_INSTANCE_UID),
        series_number: get_i64(dataset, tags::SERIES_NUMBER),
        study_instance_uid: get_string(dataset, tags::STUDY_INSTANCE_UID),
        series_date: date(dataset, tags::SERIES_DATE),
        series_time: time(dataset, tags::SERIES_TIME),
    }
}

pub fn get_patient_study_module(dataset: &Dataset) -> PatientStudyModule {
    PatientStudyModule {
        patient_age: get_string(dataset, tags::PATIENT_AGE),
        patient_size: get_f64(dataset, tags::PATIENT_SIZE),
        patient_weight: get_f64(dataset, tags::PATIENT_WEIGHT),
    }
}

pub fn get_image_plane_module(dataset: &Dataset) -> ImagePlaneModule {
    let image_orientation_patient = get_number_values(dataset, tags::IMAGE_ORIENTATION_PATIENT, Some(6));
    let pixel_spacing = get_number_values(dataset, tags::PIXEL_SPACING, Some(2));

    let cosines = |offset: usize| {
        image_orientation_patient
            .as_ref()
            .map(|iop| [iop[offset], iop[offset + 1], iop[offset + 2]])
    };

    ImagePlaneModule {
        frame_of_reference_uid: get_string(dataset, tags::FRAME_OF_REFERENCE_UID),
        rows: get_u16(dataset, tags::ROWS),
        columns: get_u16(dataset, tags::COLUMNS),
        row_cosines: cosines(0),
        column_cosines: cosines(3),
        image_orientation_patient: image_orientation_patient.clone(),
        image_position_patient: get_number_values(dataset, tags::IMAGE_POSITION_PATIENT, Some(3)),
        slice_thickness: get_f64(dataset, tags::SLICE_THICKNESS),
        slice_location: get_f64(dataset, tags::SLICE_LOCATION),
        row_pixel_spacing: pixel_spacing.as_ref().map(|spacing| spacing[0]),
        column_pixel_spacing: pixel_spacing.as_ref().map(|spacing| spacing[1]),
        pixel_spacing,
    }
}

pub fn get_modality_lut_module(dataset: &Dataset) -> ModalityLutModule {
    let pixel_representation = get_i64(dataset, tags::PIXEL_REPRESENTATION)
        .map(PixelRepresentation::from_value)
        .unwrap_or_default();

    ModalityLutModule {
        rescale_intercept: get_f64(dataset, tags::RESCALE_INTERCEPT),
        rescale_slope: get_f64(dataset, tags::RESCALE_SLOPE),
        rescale_type: get_string(dataset, tags::RESCALE_TYPE),
        modality_lut_sequence: get_luts(pixel_representation, get_items(dataset, tags::MODALITY_LUT_SEQUENCE)),
    }
}

/// The VOI LUT input is the modality LUT output, so its signedness drives LUT parsing.
pub fn get_voi_lut_module(dataset: &Dataset) -> VoiLutModule {
    let input_representation = get_modality_lut_output_pixel_representation(dataset).unwrap_or_default();

    VoiLutModule {
        window_center: get_number_values(dataset, tags::WINDOW_CENTER, Some(1)),
        window_width: get_number_values(dataset, tags::WINDOW_WIDTH, Some(1)),
        voi_lut_sequence: get_luts(input_representation, get_items(dataset, tags::VOILUT_SEQUENCE)),
    }
}

pub fn get_sop_common_module(dataset: &Dataset) -> SopCommonModule {
    SopCommonModule {
        sop_class_uid: get_string(dataset, tags::SOP_CLASS_UID),
        sop_instance_uid: get_string(dataset, tags::SOP_INSTANCE_UID),
    }
}

/// Read the first Radiopharmaceutical Information item. `None` without that sequence.
pub fn get_pet_isotope_module(dataset: &Dataset) -> Option<PetIsotopeModule> {
    let info = get_items(dataset, tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE)?.first()?;

    Some(PetIsotopeModule {
        radiopharmaceutical_info: RadiopharmaceuticalInfo {
            radiopharmaceutical_start_time: time(info, tags::RADIOPHARMACEUTICAL_START_TIME),
            radionuclide_total_dose: get_f64(info, tags::RADIONUCLIDE_TOTAL_DOSE),
            radionuclide_half_life: get_f64(info, tags::RADIONUCLIDE_HALF_LIFE),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, Length, PrimitiveValue, VR, dicom_value};

    #[test]
    fn general_series_parses_date_and_time() {
        let ds = Dataset::from_element_iter([
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("MR")),
            DataElement::new(tags::SERIES_NUMBER, VR::IS, PrimitiveValue::from("7")),
            DataElement::new(tags::SERIES_DATE, VR::DA, PrimitiveValue::from("20240229")),
            DataElement::new(tags::SERIES_TIME, VR::TM, PrimitiveValue::from("1015")),
        ]);
        let module = get_general_series_module(&ds);
        assert_eq!(module.modality.as_deref(), Some("MR"));
        assert_eq!(module.series_number, Some(7));
        assert_eq!(module.series_date, Some(DateValue { year: 2024, month: 2, day: 29 }));
        assert_eq!(module.series_time.map(|t| (t.hours, t.minutes, t.seconds)), Some((10, Some(15), None)));
        assert_eq!(module.series_instance_uid, None);
    }

    #[test]
    fn image_plane_splits_orientation_and_spacing() {
        let ds = Dataset::from_element_iter([
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                dicom_value!(Strs, ["1", "0", "0", "0", "1", "0"]),
            ),
            DataElement::new(tags::IMAGE_POSITION_PATIENT, VR::DS, dicom_value!(Strs, ["-10", "5"])),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, dicom_value!(Strs, ["0.5", "0.25"])),
        ]);
        let module = get_image_plane_module(&ds);
        assert_eq!(module.row_cosines, Some([1.0, 0.0, 0.0]));
        assert_eq!(module.column_cosines, Some([0.0, 1.0, 0.0]));
        // fewer than three components
        assert_eq!(module.image_position_patient, None);
        assert_eq!(module.row_pixel_spacing, Some(0.5));
        assert_eq!(module.column_pixel_spacing, Some(0.25));
    }

    #[test]
    fn voi_lut_windows() {
        let ds = Dataset::from_element_iter([
            DataElement::new(tags::WINDOW_CENTER, VR::DS, dicom_value!(Strs, ["40", "300"])),
            DataElement::new(tags::WINDOW_WIDTH, VR::DS, dicom_value!(Strs, ["400", "1500"])),
        ]);
        let module = get_voi_lut_module(&ds);
        assert_eq!(module.window_center, Some(vec![40.0, 300.0]));
        assert_eq!(module.window_width, Some(vec![400.0, 1500.0]));
        assert_eq!(module.voi_lut_sequence, None);
    }

    #[test]
    fn pet_isotope_reads_first_item() {
        let item = Dataset::from_element_iter([
            DataElement::new(tags::RADIOPHARMACEUTICAL_START_TIME, VR::TM, PrimitiveValue::from("083000")),
            DataElement::new(tags::RADIONUCLIDE_TOTAL_DOSE, VR::DS, PrimitiveValue::from("370000000")),
            DataElement::new(tags::RADIONUCLIDE_HALF_LIFE, VR::DS, PrimitiveValue::from("6586.2")),
        ]);
        let ds = Dataset::from_element_iter([DataElement::new(
            tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE,
            VR::SQ,
            DataSetSequence::new(vec![item], Length::UNDEFINED),
        )]);

        let info = get_pet_isotope_module(&ds).unwrap().radiopharmaceutical_info;
        assert_eq!(info.radiopharmaceutical_start_time.map(|t| t.hours), Some(8));
        assert_eq!(info.radionuclide_half_life, Some(6586.2));
        assert_eq!(get_pet_isotope_module(&Dataset::new_empty()), None);
    }

    #[test]
    fn modality_lut_reads_rescale() {
        let ds = Dataset::from_element_iter([
            DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from("-1024")),
            DataElement::new(tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("1")),
            DataElement::new(tags::RESCALE_TYPE, VR::LO, PrimitiveValue::from("HU")),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, dicom_value!(U16, [0])),
        ]);
        let module = get_modality_lut_module(&ds);
        assert_eq!(module.rescale_intercept, Some(-1024.0));
        assert_eq!(module.rescale_type.as_deref(), Some("HU"));
        assert_eq!(module.modality_lut_sequence, None);
    }
}
