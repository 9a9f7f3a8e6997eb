//! Typed metadata modules derived from raw dataset attributes.
//!
//! Each `get_*_module` function reads one module from a dataset. The
//! [`MetadataProvider`] answers the same queries by image id, against the
//! datasets a [`DatasetCache`] has finished loading.

mod image_pixel;
mod lut;
mod modules;
mod overlay;

pub use image_pixel::{ImagePixelModule, LutDescriptor, PaletteChannel, PaletteColorLut, get_image_pixel_module};
pub use lut::{LutSequenceEntry, MAX_LUT_ENTRIES, get_luts, get_modality_lut_output_pixel_representation};
pub use modules::{
    GeneralSeriesModule, ImagePlaneModule, ModalityLutModule, PatientStudyModule, PetIsotopeModule,
    RadiopharmaceuticalInfo, SopCommonModule, VoiLutModule, get_general_series_module, get_image_plane_module,
    get_modality_lut_module, get_patient_study_module, get_pet_isotope_module, get_sop_common_module,
    get_voi_lut_module,
};
pub use overlay::{OverlayPlane, OverlayPlaneModule, get_overlay_plane_module};

use tracing::warn;

use crate::dataset_cache::DatasetCache;
use crate::enums::ModuleKind;
use crate::image_loader::ImageId;
use crate::tag_accessor::Dataset;

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataModule {
    GeneralSeries(GeneralSeriesModule),
    PatientStudy(PatientStudyModule),
    ImagePlane(ImagePlaneModule),
    ImagePixel(ImagePixelModule),
    ModalityLut(ModalityLutModule),
    VoiLut(VoiLutModule),
    SopCommon(SopCommonModule),
    PetIsotope(PetIsotopeModule),
    OverlayPlane(OverlayPlaneModule),
}

/// Build the module `kind` from `dataset`. `None` when the dataset lacks the
/// attributes the module requires.
pub fn build_module(dataset: &Dataset, kind: ModuleKind) -> Option<MetadataModule> {
    let module = match kind {
        ModuleKind::GeneralSeries => MetadataModule::GeneralSeries(get_general_series_module(dataset)),
        ModuleKind::PatientStudy => MetadataModule::PatientStudy(get_patient_study_module(dataset)),
        ModuleKind::ImagePlane => MetadataModule::ImagePlane(get_image_plane_module(dataset)),
        ModuleKind::ImagePixel => MetadataModule::ImagePixel(get_image_pixel_module(dataset)?),
        ModuleKind::ModalityLut => MetadataModule::ModalityLut(get_modality_lut_module(dataset)),
        ModuleKind::VoiLut => MetadataModule::VoiLut(get_voi_lut_module(dataset)),
        ModuleKind::SopCommon => MetadataModule::SopCommon(get_sop_common_module(dataset)),
        ModuleKind::PetIsotope => MetadataModule::PetIsotope(get_pet_isotope_module(dataset)?),
        ModuleKind::OverlayPlane => MetadataModule::OverlayPlane(get_overlay_plane_module(dataset)),
    };
    Some(module)
}

/// Metadata lookups by image id. Never triggers a load.
#[derive(Debug, Clone, Copy)]
pub struct MetadataProvider<'c> {
    cache: &'c DatasetCache,
}

impl<'c> MetadataProvider<'c> {
    pub fn new(cache: &'c DatasetCache) -> Self {
        Self { cache }
    }

    pub fn get(&self, kind: ModuleKind, image_id: &str) -> Option<MetadataModule> {
        let parsed: ImageId = image_id.parse().ok()?;
        let Some(dataset) = self.cache.get(&parsed.url) else {
            warn!(image_id, "dicom dataset has not loaded yet");
            return None;
        };
        build_module(&dataset, kind)
    }
}
