use std::fmt;

/// Lifecycle of a cached dataset entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed,
}

/// What happened to a cache entry, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Loaded,
    Unloaded,
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheAction::Loaded => f.write_str("loaded"),
            CacheAction::Unloaded => f.write_str("unloaded"),
        }
    }
}

/// Pixel Representation (0028,0103), also used for the output of the modality LUT.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PixelRepresentation {
    #[default]
    Unsigned,
    Signed,
}

impl PixelRepresentation {
    pub fn from_value(value: i64) -> Self {
        if value == 1 {
            PixelRepresentation::Signed
        } else {
            PixelRepresentation::Unsigned
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, PixelRepresentation::Signed)
    }
}

/// The metadata modules a [`MetadataProvider`](crate::metadata::MetadataProvider) can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    GeneralSeries,
    PatientStudy,
    ImagePlane,
    ImagePixel,
    ModalityLut,
    VoiLut,
    SopCommon,
    PetIsotope,
    OverlayPlane,
}
