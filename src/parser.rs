use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::file::ReadPreamble;
use dicom::object::{OpenFileOptions, ReadError};
use dicom_dictionary_std::tags;
use thiserror::Error;
use tracing::debug;

use crate::tag_accessor::Dataset;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] ReadError),

    #[error("Malformed dataset: {0}")]
    Malformed(String),
}

/// Turns the fully retrieved body of a location into a dataset.
pub trait ContainerParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Dataset, ParseError>;
}

/// Parser for DICOM Part 10 files, with or without the 128 byte preamble.
///
/// The transfer syntax of the file meta group is copied into the returned
/// dataset as (0002,0010) so that frame extraction can see it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Part10Parser;

impl ContainerParser for Part10Parser {
    fn parse(&self, bytes: &[u8]) -> Result<Dataset, ParseError> {
        if bytes.is_empty() {
            return Err(ParseError::Malformed("empty body".to_owned()));
        }
        let object = OpenFileOptions::new()
            .read_preamble(ReadPreamble::Auto)
            .from_reader(bytes)?;
        let transfer_syntax = object.meta().transfer_syntax().to_owned();
        debug!(%transfer_syntax, length = bytes.len(), "parsed part 10 dataset");

        let mut dataset = object.into_inner();
        dataset.put(DataElement::new(
            tags::TRANSFER_SYNTAX_UID,
            VR::UI,
            PrimitiveValue::from(transfer_syntax),
        ));
        Ok(dataset)
    }
}
