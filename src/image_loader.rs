//! Frame requests addressed by image id.
//!
//! An image id has the form `<scheme>:<url>`, optionally selecting a frame
//! with a `frame=<n>` query parameter, e.g.
//! `wadouri:https://pacs.example/ct.dcm?frame=2`. The url without the frame
//! parameter is the cache location, so all frames of one file share a dataset.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dicom_dictionary_std::tags;
use thiserror::Error;
use tracing::debug;
use web_time::Instant;

use crate::dataset_cache::DatasetCache;
use crate::pixel_data::{FrameBytes, FrameError, get_pixel_data};
use crate::streaming_loader::LoadError;
use crate::tag_accessor::{Dataset, get_string};

const FRAME_PARAMETER: &str = "frame=";

#[derive(Debug, Clone, Error)]
pub enum ImageLoadError {
    #[error("Invalid image id '{0}'")]
    InvalidImageId(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageId {
    pub scheme: String,
    /// The cache location.
    pub url: String,
    pub frame: Option<usize>,
}

impl ImageId {
    pub fn frame_index(&self) -> usize {
        self.frame.unwrap_or(0)
    }
}

impl FromStr for ImageId {
    type Err = ImageLoadError;

    fn from_str(image_id: &str) -> Result<Self, Self::Err> {
        let invalid = || ImageLoadError::InvalidImageId(image_id.to_owned());

        let (scheme, rest) = image_id.split_once(':').ok_or_else(invalid)?;
        if scheme.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (url, frame) = match rest.find(FRAME_PARAMETER) {
            Some(position) => {
                let digits = &rest[position + FRAME_PARAMETER.len()..];
                let digits = digits.split('&').next().unwrap_or_default();
                let frame = digits.parse().map_err(|_| invalid())?;
                // drop the '?' or '&' in front of the parameter
                (&rest[..position.saturating_sub(1)], Some(frame))
            }
            None => (rest, None),
        };

        Ok(Self {
            scheme: scheme.to_owned(),
            url: url.to_owned(),
            frame,
        })
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.url)?;
        if let Some(frame) = self.frame {
            let separator = if self.url.contains('?') { '&' } else { '?' };
            write!(f, "{separator}{FRAME_PARAMETER}{frame}")?;
        }
        Ok(())
    }
}

/// One frame and the dataset it came from.
#[derive(Debug, Clone)]
pub struct LoadedFrame {
    pub image_id: String,
    /// Cache location of the dataset, released by [`DatasetCache::decache`].
    pub shared_cache_key: String,
    pub frame_index: usize,
    pub transfer_syntax_uid: Option<String>,
    /// `None` when the dataset has no pixel data.
    pub pixel_data: Option<FrameBytes<'static>>,
    pub dataset: Arc<Dataset>,
    /// Time until the dataset was available.
    pub load_time: Duration,
    /// Time until the frame was extracted.
    pub total_time: Duration,
}

impl DatasetCache {
    /// Load the dataset behind `image_id` and extract the frame it names.
    ///
    /// The dataset stays referenced until [`DatasetCache::decache`] is called
    /// with the returned frame. On error no reference is kept.
    pub async fn load_image(&self, image_id: &str) -> Result<LoadedFrame, ImageLoadError> {
        let parsed: ImageId = image_id.parse()?;
        let start = Instant::now();

        let dataset = match self.load_for(&parsed.url, Some(image_id)).await {
            Ok(dataset) => dataset,
            Err(error) => {
                self.unload(&parsed.url);
                return Err(error.into());
            }
        };
        let load_time = start.elapsed();

        let frame_index = parsed.frame_index();
        let pixel_data = match get_pixel_data(&dataset, frame_index) {
            Ok(frame) => frame.map(FrameBytes::into_owned),
            Err(error) => {
                self.unload(&parsed.url);
                return Err(error.into());
            }
        };
        let transfer_syntax_uid = get_string(&dataset, tags::TRANSFER_SYNTAX_UID);
        let total_time = start.elapsed();
        debug!(image_id, frame_index, ?load_time, ?total_time, "frame loaded");

        Ok(LoadedFrame {
            image_id: image_id.to_owned(),
            shared_cache_key: parsed.url,
            frame_index,
            transfer_syntax_uid,
            pixel_data,
            dataset,
            load_time,
            total_time,
        })
    }

    /// Release the dataset reference held by `frame`.
    pub fn decache(&self, frame: &LoadedFrame) {
        self.unload(&frame.shared_cache_key);
    }
}
