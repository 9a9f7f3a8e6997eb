//! # DICOM frame loader library
//!
//! This crate serves a high-level API for retrieving DICOM Part 10 datasets
//! over the network and extracting single frames and typed metadata from them.
//!
//! This library is part of the dicom-rs ecosystem and leverages its
//! components to parse datasets into [`InMemDicomObject`]s.
//! Datasets are held in a reference counted [`DatasetCache`] keyed by
//! location. Concurrent requests for the same location share one streamed
//! retrieval, and the last consumer to release a dataset evicts it (and
//! cancels the retrieval if it is still in flight).
//!
//! On top of a cached dataset the library provides:
//!  - Frame extraction for native pixel data (1, 8, 16 and 32 bits allocated)
//!    and for encapsulated pixel data (one fragment per frame)
//!  - Metadata modules such as Image Pixel (including palette color LUTs),
//!    Modality LUT, VOI LUT, Image Plane and Overlay Plane
//!  - Lenient and strict parsing of DA and TM values
//!
//!  Pixel data is never decompressed: encapsulated frames are handed out
//!  verbatim for an external codec. Progress and cache changes are reported
//!  to observers registered with [`DatasetCache::with_observer`].
//!
//! # Examples
//!
//! ## Loading a frame and its image pixel module
//!
//! ```no_run
//! # use dicom_frame_loader::{DatasetCache, MetadataModule, MetadataProvider, ModuleKind};
//! # async fn run() -> Result<(), dicom_frame_loader::ImageLoadError> {
//! let cache = DatasetCache::http();
//! let image_id = "wadouri:https://pacs.example/ct/1.dcm?frame=0";
//!
//! let frame = cache.load_image(image_id).await?;
//! let pixels = frame.pixel_data.as_ref().map(|pixels| pixels.data().len());
//!
//! let provider = MetadataProvider::new(&cache);
//! if let Some(MetadataModule::ImagePixel(module)) = provider.get(ModuleKind::ImagePixel, image_id) {
//!     println!("{}x{} image, {pixels:?} bytes", module.columns, module.rows);
//! }
//!
//! cache.decache(&frame);
//! # Ok(())
//! # }
//! ```
//!
//! [`InMemDicomObject`]: https://docs.rs/dicom-object/latest/dicom_object/mem/struct.InMemDicomObject.html

pub mod dataset_cache;
pub mod date_time;
pub mod enums;
pub mod events;
pub mod image_loader;
pub mod metadata;
pub mod options;
pub mod parser;
pub mod pixel_data;
pub mod streaming_loader;
pub mod tag_accessor;
pub mod transport;

pub use dataset_cache::{CacheInfo, DatasetCache, LoadResult, PendingLoad};
pub use enums::{CacheAction, LoadState, ModuleKind, PixelRepresentation};
pub use events::{EventSink, LoaderEvent};
pub use image_loader::{ImageId, ImageLoadError, LoadedFrame};
pub use metadata::{MetadataModule, MetadataProvider, build_module};
pub use options::LoaderOptions;
pub use parser::{ContainerParser, ParseError, Part10Parser};
pub use pixel_data::{FrameBytes, FrameError, get_pixel_data};
pub use streaming_loader::{LoadError, StreamingLoader};
pub use tag_accessor::{Dataset, TagKey, TagValue, get_value};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
