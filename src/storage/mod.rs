pub mod hash;
pub mod library;
pub mod local;
pub mod materialize;
pub mod metadata;

pub use hash::{compute_hash, slugify};
pub use library::{GalleryEntry, ImageContext, ImageLibrary};
pub use local::LocalFileStorage;
pub use materialize::Delivery;
pub use metadata::{ImageMetadata, METADATA_FILE, MetadataMap, MetadataStore};
