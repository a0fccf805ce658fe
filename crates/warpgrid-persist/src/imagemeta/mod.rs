//! Cloud image metadata persistence.

pub mod series;
pub mod storage;
pub mod types;

pub use storage::{ImageMetadataStorage, IMAGE_METADATA};
pub use types::*;
