//! Service layer: the conversion pipeline and everything it owns on disk.

pub mod archive_service;
pub mod batch_service;
pub mod registry;
pub mod sweeper;
pub mod transform_service;
