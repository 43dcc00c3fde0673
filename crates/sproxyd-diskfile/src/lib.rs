//! Sproxyd DiskFile - object handles for the object server
//!
//! A [`DiskFile`] maps a Swift object path onto a flat backend key and
//! performs its reads and writes through a backend client.

pub mod diskfile;
pub mod manager;

pub use diskfile::{DiskFile, object_key};
pub use manager::DiskFileManager;
