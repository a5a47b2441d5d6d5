//! Unified error type for the Model-T firmware core.
//!
//! Each subsystem has its own small `Copy` error enum; all of them convert
//! into [`Error`] so top-level code (the board `main`, the host simulator)
//! can handle failures uniformly with `?`.

use core::fmt;

use crate::adapters::flash_store::GeometryError;
use crate::app::ports::{NetworkError, StorageError};
use crate::config::ConfigError;
use crate::image::ImageError;
use crate::ota::OtaError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A partition could not be erased, written or read.
    Storage(StorageError),
    /// An image failed verification.
    Image(ImageError),
    /// An OTA session aborted.
    Ota(OtaError),
    /// The update source could not be reached.
    Network(NetworkError),
    /// Configuration values are out of range.
    Config(ConfigError),
    /// The partition layout does not fit the flash device.
    Geometry(GeometryError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Image(e) => write!(f, "image: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Geometry(e) => write!(f, "flash geometry: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ImageError> for Error {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<GeometryError> for Error {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
