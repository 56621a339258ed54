use image::ImageError;
use thiserror::Error;

use std::io::Error as IOError;

use crate::ocr::ScanMode;
use crate::plate::Region;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct AnprError(AnprErrorKind);

#[derive(Debug, Error)]
pub enum AnprErrorKind {
    #[error("cannot decode image: {0}")]
    ImageLoad(#[from] ImageError),
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("cannot extract {region:?} from a {width}x{height} image")]
    Extraction { region: Region, width: u32, height: u32 },
    #[error("text recognition failed in {mode:?} mode: {message}")]
    Recognition { mode: ScanMode, message: String },
    #[error(transparent)]
    IOError(#[from] IOError),
    #[error("invalid config: {0}")]
    Config(String),
}

impl AnprError {

    pub fn kind(&self) -> &AnprErrorKind {
        &self.0
    }

    /// input could not be turned into pixels, the only error that aborts a whole image
    pub fn is_image_load(&self) -> bool {
        matches!(self.kind(), AnprErrorKind::ImageLoad(_) | AnprErrorKind::EmptyImage { .. })
    }

    pub(crate) fn recognition(mode: ScanMode, message: impl Into<String>) -> Self {
        Self(AnprErrorKind::Recognition { mode, message: message.into() })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self(AnprErrorKind::Config(message.into()))
    }
}

impl<T> From<T> for AnprError
where T: Into<AnprErrorKind>
{
    fn from(e: T) -> Self {
        Self(e.into())
    }
}
