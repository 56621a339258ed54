use image::{ DynamicImage, GenericImageView };
use serde::{ Deserialize, Serialize };

use crate::error::{ AnprError, AnprErrorKind };
use crate::image_process;
use crate::plate::Region;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// plate height after extraction, in pixels
    pub target_height: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { target_height: 50 }
    }
}

/// Crops `region` out of `img` and rescales it, keeping the aspect ratio, so the plate
/// is `target_height` pixels tall.
pub fn extract(img: &DynamicImage, region: &Region, config: &ExtractorConfig) -> Result<DynamicImage, AnprError> {
    let (width, height) = img.dimensions();
    let degenerate = region.width == 0
        || region.height == 0
        || config.target_height == 0
        || region.x.checked_add(region.width).map_or(true, |right| right > width)
        || region.y.checked_add(region.height).map_or(true, |bottom| bottom > height);
    if degenerate {
        return Err(AnprErrorKind::Extraction { region: *region, width, height }.into());
    }

    let plate = image_process::crop(img, region);
    let factor = config.target_height as f32 / region.height as f32;
    Ok(image_process::scale(&plate, factor))
}
