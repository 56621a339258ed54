//! Reads the issuing region from the identifier band at the left end of a plate.
//!
//! The checks form a chain, each step only runs when the previous one found nothing
//! and each accepts on weaker evidence than the one before:
//!
//! 1. no blue band in the reserved strip: `UNKNOWN`
//! 2. national code read from the thresholded band: `GB`
//! 3. national code read from the raw band with a simpler setup: `GB`
//! 4. bright lettering on a strongly blue band: `GB`
//! 5. band without any confirmation: `EU`

use image::{ DynamicImage, GenericImageView };
use serde::{ Deserialize, Serialize };
use tracing::{ debug, warn };

use crate::image_process::{ self, HsvRange };
use crate::ocr::{ OcrConfig, ScanMode, TextRecognizer };
use crate::plate::IssuingRegion;
use crate::utils::StageHook;

pub const NATIONAL_CODE: &str = "GB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionIdConfig {
    /// share of the plate width reserved for the band
    pub band_fraction: f32,
    /// plates narrower than this are upscaled before analysis
    pub min_width: u32,
    pub upscale_width: u32,
    pub blue: HsvRange,
    pub white: HsvRange,
    /// blue share of the strip above which the band is present
    pub blue_threshold: f32,
    /// gray level separating the lettering from the band
    pub text_level: u8,
    /// white and blue shares above which bright lettering counts as the national code
    pub white_threshold: f32,
    pub strong_blue_threshold: f32,
}

impl Default for RegionIdConfig {
    fn default() -> Self {
        Self {
            band_fraction: 0.18,
            min_width: 100,
            upscale_width: 200,
            blue: HsvRange { hue: (200.0, 260.0), saturation: (0.196, 1.0), value: (0.196, 1.0) },
            white: HsvRange { hue: (0.0, 360.0), saturation: (0.0, 0.118), value: (0.706, 1.0) },
            blue_threshold: 0.10,
            text_level: 180,
            white_threshold: 0.05,
            strong_blue_threshold: 0.20,
        }
    }
}

pub struct RegionIdentifier<'a, R: ?Sized> {
    config: &'a RegionIdConfig,
    recognizer: &'a R,
    hook: &'a dyn StageHook,
}

impl<'a, R: TextRecognizer + ?Sized> RegionIdentifier<'a, R> {

    pub fn new(config: &'a RegionIdConfig, recognizer: &'a R, hook: &'a dyn StageHook) -> Self {
        Self { config, recognizer, hook }
    }

    pub fn identify(&self, plate: &DynamicImage) -> IssuingRegion {
        let config = self.config;
        let (width, _) = plate.dimensions();
        if width == 0 {
            return IssuingRegion::Unknown;
        }
        let plate = if width < config.min_width {
            image_process::scale(plate, config.upscale_width as f32 / width as f32)
        } else {
            plate.clone()
        };

        let band = image_process::left_part(&plate, config.band_fraction);
        self.hook.inspect("identifier band", &band);
        let blue = image_process::color_fraction(&band, &config.blue);
        debug!("identifier band is {:.1}% blue", blue * 100.0);
        if blue <= config.blue_threshold {
            return IssuingRegion::Unknown;
        }

        let letters = OcrConfig::letters(ScanMode::SingleChar);
        let gray = image_process::grayscale(&band);
        let lettering = image_process::close(&image_process::threshold(&gray, config.text_level), 1);
        let lettering = DynamicImage::ImageLuma8(lettering);
        self.hook.inspect("identifier lettering", &lettering);
        if self.reads_national_code(&lettering, &letters) {
            debug!("national code read from thresholded band");
            return IssuingRegion::Gb;
        }
        if self.reads_national_code(&band, &letters) {
            debug!("national code read from raw band");
            return IssuingRegion::Gb;
        }

        let white = image_process::color_fraction(&band, &config.white);
        if white > config.white_threshold && blue > config.strong_blue_threshold {
            debug!("bright lettering on blue band ({:.1}% white)", white * 100.0);
            return IssuingRegion::Gb;
        }
        IssuingRegion::Eu
    }

    /// tokens count whatever their confidence, a failing recognizer reads nothing
    fn reads_national_code(&self, img: &DynamicImage, config: &OcrConfig) -> bool {
        let tokens = match self.recognizer.recognize(img, config) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("{:?} scan of identifier band failed: {}", config.mode, e);
                return false;
            }
        };
        let text: String = tokens.iter().flat_map(|token| token.text.split_whitespace()).collect();
        text.to_uppercase().contains(NATIONAL_CODE)
    }
}
