//! Recognizer settings. One [`AnprConfig`] carries every threshold and band the
//! pipeline uses, so different recognizer flavours are different values of it.

use serde::{ Deserialize, Serialize };

use std::fs;
use std::path::Path;

use crate::detect::DetectorConfig;
use crate::error::AnprError;
use crate::extract::ExtractorConfig;
use crate::normalize::NormalizerConfig;
use crate::ocr::{ OcrConfig, ScanMode };
use crate::region_id::RegionIdConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// run in order, every one of them on every raster
    pub configs: Vec<OcrConfig>,
    /// tokens at or below this confidence are noise
    pub min_confidence: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            configs: vec![
                OcrConfig::alphanumeric(ScanMode::SingleLine),
                OcrConfig::alphanumeric(ScanMode::SingleWord),
                OcrConfig::alphanumeric(ScanMode::SingleBlock),
                OcrConfig::alphanumeric(ScanMode::RawLine),
            ],
            min_confidence: 0.0,
        }
    }
}

/// How an extracted plate is cleaned up before text recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateTextConfig {
    pub blur_sigma: Option<f32>,
    pub threshold_radius: u32,
    /// left share of the plate skipped because it holds the identifier band
    pub skip_left: f32,
    pub open_radius: u8,
}

impl Default for PlateTextConfig {
    fn default() -> Self {
        Self { blur_sigma: None, threshold_radius: 5, skip_left: 0.15, open_radius: 1 }
    }
}

/// Whole image reading used when no candidate is found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub threshold_radius: u32,
    /// left share dropped for the second, Otsu thresholded pass
    pub skip_left: f32,
    pub second_pass: OcrConfig,
    /// look for a plate in single character runs of all readings as a last guess
    pub loose_guess: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_radius: 5,
            skip_left: 0.2,
            second_pass: OcrConfig::alphanumeric(ScanMode::SingleLine),
            loose_guess: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnprConfig {
    pub detector: DetectorConfig,
    pub extractor: ExtractorConfig,
    pub plate_text: PlateTextConfig,
    pub ocr: OcrSettings,
    pub normalizer: NormalizerConfig,
    pub region_id: RegionIdConfig,
    pub fallback: FallbackConfig,
    /// images whose own width over height is inside this band are read as one plate
    pub whole_plate_aspect: (f32, f32),
}

impl Default for AnprConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            extractor: ExtractorConfig::default(),
            plate_text: PlateTextConfig::default(),
            ocr: OcrSettings::default(),
            normalizer: NormalizerConfig::default(),
            region_id: RegionIdConfig::default(),
            fallback: FallbackConfig::default(),
            whole_plate_aspect: (3.5, 5.5),
        }
    }
}

impl AnprConfig {

    /// Looser outline filter that needs a 4 to 6 sided shape instead, and a stricter
    /// noise threshold on recognized text.
    pub fn permissive() -> Self {
        let detector = DetectorConfig {
            external_only: true,
            max_contours: 15,
            aspect_ratio: (2.0, 7.0),
            polygon_vertices: Some((4, 6)),
            ..DetectorConfig::default()
        };
        let ocr = OcrSettings { min_confidence: 10.0, ..OcrSettings::default() };
        Self { detector, ocr, ..Self::default() }
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_ocr_configs(mut self, configs: Vec<OcrConfig>) -> Self {
        self.ocr.configs = configs;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.ocr.min_confidence = min_confidence;
        self
    }

    pub fn with_confusions(mut self, confusions: Vec<(char, char)>) -> Self {
        self.normalizer.confusions = confusions;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback.enabled = enabled;
        self
    }

    /// Reads a `.toml` or `.json` file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnprError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| AnprError::config(e.to_string()))?,
            Some("json") => serde_json::from_str(&content).map_err(|e| AnprError::config(e.to_string()))?,
            other => return Err(AnprError::config(format!("unsupported config extension {:?}", other))),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnprError> {
        let bands = [
            ("detector.area_fraction", self.detector.area_fraction),
            ("detector.aspect_ratio", self.detector.aspect_ratio),
            ("whole_plate_aspect", self.whole_plate_aspect),
        ];
        for (name, (low, high)) in bands.iter() {
            if !(low < high) {
                return Err(AnprError::config(format!("{} must be an increasing band, got ({}, {})", name, low, high)));
            }
        }
        if let Some((min, max)) = self.detector.polygon_vertices {
            if min > max {
                return Err(AnprError::config(format!("detector.polygon_vertices ({}, {}) is empty", min, max)));
            }
        }
        if self.detector.canny_low > self.detector.canny_high {
            return Err(AnprError::config(format!("detector.canny_low {} is above canny_high {}",
                self.detector.canny_low, self.detector.canny_high)));
        }
        let positives = [
            ("detector.sigma_color", self.detector.sigma_color as f64),
            ("detector.sigma_spatial", self.detector.sigma_spatial as f64),
            ("detector.polygon_epsilon", self.detector.polygon_epsilon),
            ("plate_text.threshold_radius", self.plate_text.threshold_radius as f64),
            ("fallback.threshold_radius", self.fallback.threshold_radius as f64),
        ];
        for (name, value) in positives.iter() {
            if !(*value > 0.0) {
                return Err(AnprError::config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if let Some(sigma) = self.plate_text.blur_sigma {
            if !(sigma > 0.0) {
                return Err(AnprError::config(format!("plate_text.blur_sigma must be positive, got {}", sigma)));
            }
        }
        if self.ocr.configs.is_empty() {
            return Err(AnprError::config("ocr.configs must not be empty"));
        }
        if self.extractor.target_height == 0 {
            return Err(AnprError::config("extractor.target_height must be positive"));
        }
        let fractions = [
            ("plate_text.skip_left", self.plate_text.skip_left),
            ("fallback.skip_left", self.fallback.skip_left),
            ("region_id.band_fraction", self.region_id.band_fraction),
        ];
        for (name, fraction) in fractions.iter() {
            if !(0.0..1.0).contains(fraction) {
                return Err(AnprError::config(format!("{} must be in [0, 1), got {}", name, fraction)));
            }
        }
        Ok(())
    }
}
