use image::DynamicImage;
use serde::{ Deserialize, Serialize };
use tracing::{ debug, warn };

use crate::error::AnprError;

pub const ALPHANUMERIC: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Expected text layout handed to the text recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// one uniform block of text
    SingleBlock,
    SingleLine,
    SingleWord,
    SingleChar,
    /// as much text as possible, in no particular order
    SparseText,
    /// a single line, bypassing layout heuristics
    RawLine,
}

impl ScanMode {
    /// tesseract page segmentation mode
    pub fn psm(&self) -> u8 {
        match self {
            ScanMode::SingleBlock => 6,
            ScanMode::SingleLine => 7,
            ScanMode::SingleWord => 8,
            ScanMode::SingleChar => 10,
            ScanMode::SparseText => 11,
            ScanMode::RawLine => 13,
        }
    }
}

/// One recognizer invocation setting: layout mode plus permitted characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrConfig {
    pub mode: ScanMode,
    pub whitelist: String,
}

impl OcrConfig {

    pub fn new(mode: ScanMode, whitelist: &str) -> Self {
        Self { mode, whitelist: whitelist.to_string() }
    }

    pub fn alphanumeric(mode: ScanMode) -> Self {
        Self::new(mode, ALPHANUMERIC)
    }

    pub fn letters(mode: ScanMode) -> Self {
        Self::new(mode, LETTERS)
    }
}

/// A piece of text returned by a recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextToken {
    pub text: String,
    /// 0 to 100, negative when the recognizer has no score for the token
    pub confidence: f32,
    /// x, y, width, height inside the recognized raster
    pub bbox: [u32; 4],
}

/// Text capability consumed by the pipeline.
///
/// Implementations take `&self` and must not keep per call state, one instance is
/// shared by every image and every candidate.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, img: &DynamicImage, config: &OcrConfig) -> Result<Vec<TextToken>, AnprError>;
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for &R {
    fn recognize(&self, img: &DynamicImage, config: &OcrConfig) -> Result<Vec<TextToken>, AnprError> {
        (**self).recognize(img, config)
    }
}

impl<R: TextRecognizer + ?Sized> TextRecognizer for Box<R> {
    fn recognize(&self, img: &DynamicImage, config: &OcrConfig) -> Result<Vec<TextToken>, AnprError> {
        (**self).recognize(img, config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionHypothesis {
    pub text: String,
    pub confidence: f32,
    pub mode: ScanMode,
}

/// Runs every configured scan mode over one raster and keeps every token above the
/// noise threshold.
pub struct OcrAggregator<'a, R: ?Sized> {
    recognizer: &'a R,
    min_confidence: f32,
}

impl<'a, R: TextRecognizer + ?Sized> OcrAggregator<'a, R> {

    pub fn new(recognizer: &'a R, min_confidence: f32) -> Self {
        Self { recognizer, min_confidence }
    }

    /// All configs always run. A failing config is logged and skipped, the rest still run.
    pub fn recognize(&self, img: &DynamicImage, configs: &[OcrConfig]) -> Vec<RecognitionHypothesis> {
        let mut hypotheses = Vec::new();
        for config in configs {
            let tokens = match self.recognizer.recognize(img, config) {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!("skipping {:?} scan: {}", config.mode, e);
                    continue;
                }
            };
            let before = hypotheses.len();
            hypotheses.extend(tokens.into_iter().filter(|token| {
                token.confidence > self.min_confidence && !token.text.trim().is_empty()
            }).map(|token| RecognitionHypothesis {
                text: token.text,
                confidence: token.confidence,
                mode: config.mode,
            }));
            debug!("{:?} scan kept {} tokens", config.mode, hypotheses.len() - before);
        }
        hypotheses
    }
}

/// Highest confidence wins, the first seen hypothesis wins a tie.
pub fn select_best<'h, I>(hypotheses: I) -> Option<&'h RecognitionHypothesis>
where I: IntoIterator<Item = &'h RecognitionHypothesis>
{
    let mut best: Option<&'h RecognitionHypothesis> = None;
    for h in hypotheses {
        if best.map_or(true, |b| h.confidence > b.confidence) {
            best = Some(h);
        }
    }
    best
}
