use image::{ DynamicImage, ImageFormat };
use tracing::trace;

use std::path::PathBuf;
use std::process::Command;

use crate::error::AnprError;
use crate::ocr::{ OcrConfig, TextRecognizer, TextToken };

/// tsv row level of a single word
const WORD_LEVEL: &str = "5";

/// Text recognizer backed by the `tesseract` executable.
///
/// Every call writes the raster to its own temporary png, so one instance can serve
/// any number of threads.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    lang: String,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TesseractCli {

    pub fn new(binary: impl Into<PathBuf>, lang: &str) -> Self {
        Self { binary: binary.into(), lang: lang.to_string() }
    }
}

impl TextRecognizer for TesseractCli {

    fn recognize(&self, img: &DynamicImage, config: &OcrConfig) -> Result<Vec<TextToken>, AnprError> {
        let fail = |message: String| AnprError::recognition(config.mode, message);

        let tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| fail(format!("cannot create temp file: {}", e)))?;
        img.save_with_format(tmp.path(), ImageFormat::Png)
            .map_err(|e| fail(format!("cannot write temp image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(tmp.path())
            .arg("stdout")
            .arg("--psm").arg(config.mode.psm().to_string())
            .arg("-l").arg(&self.lang)
            .arg("-c").arg(format!("tessedit_char_whitelist={}", config.whitelist))
            .arg("tsv")
            .output()
            .map_err(|e| fail(format!("cannot run {}: {}", self.binary.display(), e)))?;
        if !output.status.success() {
            return Err(fail(format!("{} exited with {}: {}",
                self.binary.display(), output.status, String::from_utf8_lossy(&output.stderr).trim())));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let tokens = parse_tsv(&tsv);
        trace!("{:?} scan returned {} words", config.mode, tokens.len());
        Ok(tokens)
    }
}

/// Word rows of tesseract tsv output. Rows without text are dropped.
pub fn parse_tsv(tsv: &str) -> Vec<TextToken> {
    tsv.lines().skip(1).filter_map(|line| {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 || columns[0] != WORD_LEVEL {
            return None;
        }
        let text = columns[11].trim();
        if text.is_empty() {
            return None;
        }
        let number = |i: usize| columns[i].trim().parse::<u32>().ok();
        let bbox = [number(6)?, number(7)?, number(8)?, number(9)?];
        let confidence = columns[10].trim().parse::<f32>().ok()?;
        Some(TextToken { text: text.to_string(), confidence, bbox })
    }).collect()
}
