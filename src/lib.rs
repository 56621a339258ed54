use image::{ DynamicImage, GenericImageView };
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{ debug, info, warn };

use std::path::Path;

pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod image_process;
pub mod normalize;
pub mod ocr;
pub mod plate;
pub mod region_id;
pub mod tesseract;
pub mod utils;

pub use config::AnprConfig;
pub use error::{ AnprError, AnprErrorKind };
pub use ocr::{ OcrConfig, RecognitionHypothesis, ScanMode, TextRecognizer, TextToken };
pub use plate::{ Candidate, IssuingRegion, PlateResult, PlateResults, Region };
pub use tesseract::TesseractCli;

use detect::RegionDetector;
use normalize::{ is_plate, PlateNormalizer };
use ocr::{ select_best, OcrAggregator };
use region_id::RegionIdentifier;
use utils::{ NoopHook, StageHook };

/// Plate recognizer. Finds plate shaped regions, reads them and normalizes the text.
///
/// Holds no per image state, a single instance can process images from many threads.
pub struct Anpr<R> {
    config: AnprConfig,
    recognizer: R,
    normalizer: PlateNormalizer,
    hook: Box<dyn StageHook>,
}

impl<R: TextRecognizer> Anpr<R> {

    pub fn new(recognizer: R, config: AnprConfig) -> Result<Self, AnprError> {
        config.validate()?;
        let normalizer = PlateNormalizer::new(config.normalizer.clone());
        Ok(Anpr { config, recognizer, normalizer, hook: Box::new(NoopHook) })
    }

    /// observer for intermediate rasters
    pub fn with_hook(mut self, hook: impl StageHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn config(&self) -> &AnprConfig {
        &self.config
    }

    pub fn process_path(&self, path: impl AsRef<Path>) -> Result<PlateResults, AnprError> {
        let img = image::open(path)?;
        self.process_image(&img)
    }

    pub fn process_bytes(&self, bytes: &[u8]) -> Result<PlateResults, AnprError> {
        let img = image::load_from_memory(bytes)?;
        self.process_image(&img)
    }

    /// Recognizes every plate in one image.
    ///
    /// Failures while reading one candidate only drop that candidate. The only error is
    /// an image without pixels, an image in which nothing is found gives an empty map.
    pub fn process_image(&self, img: &DynamicImage) -> Result<PlateResults, AnprError> {
        let (width, height) = img.dimensions();
        let full = Region::full((width, height))
            .ok_or(AnprErrorKind::EmptyImage { width, height })?;
        self.hook.inspect("input", img);

        let aspect_ratio = full.aspect_ratio();
        let (low, high) = self.config.whole_plate_aspect;
        let candidates = if low < aspect_ratio && aspect_ratio < high {
            debug!("image is plate shaped ({:.2}), reading it whole", aspect_ratio);
            vec![Candidate { region: full, area_fraction: 1.0, aspect_ratio }]
        } else {
            RegionDetector::new(&self.config.detector, self.hook.as_ref()).detect(img)
        };

        if candidates.is_empty() {
            debug!("no candidate regions, reading whole image");
            let mut results = PlateResults::new();
            if let Some(result) = self.read_whole_image(img, full) {
                info!("read {} ({}) from whole image", result.plate_number, result.country_identifier);
                results.insert(0, result);
            }
            return Ok(results);
        }

        debug!("{} candidate regions", candidates.len());
        Ok(self.read_candidates(img, &candidates))
    }

    #[cfg(not(feature = "parallel"))]
    fn read_candidates(&self, img: &DynamicImage, candidates: &[Candidate]) -> PlateResults {
        candidates.iter().enumerate()
            .filter_map(|(index, candidate)| self.read_candidate_logged(img, index, candidate))
            .collect()
    }

    /// candidates fan out over the rayon pool, results keep candidate order
    #[cfg(feature = "parallel")]
    fn read_candidates(&self, img: &DynamicImage, candidates: &[Candidate]) -> PlateResults {
        let read: Vec<Option<(usize, PlateResult)>> = candidates.par_iter().enumerate()
            .map(|(index, candidate)| self.read_candidate_logged(img, index, candidate))
            .collect();
        read.into_iter().flatten().collect()
    }

    fn read_candidate_logged(&self, img: &DynamicImage, index: usize, candidate: &Candidate) -> Option<(usize, PlateResult)> {
        match self.read_candidate(img, candidate) {
            Ok(Some(result)) => {
                info!("candidate {}: read {} ({})", index, result.plate_number, result.country_identifier);
                Some((index, result))
            },
            Ok(None) => {
                debug!("candidate {}: no plate text", index);
                None
            },
            Err(e) => {
                warn!("candidate {} skipped: {}", index, e);
                None
            },
        }
    }

    /// Extract, read, normalize and identify one candidate.
    pub fn read_candidate(&self, img: &DynamicImage, candidate: &Candidate) -> Result<Option<PlateResult>, AnprError> {
        let plate = extract::extract(img, &candidate.region, &self.config.extractor)?;
        self.hook.inspect("plate", &plate);

        let prepared = self.prepare_plate_text(&plate);
        self.hook.inspect("plate text", &prepared);
        let hypotheses = self.aggregator().recognize(&prepared, &self.config.ocr.configs);
        let (plate_number, best) = match self.best_plate(&hypotheses) {
            Some(found) => found,
            None => return Ok(None),
        };

        let country_identifier = self.identifier().identify(&plate);
        Ok(Some(PlateResult {
            plate_number,
            country_identifier,
            confidence: best.confidence,
            mode: best.mode,
            region: candidate.region,
        }))
    }

    /// binarized plate without the identifier band, dark text on white
    fn prepare_plate_text(&self, plate: &DynamicImage) -> DynamicImage {
        let settings = &self.config.plate_text;
        let gray = image_process::grayscale(plate);
        let gray = match settings.blur_sigma {
            Some(sigma) => image_process::blur(&gray, sigma),
            None => gray,
        };
        let binary = image_process::adaptive_threshold(&gray, settings.threshold_radius);
        let text_part = image_process::right_part(&DynamicImage::ImageLuma8(binary), settings.skip_left);
        // opening works on white text, specks smaller than the kernel go
        let text = image_process::invert(&text_part.to_luma8());
        let text = image_process::open(&text, settings.open_radius);
        DynamicImage::ImageLuma8(image_process::invert(&text))
    }

    /// Reads the whole image when no region qualified: adaptive threshold over everything,
    /// then Otsu over the part right of the identifier band, then the loose character run
    /// guess over everything read so far. A loose guess carries the confidence of the
    /// reading it came from.
    fn read_whole_image(&self, img: &DynamicImage, full: Region) -> Option<PlateResult> {
        let settings = &self.config.fallback;
        if !settings.enabled {
            return None;
        }
        let aggregator = self.aggregator();
        let gray = image_process::grayscale(img);

        let binary = DynamicImage::ImageLuma8(image_process::adaptive_threshold(&gray, settings.threshold_radius));
        self.hook.inspect("whole image", &binary);
        let mut hypotheses = aggregator.recognize(&binary, &self.config.ocr.configs);
        let mut found = self.best_plate(&hypotheses).map(|(text, best)| (text, best.confidence, best.mode));

        if found.is_none() {
            let right = image_process::grayscale(&image_process::right_part(img, settings.skip_left));
            let binary = DynamicImage::ImageLuma8(image_process::otsu_threshold(&right));
            self.hook.inspect("whole image text part", &binary);
            hypotheses.extend(aggregator.recognize(&binary, std::slice::from_ref(&settings.second_pass)));
            found = self.best_plate(&hypotheses).map(|(text, best)| (text, best.confidence, best.mode));
        }

        if found.is_none() && settings.loose_guess {
            found = self.normalizer.loose_guess(hypotheses.iter().map(|h| h.text.as_str()))
                .map(|(index, text)| (text, hypotheses[index].confidence, hypotheses[index].mode));
        }

        let (plate_number, confidence, mode) = found?;
        Some(PlateResult {
            plate_number,
            country_identifier: self.identifier().identify(img),
            confidence,
            mode,
            region: full,
        })
    }

    /// most confident hypothesis whose text normalizes to a plate
    fn best_plate<'h>(&self, hypotheses: &'h [RecognitionHypothesis]) -> Option<(String, &'h RecognitionHypothesis)> {
        let accepted: Vec<&RecognitionHypothesis> = hypotheses.iter()
            .filter(|h| is_plate(&self.normalizer.normalize(&h.text)))
            .collect();
        let best = select_best(accepted.iter().copied())?;
        Some((self.normalizer.normalize(&best.text), best))
    }

    fn aggregator(&self) -> OcrAggregator<'_, R> {
        OcrAggregator::new(&self.recognizer, self.config.ocr.min_confidence)
    }

    fn identifier(&self) -> RegionIdentifier<'_, R> {
        RegionIdentifier::new(&self.config.region_id, &self.recognizer, self.hook.as_ref())
    }
}


#[cfg(test)]
mod test {

    use image::{ DynamicImage, ImageBuffer, Rgb, RgbImage };
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    use std::error::Error;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::ocr::test::StubRecognizer;

    /// dark street scene with one light plate of 135x30 at (100, 120)
    fn street() -> DynamicImage {
        let mut img: RgbImage = ImageBuffer::from_pixel(400, 300, Rgb([30, 30, 30]));
        draw_filled_rect_mut(&mut img, Rect::at(100, 120).of_size(135, 30), Rgb([235, 235, 235]));
        DynamicImage::ImageRgb8(img)
    }

    fn anpr(stub: StubRecognizer) -> Anpr<StubRecognizer> {
        Anpr::new(stub, AnprConfig::default()).unwrap()
    }

    #[test]
    fn reads_plate_from_candidate() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default()
            .with(ScanMode::SingleLine, &[("AB12CDE", 80.0)])
            .with(ScanMode::SingleWord, &[("A812CDE", 60.0)]);
        let results = anpr(stub).process_image(&street())?;
        let (index, first) = results.iter().next().ok_or("no plate")?;
        assert_eq!(*index, 0);
        assert_eq!(first.plate_number, "AB12 CDE");
        assert_eq!(first.confidence, 80.0);
        assert_eq!(first.mode, ScanMode::SingleLine);
        assert_eq!(first.country_identifier, IssuingRegion::Unknown);
        Ok(())
    }

    #[test]
    fn malformed_high_confidence_token_does_not_win() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default()
            .with(ScanMode::SingleLine, &[("GARBAGE TEXT", 99.0)])
            .with(ScanMode::RawLine, &[("XY34ZZZ", 41.0)]);
        let results = anpr(stub).process_image(&street())?;
        let first = results.values().next().ok_or("no plate")?;
        assert_eq!(first.plate_number, "XY34 ZZZ");
        assert_eq!(first.mode, ScanMode::RawLine);
        Ok(())
    }

    #[test]
    fn unreadable_candidates_give_empty_map() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default().with(ScanMode::SingleLine, &[("HELLO", 90.0)]);
        assert!(anpr(stub).process_image(&street())?.is_empty());
        Ok(())
    }

    #[test]
    fn plate_shaped_image_is_read_whole() -> Result<(), Box<dyn Error>> {
        let mut img: RgbImage = ImageBuffer::from_pixel(450, 100, Rgb([250, 210, 20]));
        draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size(81, 100), Rgb([0, 51, 153]));
        let stub = StubRecognizer::default().with(ScanMode::SingleBlock, &[("AB1OCDE", 70.0)]);
        let results = anpr(stub).process_image(&DynamicImage::ImageRgb8(img))?;
        assert_eq!(results.len(), 1);
        let result = &results[&0];
        assert_eq!(result.plate_number, "AB10 CDE");
        assert_eq!(result.region.to_array(), [0, 0, 450, 100]);
        assert_eq!(result.country_identifier, IssuingRegion::Eu);
        Ok(())
    }

    #[test]
    fn no_candidates_falls_back_to_whole_image() -> Result<(), Box<dyn Error>> {
        let blank = DynamicImage::new_rgb8(300, 300);

        let stub = StubRecognizer::default();
        let recognizer = anpr(stub);
        assert!(recognizer.process_image(&blank)?.is_empty());
        // four configured modes, the second pass and no identifier reads
        assert_eq!(recognizer.recognizer.calls.load(Ordering::SeqCst), 5);

        let stub = StubRecognizer::default().with(ScanMode::SparseText, &[("ZZ", 90.0), ("zz 1234567 8", 45.0)]);
        let config = AnprConfig::default().with_ocr_configs(vec![OcrConfig::alphanumeric(ScanMode::SparseText)]);
        let results = Anpr::new(stub, config)?.process_image(&blank)?;
        let result = results.get(&0).ok_or("no fallback plate")?;
        assert_eq!(result.plate_number, "1234 567");
        assert_eq!(result.confidence, 45.0);
        assert_eq!(result.mode, ScanMode::SparseText);
        assert_eq!(result.region.to_array(), [0, 0, 300, 300]);
        Ok(())
    }

    #[test]
    fn repeated_partial_read_is_not_a_plate() -> Result<(), Box<dyn Error>> {
        // read once by the first pass and again by the second pass
        let stub = StubRecognizer::default().with(ScanMode::SingleLine, &[("AB12C", 50.0)]);
        let recognizer = anpr(stub);
        assert!(recognizer.process_image(&DynamicImage::new_rgb8(300, 300))?.is_empty());
        Ok(())
    }

    #[test]
    fn plate_text_drops_dark_specks() {
        let mut img: RgbImage = ImageBuffer::from_pixel(200, 50, Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(100, 20).of_size(2, 2), Rgb([0, 0, 0]));
        let prepared = anpr(StubRecognizer::default()).prepare_plate_text(&DynamicImage::ImageRgb8(img)).to_luma8();
        assert_eq!(prepared.dimensions(), (170, 50));
        assert_eq!(prepared.pixels().filter(|p| p[0] == 0).count(), 0);
    }

    #[test]
    fn plate_text_keeps_strokes() {
        let mut img: RgbImage = ImageBuffer::from_pixel(200, 50, Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(100, 10).of_size(6, 30), Rgb([0, 0, 0]));
        let prepared = anpr(StubRecognizer::default()).prepare_plate_text(&DynamicImage::ImageRgb8(img)).to_luma8();
        // the stroke now starts 30 pixels further left
        assert_eq!(prepared.get_pixel(72, 25)[0], 0);
        assert_eq!(prepared.get_pixel(20, 25)[0], 255);
    }

    #[test]
    fn fallback_can_be_disabled() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default().with(ScanMode::SingleLine, &[("AB12CDE", 80.0)]);
        let recognizer = Anpr::new(stub, AnprConfig::default().with_fallback(false))?;
        assert!(recognizer.process_image(&DynamicImage::new_rgb8(300, 300))?.is_empty());
        assert_eq!(recognizer.recognizer.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn failing_recognizer_never_aborts() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default()
            .failing(ScanMode::SingleLine)
            .failing(ScanMode::SingleWord)
            .with(ScanMode::SingleBlock, &[("AB12CDE", 30.0)]);
        let results = anpr(stub).process_image(&street())?;
        assert_eq!(results.values().next().ok_or("no plate")?.plate_number, "AB12 CDE");
        Ok(())
    }

    #[test]
    fn repeated_runs_agree() -> Result<(), Box<dyn Error>> {
        let stub = StubRecognizer::default().with(ScanMode::SingleLine, &[("AB12CDE", 80.0)]);
        let recognizer = anpr(stub);
        let img = street();
        assert_eq!(recognizer.process_image(&img)?, recognizer.process_image(&img)?);
        Ok(())
    }

    #[test]
    fn undecodable_bytes_are_image_load_errors() {
        let stub = StubRecognizer::default();
        let err = anpr(stub).process_bytes(&[0u8; 64]).unwrap_err();
        assert!(err.is_image_load());
    }

    #[test]
    fn empty_image_is_image_load_error() {
        let err = anpr(StubRecognizer::default()).process_image(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
        assert!(err.is_image_load());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AnprConfig::default().with_ocr_configs(Vec::new());
        assert!(Anpr::new(StubRecognizer::default(), config).is_err());

        let mut config = AnprConfig::default();
        config.plate_text.threshold_radius = 0;
        let err = Anpr::new(StubRecognizer::default(), config).err().unwrap();
        assert!(matches!(err.kind(), AnprErrorKind::Config(_)));
    }
}
