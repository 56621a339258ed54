use image::{ DynamicImage, GenericImageView };
use serde::{ Deserialize, Serialize };
use tracing::debug;

use crate::image_process::{ self, Outline };
use crate::plate::Candidate;
use crate::utils::StageHook;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// bilateral filter window, in pixels
    pub denoise_window: u32,
    pub sigma_color: f32,
    pub sigma_spatial: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub dilate_radius: u8,
    /// only outermost contours, nested ones are dropped
    pub external_only: bool,
    /// how many of the largest contours are measured
    pub max_contours: usize,
    /// contour area over image area, exclusive bounds
    pub area_fraction: (f32, f32),
    /// bounding box width over height, exclusive bounds
    pub aspect_ratio: (f32, f32),
    /// accepted vertex count of the approximated polygon, inclusive. None skips the check.
    pub polygon_vertices: Option<(usize, usize)>,
    pub polygon_epsilon: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            denoise_window: 11,
            sigma_color: 17.0,
            sigma_spatial: 17.0,
            canny_low: 30.0,
            canny_high: 200.0,
            dilate_radius: 1,
            external_only: false,
            max_contours: 20,
            area_fraction: (0.01, 0.10),
            aspect_ratio: (3.0, 6.0),
            polygon_vertices: None,
            polygon_epsilon: 0.02,
        }
    }
}

/// Finds plate shaped regions by their outline.
pub struct RegionDetector<'a> {
    config: &'a DetectorConfig,
    hook: &'a dyn StageHook,
}

impl<'a> RegionDetector<'a> {

    pub fn new(config: &'a DetectorConfig, hook: &'a dyn StageHook) -> Self {
        Self { config, hook }
    }

    /// Candidates ordered by contour area, largest first.
    pub fn detect(&self, img: &DynamicImage) -> Vec<Candidate> {
        let config = self.config;
        let bounds = img.dimensions();
        let image_area = bounds.0 as f64 * bounds.1 as f64;
        if image_area == 0.0 {
            return Vec::new();
        }

        let gray = image_process::grayscale(img);
        let gray = image_process::denoise(&gray, config.denoise_window, config.sigma_color, config.sigma_spatial);
        let gray = image_process::equalize(&gray);
        let edged = image_process::edges(&gray, config.canny_low, config.canny_high);
        let edged = image_process::dilate(&edged, config.dilate_radius);
        self.hook.inspect("edges", &DynamicImage::ImageLuma8(edged.clone()));

        let mut outlines = image_process::find_outlines(&edged, config.external_only);
        outlines.sort_by(|a, b| b.area.partial_cmp(&a.area).unwrap_or(std::cmp::Ordering::Equal));
        outlines.truncate(config.max_contours);
        debug!("measuring {} largest outlines", outlines.len());

        // the hole of an admitted ring outlines the same plate
        let mut admitted: Vec<usize> = Vec::new();
        let mut candidates = Vec::new();
        for outline in &outlines {
            if outline.hole && outline.parent.map_or(false, |parent| admitted.contains(&parent)) {
                continue;
            }
            if let Some(candidate) = self.admit(outline, bounds, image_area) {
                admitted.push(outline.index);
                candidates.push(candidate);
            }
        }
        candidates
    }

    fn admit(&self, outline: &Outline, bounds: (u32, u32), image_area: f64) -> Option<Candidate> {
        let config = self.config;
        let area_fraction = (outline.area / image_area) as f32;
        if !(config.area_fraction.0 < area_fraction && area_fraction < config.area_fraction.1) {
            return None;
        }
        let region = outline.bounding_box(bounds)?;
        let aspect_ratio = region.aspect_ratio();
        if !(config.aspect_ratio.0 < aspect_ratio && aspect_ratio < config.aspect_ratio.1) {
            return None;
        }
        if let Some((min, max)) = config.polygon_vertices {
            let vertices = outline.approx_vertices(config.polygon_epsilon);
            if vertices < min || vertices > max {
                return None;
            }
        }
        debug!("candidate {:?}, area {:.3}, aspect {:.2}", region, area_fraction, aspect_ratio);
        Some(Candidate { region, area_fraction, aspect_ratio })
    }
}
