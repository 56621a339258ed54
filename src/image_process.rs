//! Image operations the pipeline is built from, thin wrappers over `image`, `imageproc`
//! and `palette`. Every function returns a new buffer, inputs are never modified.

use image::{ imageops::{ self, FilterType }, DynamicImage, GenericImageView, GrayImage };
use imageproc::contours::{ find_contours, BorderType, Contour };
use imageproc::distance_transform::Norm;
use imageproc::geometry::{ approximate_polygon_dp, arc_length };
use imageproc::point::Point;
use imageproc::{ contrast, edges, filter, morphology };
use palette::{ FromColor, Hsv, Srgb };
use serde::{ Deserialize, Serialize };

use crate::plate::Region;

pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// edge preserving noise suppression
pub fn denoise(gray: &GrayImage, window_size: u32, sigma_color: f32, sigma_spatial: f32) -> GrayImage {
    filter::bilateral_filter(gray, window_size, sigma_color, sigma_spatial)
}

pub fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    filter::gaussian_blur_f32(gray, sigma)
}

/// Histogram equalization stretched so the darkest level present maps to 0.
/// `contrast::equalize_histogram` leaves a dominant dark background near white.
pub fn equalize(gray: &GrayImage) -> GrayImage {
    // cumulative distribution
    let mut cdf = [0usize; 256];
    for pixel in gray.pixels() {
        cdf[pixel[0] as usize] += 1;
    }
    let mut total = 0;
    cdf.iter_mut().for_each(|v| {
        total += *v;
        *v = total;
    });
    let cdf_min = cdf.iter().copied().find(|v| *v != 0).unwrap_or(0);
    let range = total - cdf_min;
    let mut equalized = gray.clone();
    if range == 0 {
        return equalized;
    }
    equalized.pixels_mut().for_each(|pixel| {
        let x = cdf[pixel[0] as usize] - cdf_min;
        pixel[0] = ((x as f32 / range as f32) * 255.0).round() as u8;
    });
    equalized
}

pub fn edges(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    edges::canny(gray, low, high)
}

/// square kernel of side 2 * radius + 1
pub fn dilate(binary: &GrayImage, radius: u8) -> GrayImage {
    morphology::dilate(binary, Norm::LInf, radius)
}

pub fn open(binary: &GrayImage, radius: u8) -> GrayImage {
    morphology::open(binary, Norm::LInf, radius)
}

pub fn close(binary: &GrayImage, radius: u8) -> GrayImage {
    morphology::close(binary, Norm::LInf, radius)
}

/// local mean threshold over a (2 * radius + 1) square block
pub fn adaptive_threshold(gray: &GrayImage, block_radius: u32) -> GrayImage {
    contrast::adaptive_threshold(gray, block_radius)
}

/// pixels brighter than `level` become white
pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    contrast::threshold(gray, level)
}

pub fn otsu_threshold(gray: &GrayImage) -> GrayImage {
    contrast::threshold(gray, contrast::otsu_level(gray))
}

pub fn invert(gray: &GrayImage) -> GrayImage {
    let mut inverted = gray.clone();
    imageops::invert(&mut inverted);
    inverted
}

/// Closed outline traced around a connected foreground blob.
#[derive(Debug, Clone)]
pub struct Outline {
    /// position in the full contour list of the raster
    pub index: usize,
    /// index of the enclosing outline
    pub parent: Option<usize>,
    /// inner border of a blob rather than its outside
    pub hole: bool,
    pub points: Vec<Point<i32>>,
    /// enclosed polygon area
    pub area: f64,
}

impl Outline {

    fn new(index: usize, contour: Contour<i32>) -> Self {
        let area = polygon_area(&contour.points);
        Self {
            index,
            parent: contour.parent,
            hole: contour.border_type == BorderType::Hole,
            points: contour.points,
            area,
        }
    }

    /// inclusive bounding box of the outline points
    pub fn bounding_box(&self, bounds: (u32, u32)) -> Option<Region> {
        let first = self.points.first()?;
        let (min_x, min_y, max_x, max_y) = self.points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(min_x, min_y, max_x, max_y), p| (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y)),
        );
        if min_x < 0 || min_y < 0 {
            return None;
        }
        Region::within(min_x as u32, min_y as u32, (max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32, bounds)
    }

    /// vertices left after Douglas-Peucker with epsilon = `epsilon_ratio` * perimeter
    pub fn approx_vertices(&self, epsilon_ratio: f64) -> usize {
        let perimeter = arc_length(&self.points, true);
        approximate_polygon_dp(&self.points, epsilon_ratio * perimeter, true).len()
    }
}

/// Outlines of the non zero blobs of `binary`. With `external_only`, outlines nested
/// inside another blob are dropped.
pub fn find_outlines(binary: &GrayImage, external_only: bool) -> Vec<Outline> {
    find_contours::<i32>(binary).into_iter().enumerate().filter(|(_, contour)| {
        !external_only || (contour.border_type == BorderType::Outer && contour.parent.is_none())
    }).map(|(index, contour)| Outline::new(index, contour)).collect()
}

/// shoelace area of a closed polygon
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice = points.iter().zip(points.iter().cycle().skip(1)).fold(0i64, |acc, (a, b)| {
        acc + a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
    });
    (twice as f64 / 2.0).abs()
}

pub fn crop(img: &DynamicImage, region: &Region) -> DynamicImage {
    img.crop_imm(region.x, region.y, region.width, region.height)
}

/// vertical strip holding the left `fraction` of the width, at least one pixel wide
pub fn left_part(img: &DynamicImage, fraction: f32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let strip = ((width as f32 * fraction) as u32).max(1).min(width);
    img.crop_imm(0, 0, strip, height)
}

/// everything right of the left `fraction` of the width, at least one pixel wide
pub fn right_part(img: &DynamicImage, fraction: f32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let skip = ((width as f32 * fraction) as u32).min(width.saturating_sub(1));
    img.crop_imm(skip, 0, width - skip, height)
}

/// uniform rescale, bicubic
pub fn scale(img: &DynamicImage, factor: f32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let new_width = ((width as f32 * factor).round() as u32).max(1);
    let new_height = ((height as f32 * factor).round() as u32).max(1);
    img.resize_exact(new_width, new_height, FilterType::CatmullRom)
}

/// Inclusive HSV box. Hue in degrees [0, 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub hue: (f32, f32),
    pub saturation: (f32, f32),
    pub value: (f32, f32),
}

impl HsvRange {

    pub fn contains(&self, hsv: &Hsv) -> bool {
        let hue = hsv.hue.into_positive_degrees();
        (self.hue.0..=self.hue.1).contains(&hue)
            && (self.saturation.0..=self.saturation.1).contains(&hsv.saturation)
            && (self.value.0..=self.value.1).contains(&hsv.value)
    }
}

/// share of pixels whose colour falls inside `range`
pub fn color_fraction(img: &DynamicImage, range: &HsvRange) -> f32 {
    let rgb = img.to_rgb8();
    let total = rgb.width() as usize * rgb.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let inside = rgb.pixels().filter(|pixel| {
        let [r, g, b] = pixel.0;
        let hsv: Hsv = Hsv::from_color(Srgb::new(r, g, b).into_format::<f32>());
        range.contains(&hsv)
    }).count();
    inside as f32 / total as f32
}


#[cfg(test)]
mod test {

    use image::{ ImageBuffer, Luma, Rgb, RgbImage };
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    use super::*;

    const BLUE: HsvRange = HsvRange { hue: (200.0, 260.0), saturation: (0.196, 1.0), value: (0.196, 1.0) };

    #[test]
    fn shoelace_area_of_square() {
        let square = vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn outline_of_filled_rectangle() {
        let mut img: GrayImage = ImageBuffer::from_pixel(100, 60, Luma([0u8]));
        draw_filled_rect_mut(&mut img, Rect::at(10, 20).of_size(40, 10), Luma([255u8]));
        let outlines = find_outlines(&img, true);
        assert_eq!(outlines.len(), 1);
        let region = outlines[0].bounding_box((100, 60)).unwrap();
        assert_eq!(region.to_array(), [10, 20, 40, 10]);
        assert!(outlines[0].area > 300.0);
    }

    #[test]
    fn nested_outlines_need_full_retrieval() {
        let mut img: GrayImage = ImageBuffer::from_pixel(100, 100, Luma([0u8]));
        draw_filled_rect_mut(&mut img, Rect::at(10, 10).of_size(80, 80), Luma([255u8]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(60, 60), Luma([0u8]));
        draw_filled_rect_mut(&mut img, Rect::at(40, 40).of_size(20, 10), Luma([255u8]));
        let external = find_outlines(&img, true);
        let all = find_outlines(&img, false);
        assert_eq!(external.len(), 1);
        assert!(all.len() > external.len());
        let hole = all.iter().find(|outline| outline.hole).unwrap();
        assert_eq!(hole.parent, Some(external[0].index));
    }

    #[test]
    fn parts_never_collapse() {
        let img = DynamicImage::new_rgb8(3, 2);
        assert_eq!(left_part(&img, 0.1).dimensions(), (1, 2));
        assert_eq!(right_part(&img, 1.0).dimensions(), (1, 2));
        assert_eq!(right_part(&img, 0.34).dimensions(), (2, 2));
    }

    #[test]
    fn blue_fraction() {
        let mut img: RgbImage = ImageBuffer::from_pixel(10, 10, Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size(10, 3), Rgb([0, 51, 153]));
        let fraction = color_fraction(&DynamicImage::ImageRgb8(img), &BLUE);
        assert!((fraction - 0.3).abs() < 1e-6);
    }

    #[test]
    fn equalize_stretches_dominant_background() {
        let mut img: GrayImage = ImageBuffer::from_pixel(20, 20, Luma([30u8]));
        draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size(2, 2), Luma([235u8]));
        let equalized = equalize(&img);
        assert_eq!(equalized.get_pixel(10, 10)[0], 0);
        assert_eq!(equalized.get_pixel(0, 0)[0], 255);
        let flat: GrayImage = ImageBuffer::from_pixel(4, 4, Luma([90u8]));
        assert_eq!(equalize(&flat).get_pixel(1, 1)[0], 90);
    }

    #[test]
    fn otsu_splits_two_levels() {
        let mut img: GrayImage = ImageBuffer::from_pixel(20, 20, Luma([40u8]));
        draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size(10, 20), Luma([200u8]));
        let binary = otsu_threshold(&img);
        assert_eq!(binary.get_pixel(2, 2)[0], 255);
        assert_eq!(binary.get_pixel(15, 2)[0], 0);
        assert_eq!(invert(&binary).get_pixel(15, 2)[0], 255);
    }
}
