#[cfg(feature = "display-window")]
use imageproc::window;

use image::{ DynamicImage, GenericImageView, Rgb, RgbImage };
use imageproc::{ drawing, rect };
use rusttype::{ Font, Scale };
use tracing::trace;

use crate::plate::PlateResults;

/// Observer called with the intermediate raster of a pipeline stage. Hooks only look,
/// nothing they do changes the result.
pub trait StageHook: Send + Sync {
    fn inspect(&self, stage: &str, img: &DynamicImage);
}

pub struct NoopHook;

impl StageHook for NoopHook {
    fn inspect(&self, _stage: &str, _img: &DynamicImage) {}
}

/// logs the stage name and raster size at trace level
pub struct TracingHook;

impl StageHook for TracingHook {
    fn inspect(&self, stage: &str, img: &DynamicImage) {
        let (width, height) = img.dimensions();
        trace!(stage, width, height, "stage output");
    }
}

/// Pops up a window per stage, blocking until it is closed.
#[cfg(feature = "display-window")]
pub struct WindowHook {
    pub max_width: u32,
    pub max_height: u32,
}

#[cfg(feature = "display-window")]
impl StageHook for WindowHook {
    fn inspect(&self, stage: &str, img: &DynamicImage) {
        window::display_image(stage, &img.to_rgba8(), self.max_width, self.max_height);
    }
}

/// Installs the fmt subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Copy of `img` with a box around every accepted plate, labelled with its text and
/// issuing region when a font is given.
pub fn annotate(img: &DynamicImage, results: &PlateResults, font: Option<&Font>) -> RgbImage {
    let mut annotated = img.to_rgb8();
    let color = Rgb([0, 255, 0]);
    for result in results.values() {
        let [x, y, width, height] = result.region.to_array();
        let rect = rect::Rect::at(x as i32, y as i32).of_size(width, height);
        drawing::draw_hollow_rect_mut(&mut annotated, rect, color);
        if let Some(font) = font {
            let text = format!("{} ({})", result.plate_number, result.country_identifier);
            let scale = Scale::uniform(24.0);
            let text_y = (y as i32 - 26).max(0);
            drawing::draw_text_mut(&mut annotated, color, x as i32, text_y, scale, font, &text);
        }
    }
    annotated
}
