use serde::{ Deserialize, Serialize };

use std::collections::BTreeMap;
use std::fmt;

use crate::ocr::ScanMode;

/// Axis aligned box inside a source image, in pixels.
///
/// Regions handed out by the pipeline are built through [`Region::within`], so their
/// width and height are non zero and the box never leaves the image it was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {

    /// box inside an image of `bounds` (width, height), None when degenerate or out of bounds
    pub fn within(x: u32, y: u32, width: u32, height: u32, bounds: (u32, u32)) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let right = x.checked_add(width)?;
        let bottom = y.checked_add(height)?;
        if right > bounds.0 || bottom > bounds.1 {
            return None;
        }
        Some(Self { x, y, width, height })
    }

    /// the whole image as one region
    pub fn full(bounds: (u32, u32)) -> Option<Self> {
        Self::within(0, 0, bounds.0, bounds.1, bounds)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// x, y, width, height
    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// A region admitted by the detector together with the measurements that admitted it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub region: Region,
    /// contour area over image area
    pub area_fraction: f32,
    pub aspect_ratio: f32,
}

/// Issuing region read from the identifier band on the left of a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssuingRegion {
    /// band found and the national code confirmed
    #[serde(rename = "GB")]
    Gb,
    /// band found, nation unconfirmed
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl IssuingRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuingRegion::Gb => "GB",
            IssuingRegion::Eu => "EU",
            IssuingRegion::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for IssuingRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateResult {
    /// canonical "LLDD LLL" text
    pub plate_number: String,
    pub country_identifier: IssuingRegion,
    /// confidence of the hypothesis the plate was read from, 0 to 100
    pub confidence: f32,
    /// scan mode of that hypothesis
    pub mode: ScanMode,
    pub region: Region,
}

/// Accepted plates keyed by candidate index. Candidate indexes follow detection
/// order, so iterating the map yields plates in detection order.
pub type PlateResults = BTreeMap<usize, PlateResult>;


#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn region_rejects_degenerate_boxes() {
        assert!(Region::within(0, 0, 0, 10, (100, 100)).is_none());
        assert!(Region::within(0, 0, 10, 0, (100, 100)).is_none());
        assert!(Region::within(95, 0, 10, 10, (100, 100)).is_none());
        assert!(Region::within(0, 91, 10, 10, (100, 100)).is_none());
        assert!(Region::within(u32::MAX, 0, 10, 10, (100, 100)).is_none());
        let region = Region::within(90, 90, 10, 10, (100, 100)).unwrap();
        assert_eq!(region.to_array(), [90, 90, 10, 10]);
        assert_eq!(region.area(), 100);
    }

    #[test]
    fn full_region_of_empty_image_is_none() {
        assert!(Region::full((0, 0)).is_none());
        assert_eq!(Region::full((40, 10)).unwrap().aspect_ratio(), 4.0);
    }

    #[test]
    fn issuing_region_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&IssuingRegion::Gb).unwrap(), "\"GB\"");
        assert_eq!(IssuingRegion::Unknown.to_string(), "UNKNOWN");
    }
}
