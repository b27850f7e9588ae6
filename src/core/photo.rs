//! Photo-level checks on a decoded leaflet photo.
//!
//! Resolution and sharpness (variance of the Laplacian) describe whether the
//! photo is usable at all. EXIF metadata describes whether it looks like a
//! fresh camera shot: a missing capture time or a rotated orientation is not
//! proof of fraud, so those only ask for a human look.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// EXIF orientations that mean the camera was rotated (180, 90 CW, 90 CCW).
const SUSPECT_ORIENTATIONS: [u32; 3] = [3, 6, 8];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoPolicy {
    pub min_width: u32,
    pub min_height: u32,
    /// Minimum variance of the Laplacian of the grayscale photo.
    pub min_sharpness: f64,
    /// Flag photos without an EXIF capture time.
    pub require_exif: bool,
}

impl Default for PhotoPolicy {
    fn default() -> Self {
        Self {
            min_width: 1024,
            min_height: 768,
            min_sharpness: 80.0,
            require_exif: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifSummary {
    /// `DateTimeOriginal` or `DateTime` is present.
    pub has_datetime: bool,
    pub orientation: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoInspection {
    pub width: u32,
    pub height: u32,
    pub sharpness: f64,
    pub exif: Option<ExifSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "kebab-case")]
pub enum PhotoIssue {
    LowResolution { width: u32, height: u32 },
    Blurry { sharpness: f64 },
    ExifMissing,
    OrientationSuspect { orientation: u32 },
}

impl fmt::Display for PhotoIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoIssue::LowResolution { width, height } => {
                write!(f, "low resolution {width}x{height}")
            }
            PhotoIssue::Blurry { sharpness } => write!(f, "blurry (sharpness {sharpness:.1})"),
            PhotoIssue::ExifMissing => f.write_str("no EXIF capture time"),
            PhotoIssue::OrientationSuspect { orientation } => {
                write!(f, "rotated shot (EXIF orientation {orientation})")
            }
        }
    }
}

impl PhotoInspection {
    /// Problems that make the photo unusable as proof of purchase.
    pub fn quality_issues(&self, policy: &PhotoPolicy) -> Vec<PhotoIssue> {
        let mut issues = Vec::new();
        if self.width < policy.min_width || self.height < policy.min_height {
            issues.push(PhotoIssue::LowResolution {
                width: self.width,
                height: self.height,
            });
        }
        if self.sharpness < policy.min_sharpness {
            issues.push(PhotoIssue::Blurry {
                sharpness: self.sharpness,
            });
        }
        issues
    }

    /// Metadata anomalies that warrant manual review.
    pub fn metadata_issues(&self, policy: &PhotoPolicy) -> Vec<PhotoIssue> {
        let mut issues = Vec::new();
        let has_datetime = self.exif.is_some_and(|exif| exif.has_datetime);
        if policy.require_exif && !has_datetime {
            issues.push(PhotoIssue::ExifMissing);
        }
        if let Some(orientation) = self.exif.and_then(|exif| exif.orientation) {
            if SUSPECT_ORIENTATIONS.contains(&orientation) {
                issues.push(PhotoIssue::OrientationSuspect { orientation });
            }
        }
        issues
    }
}

/// Measure a decoded photo. `photo_bytes` is the original container, read
/// again for its EXIF block.
pub fn inspect_image(img: &DynamicImage, photo_bytes: &[u8]) -> PhotoInspection {
    PhotoInspection {
        width: img.width(),
        height: img.height(),
        sharpness: laplacian_variance(&img.to_luma8()),
        exif: read_exif(photo_bytes),
    }
}

/// Variance of the 4-neighbour Laplacian over the interior pixels.
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| f64::from(image.get_pixel(x, y)[0]);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let laplacian = px(x, y - 1) + px(x - 1, y) + px(x + 1, y) + px(x, y + 1)
                - 4.0 * px(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1.0;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// `None` when the container carries no readable EXIF block.
pub fn read_exif(photo_bytes: &[u8]) -> Option<ExifSummary> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(photo_bytes))
        .ok()?;

    let has_datetime = exif
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .or_else(|| exif.get_field(exif::Tag::DateTime, exif::In::PRIMARY))
        .is_some();
    let orientation = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0));

    Some(ExifSummary {
        has_datetime,
        orientation,
    })
}
