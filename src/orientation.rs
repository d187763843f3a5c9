// Fixed orientation corrections, keyed by EXIF/TIFF orientation code.
// Compensates for how the camera sensor is mounted relative to the display.

use image::imageops;
use image::{GrayImage, ImageBuffer, Pixel, RgbaImage};
use serde::Deserialize;

use crate::error::Error;

/// EXIF orientation, describing where row 0 / column 0 of the stored image sit.
///
/// Applying an orientation turns the stored image into an upright one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Orientation {
    #[default]
    Identity = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    pub fn from_exif(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Identity,
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => return None,
        })
    }

    pub fn exif(self) -> u8 {
        self as u8
    }

    /// True when the correction swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270)
    }

    pub fn oriented_size(self, width: usize, height: usize) -> (usize, usize) {
        if self.swaps_axes() { (height, width) } else { (width, height) }
    }

    pub fn apply(self, img: &RgbaImage) -> RgbaImage {
        orient(self, img)
    }

    pub fn apply_gray(self, img: &GrayImage) -> GrayImage {
        orient(self, img)
    }

    /// Map a point of the oriented image back to the stored image.
    ///
    /// Coordinates are continuous (pixel edges), top-left origin; `src_w` and
    /// `src_h` are the stored image's dimensions.
    pub fn map_point_to_source(self, x: f32, y: f32, src_w: f32, src_h: f32) -> (f32, f32) {
        match self {
            Self::Identity => (x, y),
            Self::MirrorHorizontal => (src_w - x, y),
            Self::Rotate180 => (src_w - x, src_h - y),
            Self::MirrorVertical => (x, src_h - y),
            Self::Transpose => (y, x),
            Self::Rotate90 => (y, src_h - x),
            Self::Transverse => (src_w - y, src_h - x),
            Self::Rotate270 => (src_w - y, x),
        }
    }

    /// Map an axis-aligned rectangle `(x, y, w, h)` of the oriented image back
    /// to the stored image.
    pub fn map_rect_to_source(self, rect: (f32, f32, f32, f32), src_w: f32, src_h: f32) -> (f32, f32, f32, f32) {
        let (x, y, w, h) = rect;
        let (ax, ay) = self.map_point_to_source(x, y, src_w, src_h);
        let (bx, by) = self.map_point_to_source(x + w, y + h, src_w, src_h);
        (ax.min(bx), ay.min(by), (ax - bx).abs(), (ay - by).abs())
    }
}

impl TryFrom<u8> for Orientation {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_exif(code)
            .ok_or_else(|| Error::Config(format!("orientation code {code} is not in 1..=8")))
    }
}

fn orient<P>(o: Orientation, img: &ImageBuffer<P, Vec<P::Subpixel>>) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    match o {
        Orientation::Identity => img.clone(),
        Orientation::MirrorHorizontal => imageops::flip_horizontal(img),
        Orientation::Rotate180 => imageops::rotate180(img),
        Orientation::MirrorVertical => imageops::flip_vertical(img),
        Orientation::Transpose => imageops::flip_horizontal(&imageops::rotate90(img)),
        Orientation::Rotate90 => imageops::rotate90(img),
        Orientation::Transverse => imageops::flip_horizontal(&imageops::rotate270(img)),
        Orientation::Rotate270 => imageops::rotate270(img),
    }
}
