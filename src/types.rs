// Core frame types shared by capture, processing and display.

use image::{GrayImage, Luma, RgbImage, Rgba, RgbaImage};

use crate::error::Error;

/// Bytes per BGRA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// One captured frame: BGRA, 4 bytes per pixel, rows `stride` bytes apart.
///
/// `stride` may exceed `width * 4`; the padding at the end of each row is
/// never exposed through `rows()` / `rows_mut()`.
pub struct PixelBuffer {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Tightly packed, zeroed buffer.
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_row_alignment(width, height, 1)
    }

    /// Zeroed buffer whose stride is `width * 4` rounded up to `align` bytes.
    pub fn with_row_alignment(width: usize, height: usize, align: usize) -> Self {
        let stride = (width * BYTES_PER_PIXEL).next_multiple_of(align.max(1));
        Self { width, height, stride, data: vec![0u8; stride * height] }
    }

    /// Wrap raw bytes laid out as `height` rows of `stride` bytes.
    pub fn from_raw(width: usize, height: usize, stride: usize, data: Vec<u8>) -> Result<Self, Error> {
        if stride < width * BYTES_PER_PIXEL {
            return Err(Error::Buffer(format!(
                "stride {stride} shorter than a {width}-pixel row"
            )));
        }
        if data.len() < stride * height {
            return Err(Error::Buffer(format!(
                "{} bytes cannot hold {height} rows of stride {stride}",
                data.len()
            )));
        }
        Ok(Self { width, height, stride, data })
    }

    /// Convert a decoded camera image; alpha is opaque, padding is zeroed.
    pub fn from_rgb_image(img: &RgbImage, align: usize) -> Self {
        let (w, h) = img.dimensions();
        let mut buf = Self::with_row_alignment(w as usize, h as usize, align);
        for (row, src) in buf.rows_mut().zip(img.rows()) {
            for (px, rgb) in row.chunks_exact_mut(BYTES_PER_PIXEL).zip(src) {
                px.copy_from_slice(&[rgb[2], rgb[1], rgb[0], 0xFF]);
            }
        }
        buf
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whole backing store, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Visible bytes of each row (`width * 4` long).
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let visible = self.width * BYTES_PER_PIXEL;
        self.data
            .chunks(self.stride.max(1))
            .take(self.height)
            .map(move |row| &row[..visible])
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        let visible = self.width * BYTES_PER_PIXEL;
        self.data
            .chunks_mut(self.stride.max(1))
            .take(self.height)
            .map(move |row| &mut row[..visible])
    }

    /// `[b, g, r, a]` at (x, y). Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel ({x},{y}) out of bounds");
        let i = y * self.stride + x * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, bgra: [u8; 4]) {
        assert!(x < self.width && y < self.height, "pixel ({x},{y}) out of bounds");
        let i = y * self.stride + x * BYTES_PER_PIXEL;
        self.data[i..i + BYTES_PER_PIXEL].copy_from_slice(&bgra);
    }

    /// Draw the raw frame into a fresh RGBA canvas of the same size.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width as u32, self.height as u32);
        for (y, row) in self.rows().enumerate() {
            for (x, px) in row.chunks_exact(BYTES_PER_PIXEL).enumerate() {
                out.put_pixel(x as u32, y as u32, Rgba([px[2], px[1], px[0], px[3]]));
            }
        }
        out
    }

    /// Rec.601 luma, the detector's input.
    pub fn to_luma(&self) -> GrayImage {
        let mut out = GrayImage::new(self.width as u32, self.height as u32);
        for (y, row) in self.rows().enumerate() {
            for (x, px) in row.chunks_exact(BYTES_PER_PIXEL).enumerate() {
                let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
                let l = (77 * r + 150 * g + 29 * b) >> 8;
                out.put_pixel(x as u32, y as u32, Luma([l as u8]));
            }
        }
        out
    }
}

/// A displayable image: what a layer shows on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuffer {
    pub width: usize,      // how wide the frame is on screen (pixels)
    pub height: usize,     // how tall the frame is on screen (pixels)
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    /// Solid-colour buffer.
    pub fn filled(width: usize, height: usize, color: u32) -> Self {
        Self { width, height, pixels: vec![color; width * height] }
    }

    /// Pack an RGBA image as 0x00RRGGBB; alpha is dropped.
    pub fn from_rgba(img: &RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        let pixels = img
            .pixels()
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
            .collect();
        Self { width: w as usize, height: h as usize, pixels }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }
}

/// A detected face rectangle in source-image space.
///
/// The origin is the *bottom-left* corner of the image (y grows upwards), the
/// convention face detectors on the capture side report in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceRegion {
    /// Reflect into a top-left-origin canvas of `canvas_height` rows.
    pub fn to_canvas(&self, canvas_height: f32) -> FaceRegion {
        FaceRegion { y: canvas_height - self.y - self.height, ..*self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_short_stride_and_short_data() {
        assert!(PixelBuffer::from_raw(4, 2, 15, vec![0; 64]).is_err());
        assert!(PixelBuffer::from_raw(4, 2, 16, vec![0; 31]).is_err());
        assert!(PixelBuffer::from_raw(4, 2, 20, vec![0; 40]).is_ok());
    }

    #[test]
    fn rows_hide_padding() {
        let buf = PixelBuffer::with_row_alignment(3, 2, 16);
        assert_eq!(buf.stride(), 16);
        assert!(buf.rows().all(|r| r.len() == 12));
        assert_eq!(buf.rows().count(), 2);
    }

    #[test]
    fn rgb_conversion_is_bgra_and_opaque() {
        let img = RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30]));
        let buf = PixelBuffer::from_rgb_image(&img, 64);
        assert_eq!(buf.stride(), 64);
        assert_eq!(buf.pixel(1, 0), [30, 20, 10, 0xFF]);

        let rgba = buf.to_rgba_image();
        assert_eq!(rgba.get_pixel(1, 0).0, [10, 20, 30, 0xFF]);
        assert_eq!(FrameBuffer::from_rgba(&rgba).get(0, 0), Some(0x000A141E));
    }

    #[test]
    fn luma_of_white_is_white() {
        let mut buf = PixelBuffer::new(1, 1);
        buf.set_pixel(0, 0, [0xFF; 4]);
        assert_eq!(buf.to_luma().get_pixel(0, 0).0, [255]);
    }

    #[test]
    fn face_region_reflects_into_canvas() {
        let r = FaceRegion { x: 10.0, y: 20.0, width: 40.0, height: 30.0 };
        assert_eq!(r.to_canvas(80.0), FaceRegion { x: 10.0, y: 30.0, width: 40.0, height: 30.0 });
    }
}
