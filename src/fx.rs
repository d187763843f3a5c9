// Frame processing strategies.
// Visual outcomes:
// - Tint: the whole picture pulses towards blue and back, one cycle every ~63 frames.
// - Faces: each detected face gets a thick red ellipse around it.
//
// Both consume one BGRA buffer and produce a displayable `FrameBuffer`.

use image::{Rgba, RgbaImage};

use crate::config::{AppConfig, FaceSettings, Strategy};
use crate::error::Error;
use crate::orientation::Orientation;
use crate::types::{BYTES_PER_PIXEL, FaceRegion, FrameBuffer, PixelBuffer};
use crate::vision::{FaceDetector, FaceTracker, RustfaceDetector};

/// Turns one captured frame into one displayable image.
///
/// The buffer is only borrowed for the duration of the call; implementations
/// may mutate it but must not keep it.
pub trait FrameProcessor {
    fn process(&mut self, buffer: &mut PixelBuffer, frame_index: u64) -> Result<FrameBuffer, Error>;
}

impl FrameProcessor for Box<dyn FrameProcessor> {
    fn process(&mut self, buffer: &mut PixelBuffer, frame_index: u64) -> Result<FrameBuffer, Error> {
        (**self).process(buffer, frame_index)
    }
}

/// Build the strategy the config selects. Loads the face model when needed.
pub fn build_processor(cfg: &AppConfig) -> Result<Box<dyn FrameProcessor>, Error> {
    Ok(match cfg.processing.strategy {
        Strategy::Tint => Box::new(TintOverlay::new(cfg.tint.orientation)),
        Strategy::Faces => {
            let faces = &cfg.faces;
            let detector = FaceTracker::new(
                RustfaceDetector::load(faces)?,
                faces.tracking,
                faces.track_hold_frames,
            );
            Box::new(FaceOverlay::new(detector, faces))
        }
    })
}

// ----------------------------- Strategy A: tint ------------------------------

/// Blue level for frame `n`: `round(((sin(n/10) + 1) / 2) * 255)`.
/// Cycles smoothly through 0..=255 with a period of 20π frames.
pub fn blue_for_frame(n: u64) -> u8 {
    let v = (((n as f64) / 10.0).sin() + 1.0) * 0.5 * 255.0;
    v.round().clamp(0.0, 255.0) as u8
}

/// Overwrite the blue byte of every visible pixel; green/red/alpha and the
/// row padding stay untouched.
pub fn tint_in_place(buffer: &mut PixelBuffer, blue: u8) {
    for row in buffer.rows_mut() {
        for px in row.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[0] = blue;
        }
    }
}

pub struct TintOverlay {
    orientation: Orientation,
}

impl TintOverlay {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation }
    }
}

impl FrameProcessor for TintOverlay {
    fn process(&mut self, buffer: &mut PixelBuffer, frame_index: u64) -> Result<FrameBuffer, Error> {
        tint_in_place(buffer, blue_for_frame(frame_index));
        let upright = self.orientation.apply(&buffer.to_rgba_image());
        Ok(FrameBuffer::from_rgba(&upright))
    }
}

// --------------------------- Strategy B: face marks --------------------------

pub struct FaceOverlay<D> {
    detector: D,
    detector_hint: Orientation,
    orientation: Orientation,
    stroke: Rgba<u8>,
    stroke_width: f32,
}

impl<D: FaceDetector> FaceOverlay<D> {
    pub fn new(detector: D, settings: &FaceSettings) -> Self {
        let [r, g, b] = settings.stroke_color;
        Self {
            detector,
            detector_hint: settings.detector_orientation,
            orientation: settings.orientation,
            stroke: Rgba([r, g, b, 0xFF]),
            stroke_width: settings.stroke_width,
        }
    }
}

impl<D: FaceDetector> FrameProcessor for FaceOverlay<D> {
    fn process(&mut self, buffer: &mut PixelBuffer, _frame_index: u64) -> Result<FrameBuffer, Error> {
        let faces = self.detector.detect(&buffer.to_luma(), self.detector_hint)?;

        // Canvas = raw camera image; faces are stroked on top.
        let mut canvas = buffer.to_rgba_image();
        let canvas_h = canvas.height() as f32;
        for face in &faces {
            stroke_ellipse_in_rect(&mut canvas, &face.to_canvas(canvas_h), self.stroke_width, self.stroke);
        }
        if !faces.is_empty() {
            log::trace!("marked {} face(s)", faces.len());
        }

        let upright = self.orientation.apply(&canvas);
        Ok(FrameBuffer::from_rgba(&upright))
    }
}

/// Stroke the ellipse inscribed in `rect` (canvas space, top-left origin).
///
/// The stroke is centred on the ellipse outline, `width` pixels thick. A pixel
/// is painted when its centre lies between the outline grown and shrunk by
/// half the stroke width.
pub fn stroke_ellipse_in_rect(canvas: &mut RgbaImage, rect: &FaceRegion, width: f32, color: Rgba<u8>) {
    let half = width * 0.5;
    let (cx, cy) = (rect.x + rect.width * 0.5, rect.y + rect.height * 0.5);
    let (a, b) = (rect.width * 0.5, rect.height * 0.5);
    let (outer_a, outer_b) = (a + half, b + half);
    let (inner_a, inner_b) = (a - half, b - half);
    let has_hole = inner_a > 0.0 && inner_b > 0.0;

    // Scan just the bounding box of the outer ellipse, clipped to the canvas.
    let x0 = (cx - outer_a).floor().max(0.0) as u32;
    let y0 = (cy - outer_b).floor().max(0.0) as u32;
    let x1 = ((cx + outer_a).ceil().max(0.0) as u32).min(canvas.width());
    let y1 = ((cy + outer_b).ceil().max(0.0) as u32).min(canvas.height());

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let outer = (dx / outer_a).powi(2) + (dy / outer_b).powi(2);
            if outer > 1.0 { continue; }      // outside the stroke
            if has_hole && (dx / inner_a).powi(2) + (dy / inner_b).powi(2) < 1.0 {
                continue;                      // inside the ring
            }
            canvas.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn blue_matches_formula_and_range() {
        for n in 0..2_000u64 {
            let expected = (((n as f64 / 10.0).sin() + 1.0) * 0.5 * 255.0).round();
            assert_eq!(blue_for_frame(n) as f64, expected, "frame {n}");
        }
        assert_eq!(blue_for_frame(0), 128);
    }

    #[test]
    fn blue_is_periodic_over_twenty_pi_frames() {
        // 63 frames is 20π rounded; the phase error keeps values within a few steps.
        for n in 0..500u64 {
            let d = (blue_for_frame(n) as i16 - blue_for_frame(n + 63) as i16).abs();
            assert!(d <= 3, "frame {n}: drift {d}");
        }
        let values: Vec<u8> = (0..63).map(blue_for_frame).collect();
        assert_eq!(values.iter().max(), Some(&255));
        assert_eq!(values.iter().min(), Some(&0));
    }

    #[test]
    fn tint_never_touches_row_padding() {
        let (w, h, stride) = (3, 4, 20);
        let mut buf = PixelBuffer::from_raw(w, h, stride, vec![0xAA; stride * h]).unwrap();
        tint_in_place(&mut buf, 7);
        for (i, byte) in buf.as_bytes().iter().enumerate() {
            let col = i % stride;
            let expected = if col < w * 4 && col % 4 == 0 { 7 } else { 0xAA };
            assert_eq!(*byte, expected, "byte {i}");
        }
    }

    #[test]
    fn tint_output_is_oriented() {
        let mut buf = PixelBuffer::new(3, 2);
        let mut fx = TintOverlay::new(Orientation::Rotate90);
        let out = fx.process(&mut buf, 0).unwrap();
        assert_eq!((out.width, out.height), (2, 3));
        assert!(out.pixels.iter().all(|&p| p == 128));
    }

    #[test]
    fn thin_ellipse_hits_edge_midpoints_not_corners_or_centre() {
        let mut canvas = RgbaImage::new(100, 80);
        let rect = FaceRegion { x: 10.0, y: 30.0, width: 40.0, height: 30.0 };
        stroke_ellipse_in_rect(&mut canvas, &rect, 2.0, RED);

        assert_eq!(*canvas.get_pixel(10, 44), RED); // left
        assert_eq!(*canvas.get_pixel(49, 44), RED); // right
        assert_eq!(*canvas.get_pixel(29, 30), RED); // top
        assert_eq!(*canvas.get_pixel(29, 59), RED); // bottom
        assert_ne!(*canvas.get_pixel(30, 45), RED); // centre
        assert_ne!(*canvas.get_pixel(10, 30), RED); // corner
        assert_ne!(*canvas.get_pixel(49, 59), RED); // corner
    }

    #[test]
    fn wide_stroke_fills_small_ellipse_and_clips_at_canvas_edge() {
        let mut canvas = RgbaImage::new(20, 20);
        let rect = FaceRegion { x: -5.0, y: -5.0, width: 10.0, height: 10.0 };
        stroke_ellipse_in_rect(&mut canvas, &rect, 30.0, RED);
        assert_eq!(*canvas.get_pixel(0, 0), RED);
    }
}
