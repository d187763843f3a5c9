// Face detection for the face-overlay strategy.
// Detectors report rectangles in source-image space with a bottom-left
// origin; the overlay flips them into canvas space before drawing.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::GrayImage;
use rustface::{Detector, ImageData};

use crate::config::{Accuracy, FaceSettings};
use crate::error::Error;
use crate::orientation::Orientation;
use crate::types::FaceRegion;

/// Pluggable face detection backend.
///
/// Implementations may be stateful (tracking across frames), hence `&mut self`.
pub trait FaceDetector {
    /// Find faces in `luma`. `hint` is the orientation that makes the image
    /// upright; detectors that only find upright faces should honour it.
    fn detect(&mut self, luma: &GrayImage, hint: Orientation) -> Result<Vec<FaceRegion>, Error>;
}

/// SeetaFace frontal detector via `rustface`.
pub struct RustfaceDetector {
    detector: Box<dyn Detector>,
}

impl RustfaceDetector {
    /// Load the SeetaFace model from disk and tune it per `settings`.
    pub fn load(settings: &FaceSettings) -> Result<Self, Error> {
        let model = read_model(&settings.model_path)?;
        let mut detector = rustface::create_detector_with_model(model);
        detector.set_min_face_size(settings.min_face_size);
        detector.set_score_thresh(settings.score_threshold);
        let (scale, step) = match settings.accuracy {
            Accuracy::High => (0.8, 4),
            Accuracy::Low => (0.6, 8),
        };
        detector.set_pyramid_scale_factor(scale);
        detector.set_slide_window_step(step, step);
        log::info!(
            "face model {} loaded ({:?} accuracy)",
            settings.model_path.display(),
            settings.accuracy
        );
        Ok(Self { detector })
    }
}

fn read_model(path: &Path) -> Result<rustface::Model, Error> {
    let file = File::open(path)
        .map_err(|e| Error::FaceModel(format!("open {}: {e}", path.display())))?;
    rustface::read_model(BufReader::new(file))
        .map_err(|e| Error::FaceModel(format!("parse {}: {e}", path.display())))
}

impl FaceDetector for RustfaceDetector {
    fn detect(&mut self, luma: &GrayImage, hint: Orientation) -> Result<Vec<FaceRegion>, Error> {
        let (src_w, src_h) = (luma.width() as f32, luma.height() as f32);
        let upright = hint.apply_gray(luma);
        let faces = self
            .detector
            .detect(&ImageData::new(upright.as_raw(), upright.width(), upright.height()));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let rect = (
                    bbox.x() as f32,
                    bbox.y() as f32,
                    bbox.width() as f32,
                    bbox.height() as f32,
                );
                region_from_upright(rect, hint, src_w, src_h)
            })
            .collect())
    }
}

/// Convert a top-left-origin rectangle found in the upright image into a
/// bottom-left-origin region of the stored `src_w` x `src_h` image.
fn region_from_upright(rect: (f32, f32, f32, f32), hint: Orientation, src_w: f32, src_h: f32) -> FaceRegion {
    let (x, y, w, h) = hint.map_rect_to_source(rect, src_w, src_h);
    FaceRegion { x, y: src_h - y - h, width: w, height: h }
}

/// Holds the last non-empty detection through short dropouts.
///
/// When the inner detector suddenly finds nothing, the previous faces are
/// repeated for up to `hold_frames` consecutive frames so the markers do not
/// flicker.
pub struct FaceTracker<D> {
    inner: D,
    enabled: bool,
    hold_frames: u32,
    last: Vec<FaceRegion>,
    missed: u32,
}

impl<D: FaceDetector> FaceTracker<D> {
    pub fn new(inner: D, enabled: bool, hold_frames: u32) -> Self {
        Self { inner, enabled, hold_frames, last: Vec::new(), missed: 0 }
    }
}

impl<D: FaceDetector> FaceDetector for FaceTracker<D> {
    fn detect(&mut self, luma: &GrayImage, hint: Orientation) -> Result<Vec<FaceRegion>, Error> {
        let faces = self.inner.detect(luma, hint)?;
        if !self.enabled {
            return Ok(faces);
        }
        if !faces.is_empty() {
            self.last = faces.clone();
            self.missed = 0;
            return Ok(faces);
        }
        self.missed = self.missed.saturating_add(1);
        if self.missed > self.hold_frames {
            self.last.clear();
        }
        Ok(self.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Vec<FaceRegion>>);

    impl FaceDetector for Scripted {
        fn detect(&mut self, _: &GrayImage, _: Orientation) -> Result<Vec<FaceRegion>, Error> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    fn face() -> FaceRegion {
        FaceRegion { x: 1.0, y: 2.0, width: 3.0, height: 4.0 }
    }

    fn script(frames: Vec<Vec<FaceRegion>>) -> Scripted {
        Scripted(frames.into())
    }

    #[test]
    fn tracker_holds_faces_through_short_gaps() {
        let mut t = FaceTracker::new(script(vec![vec![face()], vec![], vec![], vec![]]), true, 2);
        let img = GrayImage::new(1, 1);
        let counts: Vec<usize> = (0..4)
            .map(|_| t.detect(&img, Orientation::Identity).unwrap().len())
            .collect();
        assert_eq!(counts, vec![1, 1, 1, 0]);
    }

    #[test]
    fn disabled_tracker_passes_through() {
        let mut t = FaceTracker::new(script(vec![vec![face()], vec![]]), false, 10);
        let img = GrayImage::new(1, 1);
        assert_eq!(t.detect(&img, Orientation::Identity).unwrap().len(), 1);
        assert!(t.detect(&img, Orientation::Identity).unwrap().is_empty());
    }

    // A patch outlined in the upright image must come back, after the canvas
    // flip, as the source pixels that were rotated into it.
    #[test]
    fn upright_rect_lands_on_same_source_patch() {
        let (sw, sh) = (7u32, 5u32);
        let src = image::RgbaImage::from_fn(sw, sh, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
        for hint in [Orientation::Identity, Orientation::Transpose, Orientation::Rotate90] {
            let upright = hint.apply(&src);
            let (ux, uy, uw, uh) = (1u32, 2u32, 3u32, 2u32);
            assert!(ux + uw <= upright.width() && uy + uh <= upright.height());

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (u8::MAX, u8::MAX, 0u8, 0u8);
            for y in uy..uy + uh {
                for x in ux..ux + uw {
                    let [sx, sy, ..] = upright.get_pixel(x, y).0;
                    (min_x, min_y) = (min_x.min(sx), min_y.min(sy));
                    (max_x, max_y) = (max_x.max(sx), max_y.max(sy));
                }
            }
            let expected = FaceRegion {
                x: min_x as f32,
                y: min_y as f32,
                width: (max_x - min_x + 1) as f32,
                height: (max_y - min_y + 1) as f32,
            };

            let rect = (ux as f32, uy as f32, uw as f32, uh as f32);
            let region = region_from_upright(rect, hint, sw as f32, sh as f32);
            assert_eq!(region.to_canvas(sh as f32), expected, "orientation {hint:?}");
        }
    }

    #[test]
    fn bottom_left_origin_under_identity() {
        let region = region_from_upright((1.0, 1.0, 2.0, 3.0), Orientation::Identity, 10.0, 8.0);
        assert_eq!(region, FaceRegion { x: 1.0, y: 4.0, width: 2.0, height: 3.0 });
    }

    #[test]
    fn missing_model_is_a_model_error() {
        let settings = crate::config::AppConfig::default().faces;
        let settings = FaceSettings { model_path: "/nonexistent/seeta.bin".into(), ..settings };
        assert!(matches!(RustfaceDetector::load(&settings), Err(Error::FaceModel(_))));
    }
}
