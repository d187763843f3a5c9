use std::collections::VecDeque;

use image::GrayImage;

use frame_fx::config::AppConfig;
use frame_fx::error::Error;
use frame_fx::fx::{FaceOverlay, FrameProcessor, TintOverlay, blue_for_frame};
use frame_fx::orientation::Orientation;
use frame_fx::types::{FaceRegion, FrameBuffer, PixelBuffer};
use frame_fx::vision::FaceDetector;

const RED: u32 = 0x00_FF_00_00;

/// Returns pre-recorded detections, one entry per frame.
struct Scripted(VecDeque<Vec<FaceRegion>>);

impl FaceDetector for Scripted {
    fn detect(&mut self, _: &GrayImage, _: Orientation) -> Result<Vec<FaceRegion>, Error> {
        Ok(self.0.pop_front().unwrap_or_default())
    }
}

fn no_faces() -> Scripted {
    Scripted(VecDeque::new())
}

/// Landscape sensor frame where every pixel is distinguishable: red = x, green = y.
fn coords_frame(w: usize, h: usize) -> PixelBuffer {
    let mut buf = PixelBuffer::with_row_alignment(w, h, 64);
    for y in 0..h {
        for x in 0..w {
            buf.set_pixel(x, y, [0, y as u8, x as u8, 0xFF]);
        }
    }
    buf
}

#[test]
fn tint_of_white_4x4_frame_zero() {
    let mut buf = PixelBuffer::from_raw(4, 4, 16, vec![0xFF; 64]).unwrap();
    let out = TintOverlay::new(Orientation::Rotate90).process(&mut buf, 0).unwrap();

    for row in buf.rows() {
        for px in row.chunks_exact(4) {
            assert_eq!(px, [128, 0xFF, 0xFF, 0xFF]);
        }
    }
    assert_eq!((out.width, out.height), (4, 4));
    assert!(out.pixels.iter().all(|&p| p == 0x00_FF_FF_80));
}

#[test]
fn tint_follows_frame_index() {
    let mut buf = PixelBuffer::new(2, 2);
    let mut fx = TintOverlay::new(Orientation::Identity);
    for n in [0u64, 16, 47, 100] {
        let out = fx.process(&mut buf, n).unwrap();
        assert_eq!(out.pixels[0] & 0xFF, blue_for_frame(n) as u32, "frame {n}");
    }
}

#[test]
fn no_faces_means_oriented_copy_of_input() {
    let settings = AppConfig::default().faces;
    let mut buf = coords_frame(6, 4);
    let expected = FrameBuffer::from_rgba(&settings.orientation.apply(&buf.to_rgba_image()));

    let out = FaceOverlay::new(no_faces(), &settings).process(&mut buf, 0).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn one_face_is_stroked_in_flipped_rectangle() {
    let mut settings = AppConfig::default().faces;
    settings.orientation = Orientation::Identity;
    settings.stroke_width = 2.0;

    // Bottom-left-origin rectangle; on a 100x80 canvas it lands at y = 80 - 20 - 30 = 30.
    let face = FaceRegion { x: 10.0, y: 20.0, width: 40.0, height: 30.0 };
    let mut fx = FaceOverlay::new(Scripted(VecDeque::from([vec![face]])), &settings);
    let mut buf = PixelBuffer::new(100, 80);
    let out = fx.process(&mut buf, 0).unwrap();

    // Edge midpoints of R' = (10, 30, 40, 30) are on the stroke.
    assert_eq!(out.get(10, 44), Some(RED));
    assert_eq!(out.get(49, 44), Some(RED));
    assert_eq!(out.get(29, 30), Some(RED));
    assert_eq!(out.get(29, 59), Some(RED));
    // Inside the ring and outside the rectangle stay untouched.
    assert_eq!(out.get(30, 45), Some(0));
    assert_eq!(out.get(5, 44), Some(0));
    // The un-flipped rectangle's top edge would be at y = 20.
    assert_eq!(out.get(29, 20), Some(0));
}

// Both strategies correct the same sensor mounting. With the default codes
// the face path (5) is the tint path (6) mirrored left-to-right, i.e. the
// face view shows the selfie-mirrored picture.
#[test]
fn face_view_is_mirror_of_tint_view() {
    let cfg = AppConfig::default();
    let (w, h) = (6, 4);

    let tint = TintOverlay::new(cfg.tint.orientation)
        .process(&mut coords_frame(w, h), 0)
        .unwrap();
    let faces = FaceOverlay::new(no_faces(), &cfg.faces)
        .process(&mut coords_frame(w, h), 0)
        .unwrap();

    assert_eq!((tint.width, tint.height), (h, w));
    assert_eq!((faces.width, faces.height), (h, w));
    let rg = |p: u32| p & 0x00_FF_FF_00;
    for y in 0..tint.height {
        for x in 0..tint.width {
            let mirrored = faces.get(tint.width - 1 - x, y).unwrap();
            assert_eq!(rg(tint.get(x, y).unwrap()), rg(mirrored), "({x},{y})");
        }
    }

    // Sensor top-left lands top-right in the tint view, top-left in the face view.
    assert_eq!(rg(tint.get(h - 1, 0).unwrap()), 0);
    assert_eq!(rg(faces.get(0, 0).unwrap()), 0);
}
