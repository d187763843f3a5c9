// Frame sources: the real camera (nokhwa) and a synthetic test pattern.
// Both hand out BGRA `PixelBuffer`s, one per call, in capture order.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::CameraSettings;
use crate::error::Error;
use crate::types::{BYTES_PER_PIXEL, PixelBuffer};

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

/// Anything that produces a stream of frames.
pub trait FrameSource {
    /// (width, height) of the frames this source delivers.
    fn resolution(&self) -> (usize, usize);

    /// Block until the next frame is available.
    ///
    /// `Error::CameraFrame` means this one frame was lost and the caller may
    /// try again; `Error::SourceExhausted` means the stream ended.
    fn next_frame(&mut self) -> Result<PixelBuffer, Error>;
}

// A small wrapper around nokhwa::Camera so the capture loop stays clean.
pub struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
    row_alignment: usize,
}

impl CameraCapture {
    /// Open the configured device and start streaming.
    /// Any failure here is fatal for the app: there is no fallback device.
    pub fn open(settings: &CameraSettings) -> Result<Self, Error> {
        // 1) Choose the device: by name hint if given, else by index.
        let idx = match &settings.name_hint {
            Some(hint) => find_device(hint)?,
            None => CameraIndex::Index(settings.index),
        };

        let fmt = CameraFormat::new(
            Resolution::new(settings.width, settings.height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            settings.fps,
        );

        // 2) Ask for RGB frames near our request.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        // 3) Create the camera (this might fail if no device exists).
        let mut cam = Camera::new(idx.clone(), req)
            .map_err(|e| Error::CameraInit(format!("Create camera {idx}: {e}")))?;

        // 4) Start streaming frames from the camera.
        cam.open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream: {e}")))?;

        // 5) The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        log::info!(
            "camera {} streaming at {}x{}",
            cam.info().human_name(),
            actual.width(),
            actual.height()
        );

        Ok(Self {
            cam,
            width: actual.width(),
            height: actual.height(),
            row_alignment: settings.row_alignment,
        })
    }
}

/// First device whose human-readable name contains `hint` (case-insensitive).
fn find_device(hint: &str) -> Result<CameraIndex, Error> {
    let devices = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| Error::CameraInit(format!("Query devices: {e}")))?;
    let needle = hint.to_lowercase();
    devices
        .iter()
        .find(|d| d.human_name().to_lowercase().contains(&needle))
        .map(|d| d.index().clone())
        .ok_or_else(|| Error::CameraInit(format!("no camera matching {hint:?}")))
}

impl FrameSource for CameraCapture {
    fn resolution(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }

    fn next_frame(&mut self) -> Result<PixelBuffer, Error> {
        // 1) Pull a frame from the camera (this blocks until a new frame is ready).
        let frame = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("Fetch frame: {e}")))?;

        // 2) Decode to an ImageBuffer<Rgb<u8>, Vec<u8>> (handles various raw formats safely).
        let rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("Decode RGB: {e}")))?;

        // 3) Repack as BGRA with padded rows.
        Ok(PixelBuffer::from_rgb_image(&rgb_img, self.row_alignment))
    }
}

/// Deterministic moving test pattern.
///
/// Every pixel's red/green bytes carry the frame sequence number (low/high
/// byte) so downstream code can tell frames apart; blue is a horizontal
/// gradient that scrolls one step per frame.
pub struct SyntheticSource {
    width: usize,
    height: usize,
    row_alignment: usize,
    seq: u64,
    limit: Option<u64>,
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            row_alignment: 1,
            seq: 0,
            limit: None,
            interval: None,
            last: None,
        }
    }

    /// Stop with `Error::SourceExhausted` after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Pace delivery to at most `fps` frames per second (0 = unpaced).
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    pub fn with_row_alignment(mut self, align: usize) -> Self {
        self.row_alignment = align;
        self
    }

    /// Sequence number carried by a frame produced by this source.
    pub fn sequence_of(bgra: [u8; 4]) -> u64 {
        (bgra[2] as u64) | ((bgra[1] as u64) << 8)
    }
}

impl FrameSource for SyntheticSource {
    fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<PixelBuffer, Error> {
        if self.limit.is_some_and(|limit| self.seq >= limit) {
            return Err(Error::SourceExhausted);
        }
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());

        let seq = self.seq;
        self.seq += 1;

        let mut buf = PixelBuffer::with_row_alignment(self.width, self.height, self.row_alignment);
        let (r, g) = ((seq & 0xFF) as u8, ((seq >> 8) & 0xFF) as u8);
        for row in buf.rows_mut() {
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let b = ((x as u64 + seq) & 0xFF) as u8;
                px.copy_from_slice(&[b, g, r, 0xFF]);
            }
        }
        Ok(buf)
    }
}
