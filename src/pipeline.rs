// Capture -> process -> display plumbing.
// Two background threads and the UI thread, connected only by channels:
// - the capture thread owns the `FrameSource` and its copy of the processing
//   mode. Every frame becomes a preview update; while the mode is active the
//   raw buffer is also offered to the `FrameGate`.
// - the worker thread owns the `FrameProcessor` and the frame index, and
//   processes buffers strictly one at a time, in arrival order.
// - the UI thread receives `DisplayUpdate`s and sends `Control` messages.
// Visual: the preview keeps moving even while the worker falls behind;
// frames that arrive while it is busy never show up processed.
// Dropping the `Pipeline` (or calling `shutdown`) disconnects the channels
// and both threads exit.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};

use crate::camera::FrameSource;
use crate::display::ProcessingMode;
use crate::error::Error;
use crate::fx::FrameProcessor;
use crate::orientation::Orientation;
use crate::types::{FrameBuffer, PixelBuffer};

/// Updates queued for the UI thread before previews start being dropped.
const DISPLAY_QUEUE: usize = 4;

/// Content for one of the two display layers.
#[derive(Debug)]
pub enum DisplayUpdate {
    /// A live, unprocessed frame.
    Preview(FrameBuffer),
    /// The result of processing one frame.
    Processed(FrameBuffer),
}

/// UI -> capture thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    SetMode(ProcessingMode),
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub queue_depth: usize,
    pub preview_orientation: Orientation,
    pub max_consecutive_failures: u32,
    pub initial_mode: ProcessingMode,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_depth: 1,
            preview_orientation: Orientation::Identity,
            max_consecutive_failures: 30,
            initial_mode: ProcessingMode::Idle,
        }
    }
}

/// Counters kept by the capture thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub offered: u64,
    pub dropped: u64,
    pub failures: u64,
}

/// Result of offering a frame to the processor.
#[derive(Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Dropped,
    Closed,
}

/// Bounded hand-off to the processor that drops the *newest* frame when full.
pub struct FrameGate {
    tx: SyncSender<PixelBuffer>,
    dropped: u64,
}

impl FrameGate {
    pub fn new(capacity: usize) -> (Self, Receiver<PixelBuffer>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    pub fn offer(&mut self, buffer: PixelBuffer) -> Offer {
        match self.tx.try_send(buffer) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Offer::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub struct Pipeline {
    control: mpsc::Sender<Control>,
    updates: Receiver<DisplayUpdate>,
    resolution: (usize, usize),
    capture: JoinHandle<Result<CaptureStats, Error>>,
    worker: JoinHandle<u64>,
}

impl Pipeline {
    /// Start both threads. The source and the processor are built on the
    /// thread that will own them; if either fails to build, the error is
    /// returned here and nothing keeps running.
    pub fn start<S, P, MS, MP>(make_source: MS, make_processor: MP, settings: PipelineSettings) -> Result<Self, Error>
    where
        S: FrameSource + 'static,
        P: FrameProcessor + 'static,
        MS: FnOnce() -> Result<S, Error> + Send + 'static,
        MP: FnOnce() -> Result<P, Error> + Send + 'static,
    {
        let (updates_tx, updates) = mpsc::sync_channel(DISPLAY_QUEUE);
        let (control, control_rx) = mpsc::channel();
        let (gate, frames_rx) = FrameGate::new(settings.queue_depth.max(1));

        let (ready_tx, ready_rx) = mpsc::channel();
        let processed_tx = updates_tx.clone();
        let worker = thread::Builder::new()
            .name("frame-worker".into())
            .spawn(move || {
                let processor = match make_processor() {
                    Ok(p) => {
                        let _ = ready_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return 0;
                    }
                };
                run_worker(processor, frames_rx, processed_tx)
            })?;
        wait_ready(&ready_rx, "processor")?;

        let (ready_tx, ready_rx) = mpsc::channel();
        let capture = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || {
                let source = match make_source() {
                    Ok(s) => {
                        let _ = ready_tx.send(Ok(s.resolution()));
                        s
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(CaptureStats::default());
                    }
                };
                let capture = Capture {
                    source,
                    gate,
                    updates: updates_tx,
                    control: control_rx,
                    mode: settings.initial_mode,
                    preview_orientation: settings.preview_orientation,
                    max_failures: settings.max_consecutive_failures,
                    stats: CaptureStats::default(),
                };
                capture.run()
            })?;
        let resolution = wait_ready(&ready_rx, "source")?;

        Ok(Self { control, updates, resolution, capture, worker })
    }

    /// Resolution of raw frames, before any orientation correction.
    pub fn resolution(&self) -> (usize, usize) {
        self.resolution
    }

    pub fn control(&self) -> mpsc::Sender<Control> {
        self.control.clone()
    }

    pub fn updates(&self) -> &Receiver<DisplayUpdate> {
        &self.updates
    }

    /// Disconnect both threads, wait for them and report capture statistics.
    pub fn shutdown(self) -> Result<CaptureStats, Error> {
        let Self { control, updates, capture, worker, .. } = self;
        drop(control);
        drop(updates);
        let stats = capture
            .join()
            .map_err(|_| Error::Pipeline("capture thread panicked".into()))??;
        let processed = worker
            .join()
            .map_err(|_| Error::Pipeline("worker thread panicked".into()))?;
        log::info!(
            "pipeline stopped: {} captured, {} offered, {} dropped, {} processed, {} failures",
            stats.captured,
            stats.offered,
            stats.dropped,
            processed,
            stats.failures
        );
        Ok(stats)
    }
}

fn wait_ready<T>(rx: &Receiver<Result<T, Error>>, what: &str) -> Result<T, Error> {
    rx.recv()
        .map_err(|_| Error::Pipeline(format!("{what} thread exited during setup")))?
}

struct Capture<S> {
    source: S,
    gate: FrameGate,
    updates: SyncSender<DisplayUpdate>,
    control: Receiver<Control>,
    mode: ProcessingMode,
    preview_orientation: Orientation,
    max_failures: u32,
    stats: CaptureStats,
}

impl<S: FrameSource> Capture<S> {
    fn run(mut self) -> Result<CaptureStats, Error> {
        let mut consecutive_failures = 0u32;
        loop {
            if !self.poll_control() {
                break;
            }

            let buffer = match self.source.next_frame() {
                Ok(buffer) => {
                    consecutive_failures = 0;
                    buffer
                }
                Err(Error::SourceExhausted) => {
                    log::info!("frame source exhausted");
                    break;
                }
                Err(Error::CameraFrame(msg)) => {
                    self.stats.failures += 1;
                    consecutive_failures += 1;
                    log::warn!("skipping frame: {msg}");
                    if consecutive_failures >= self.max_failures {
                        return Err(Error::CameraFrame(format!(
                            "{consecutive_failures} consecutive frames failed, giving up"
                        )));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.stats.captured += 1;

            let preview = FrameBuffer::from_rgba(&self.preview_orientation.apply(&buffer.to_rgba_image()));
            match self.updates.try_send(DisplayUpdate::Preview(preview)) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => break,
            }

            if self.mode == ProcessingMode::Active {
                self.stats.offered += 1;
                match self.gate.offer(buffer) {
                    Offer::Accepted => {}
                    Offer::Dropped => log::debug!("processor busy, dropped frame {}", self.stats.captured),
                    Offer::Closed => break,
                }
            }
        }
        self.stats.dropped = self.gate.dropped();
        Ok(self.stats)
    }

    /// Apply pending mode changes. Returns false once the UI has gone away.
    fn poll_control(&mut self) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::SetMode(mode)) => {
                    if mode != self.mode {
                        log::debug!("capture mode -> {mode:?}");
                    }
                    self.mode = mode;
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

/// Process frames until the capture side hangs up. Returns how many frames
/// were processed.
fn run_worker<P: FrameProcessor>(
    mut processor: P,
    frames: Receiver<PixelBuffer>,
    updates: SyncSender<DisplayUpdate>,
) -> u64 {
    let mut frame_index = 0u64;
    for mut buffer in frames {
        match processor.process(&mut buffer, frame_index) {
            Ok(image) => {
                frame_index += 1;
                if updates.send(DisplayUpdate::Processed(image)).is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("frame {frame_index} not processed: {e}"),
        }
    }
    frame_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_drops_newest_when_full() {
        let (mut gate, rx) = FrameGate::new(1);
        let mut first = PixelBuffer::new(1, 1);
        first.set_pixel(0, 0, [1, 0, 0, 0]);
        let mut second = PixelBuffer::new(1, 1);
        second.set_pixel(0, 0, [2, 0, 0, 0]);

        assert_eq!(gate.offer(first), Offer::Accepted);
        assert_eq!(gate.offer(second), Offer::Dropped);
        assert_eq!(gate.dropped(), 1);

        // The queued frame is the older one.
        assert_eq!(rx.try_recv().unwrap().pixel(0, 0)[0], 1);
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert_eq!(gate.offer(PixelBuffer::new(1, 1)), Offer::Closed);
    }

    struct Count;

    impl FrameProcessor for Count {
        fn process(&mut self, _: &mut PixelBuffer, n: u64) -> Result<FrameBuffer, Error> {
            Ok(FrameBuffer::filled(1, 1, n as u32))
        }
    }

    #[test]
    fn worker_numbers_frames_in_arrival_order() {
        let (tx, rx) = mpsc::sync_channel(8);
        let (utx, urx) = mpsc::sync_channel(8);
        for _ in 0..3 {
            tx.send(PixelBuffer::new(1, 1)).unwrap();
        }
        drop(tx);
        assert_eq!(run_worker(Count, rx, utx), 3);
        let seen: Vec<u32> = urx
            .iter()
            .map(|u| match u {
                DisplayUpdate::Processed(fb) => fb.pixels[0],
                DisplayUpdate::Preview(_) => panic!("worker sent a preview"),
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
