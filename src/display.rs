// Display sink and mode toggle.
// Visual: exactly one of two layers is on screen. Idle shows the live
// preview with a red button; active shows processed frames with a green one.

use std::sync::mpsc::Sender;

use crate::pipeline::{Control, DisplayUpdate};
use crate::types::FrameBuffer;

pub const BUTTON_ACTIVE: u32 = 0x00_00_FF_00; // green
pub const BUTTON_IDLE: u32 = 0x00_FF_00_00;   // red

/// Whether incoming frames are processed at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessingMode {
    #[default]
    Idle,
    Active,
}

impl ProcessingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Idle => Self::Active,
            Self::Active => Self::Idle,
        }
    }
}

/// Which layer is currently on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Preview,
    Processed,
}

/// A passive content holder. Setting contents always overwrites.
pub struct Layer {
    contents: Option<FrameBuffer>,
    hidden: bool,
}

impl Layer {
    pub fn set_contents(&mut self, image: FrameBuffer) {
        self.contents = Some(image);
    }

    pub fn contents(&self) -> Option<&FrameBuffer> {
        self.contents.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// Owns the processing mode and both layers; lives on the UI thread.
pub struct Controller {
    mode: ProcessingMode,
    preview: Layer,
    processed: Layer,
    control: Sender<Control>,
}

impl Controller {
    /// Starts idle: preview visible, processed hidden.
    pub fn new(control: Sender<Control>) -> Self {
        Self {
            mode: ProcessingMode::Idle,
            preview: Layer { contents: None, hidden: false },
            processed: Layer { contents: None, hidden: true },
            control,
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Flip the mode, swap layer visibility and tell the capture thread.
    pub fn toggle(&mut self) -> ProcessingMode {
        self.mode = self.mode.toggled();
        let active = self.mode == ProcessingMode::Active;
        self.processed.hidden = !active;
        self.preview.hidden = active;
        if !active {
            // Re-activation must not flash an old processed frame.
            self.processed.contents = None;
        }
        if self.control.send(Control::SetMode(self.mode)).is_err() {
            log::warn!("capture thread is gone; mode change not delivered");
        }
        log::info!("processing {:?}", self.mode);
        self.mode
    }

    /// Store new layer contents. Processed frames that finish after the
    /// toggle went idle are discarded.
    pub fn apply(&mut self, update: DisplayUpdate) {
        match update {
            DisplayUpdate::Preview(image) => self.preview.set_contents(image),
            DisplayUpdate::Processed(image) if self.mode == ProcessingMode::Active => {
                self.processed.set_contents(image)
            }
            DisplayUpdate::Processed(_) => {}
        }
    }

    pub fn visible_layer(&self) -> LayerKind {
        if self.processed.hidden { LayerKind::Preview } else { LayerKind::Processed }
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        match kind {
            LayerKind::Preview => &self.preview,
            LayerKind::Processed => &self.processed,
        }
    }

    /// What the screen should show right now, if anything has arrived yet.
    pub fn visible_contents(&self) -> Option<&FrameBuffer> {
        self.layer(self.visible_layer()).contents()
    }

    pub fn button_color(&self) -> u32 {
        match self.mode {
            ProcessingMode::Active => BUTTON_ACTIVE,
            ProcessingMode::Idle => BUTTON_IDLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn snapshot(c: &Controller) -> (bool, bool, u32) {
        (c.preview.is_hidden(), c.processed.is_hidden(), c.button_color())
    }

    #[test]
    fn starts_idle_with_preview_visible() {
        let (tx, _rx) = mpsc::channel();
        let c = Controller::new(tx);
        assert_eq!(c.mode(), ProcessingMode::Idle);
        assert_eq!(c.visible_layer(), LayerKind::Preview);
        assert_eq!(c.button_color(), BUTTON_IDLE);
    }

    #[test]
    fn exactly_one_layer_visible_and_double_toggle_restores() {
        let (tx, rx) = mpsc::channel();
        let mut c = Controller::new(tx);
        let before = snapshot(&c);

        assert_eq!(c.toggle(), ProcessingMode::Active);
        let (p, q, color) = snapshot(&c);
        assert!(p ^ q);
        assert_eq!((p, q, color), (true, false, BUTTON_ACTIVE));

        assert_eq!(c.toggle(), ProcessingMode::Idle);
        assert_eq!(snapshot(&c), before);

        let sent: Vec<Control> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![Control::SetMode(ProcessingMode::Active), Control::SetMode(ProcessingMode::Idle)]
        );
    }

    #[test]
    fn late_processed_frames_stay_hidden_after_toggle_off() {
        let (tx, _rx) = mpsc::channel();
        let mut c = Controller::new(tx);
        c.toggle();
        c.apply(DisplayUpdate::Processed(FrameBuffer::filled(1, 1, 1)));
        assert_eq!(c.visible_contents(), Some(&FrameBuffer::filled(1, 1, 1)));

        c.toggle();
        c.apply(DisplayUpdate::Preview(FrameBuffer::filled(1, 1, 2)));
        c.apply(DisplayUpdate::Processed(FrameBuffer::filled(1, 1, 3)));
        assert_eq!(c.visible_layer(), LayerKind::Preview);
        assert_eq!(c.visible_contents(), Some(&FrameBuffer::filled(1, 1, 2)));
        assert!(c.layer(LayerKind::Processed).contents().is_none());
    }

    #[test]
    fn reactivation_does_not_show_stale_frame() {
        let (tx, _rx) = mpsc::channel();
        let mut c = Controller::new(tx);
        c.toggle();
        c.apply(DisplayUpdate::Processed(FrameBuffer::filled(1, 1, 9)));
        c.toggle();
        c.toggle();
        assert_eq!(c.visible_contents(), None);
    }

    #[test]
    fn toggle_survives_missing_capture_thread() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut c = Controller::new(tx);
        assert_eq!(c.toggle(), ProcessingMode::Active);
    }
}
