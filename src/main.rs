// What you SEE:
// • The live camera preview, with a red round button at the bottom.
// • Click the button (or press SPACE): it turns green and the picture switches
//   to processed frames (blue tint, or red ellipses around faces).
// • Click again: back to the live preview. ESC quits.

use std::path::PathBuf;
use std::sync::mpsc::TryRecvError;
use std::time::{Duration, Instant};

use clap::Parser;

use frame_fx::camera::{CameraCapture, SyntheticSource};
use frame_fx::config::{AppConfig, SourceKind, Strategy};
use frame_fx::display::{Controller, ProcessingMode};
use frame_fx::draw::{Button, Drawer, blit_fit, draw_text_5x7};
use frame_fx::error::Error;
use frame_fx::fx::build_processor;
use frame_fx::pipeline::{Pipeline, PipelineSettings};
use frame_fx::types::FrameBuffer;

#[derive(Parser, Debug)]
#[command(name = "frame-fx", about = "Live camera tint / face-marking demo")]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Processing strategy wired to the frame stream
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
    /// Frame source
    #[arg(long, value_enum)]
    source: Option<SourceKind>,
    /// Camera index
    #[arg(long)]
    device: Option<u32>,
    /// SeetaFace model file for the faces strategy
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy { cfg.processing.strategy = strategy; }
    if let Some(source) = cli.source { cfg.source = source; }
    if let Some(device) = cli.device {
        cfg.camera.index = device;
        cfg.camera.name_hint = None;
    }
    if let Some(model) = cli.model { cfg.faces.model_path = model; }
    cfg.validate()?;
    log::info!("strategy {:?}, source {:?}", cfg.processing.strategy, cfg.source);

    /* --- Pipeline: capture + worker threads ---
       Visual: nothing yet; setup failures end the app right here. */
    let settings = PipelineSettings {
        queue_depth: cfg.processing.queue_depth,
        preview_orientation: cfg.display.preview_orientation,
        max_consecutive_failures: cfg.camera.max_consecutive_failures,
        initial_mode: ProcessingMode::Idle,
    };
    let processor_cfg = cfg.clone();
    let make_processor = move || build_processor(&processor_cfg);
    let pipeline = match cfg.source {
        SourceKind::Camera => {
            let camera = cfg.camera.clone();
            Pipeline::start(move || CameraCapture::open(&camera), make_processor, settings)?
        }
        SourceKind::Synthetic => {
            let (w, h, fps) = (cfg.camera.width as usize, cfg.camera.height as usize, cfg.camera.fps);
            let align = cfg.camera.row_alignment;
            Pipeline::start(
                move || Ok(SyntheticSource::new(w, h).with_fps(fps).with_row_alignment(align)),
                make_processor,
                settings,
            )?
        }
    };

    /* --- Window sized to the upright preview --- */
    let (cam_w, cam_h) = pipeline.resolution();
    let (w, h) = cfg.display.preview_orientation.oriented_size(cam_w, cam_h);
    let mut drawer = Drawer::new(&cfg.display.title, w, h, cfg.display.target_fps)?;
    let mut screen = FrameBuffer::filled(w, h, 0);
    let button = Button::bottom_center(w, h);
    let mut controller = Controller::new(pipeline.control());

    /* --- HUD / FPS --- */
    let mut last_fps_time = Instant::now();
    let mut frames_this_second: u32 = 0;
    let mut hud_fps_text = String::from("FPS: 0.0");

    /* ------------------------------ Main loop ------------------------------ */
    let mut source_ended = false;
    while drawer.is_open() && !drawer.esc_pressed() {
        /* 1) Take everything the background threads delivered; latest wins. */
        loop {
            match pipeline.updates().try_recv() {
                Ok(update) => controller.apply(update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    source_ended = true;
                    break;
                }
            }
        }
        if source_ended { break; }

        /* 2) Inputs: button click or SPACE flips processing. */
        let clicked = drawer.take_click().is_some_and(|(x, y)| button.contains(x, y));
        if clicked || drawer.space_pressed_once() {
            controller.toggle();
        }

        /* 3) Compose: visible layer, button, HUD. */
        match controller.visible_contents() {
            Some(image) => blit_fit(image, &mut screen),
            None => screen.pixels.fill(0),
        }
        button.draw(&mut screen, controller.button_color());
        let status = match controller.mode() {
            ProcessingMode::Active => "PROCESSING",
            ProcessingMode::Idle => "LIVE",
        };
        draw_text_5x7(&mut screen, 8, 8, &format!("{status} | {hud_fps_text}"), 0x00_FF_FF_FF);

        /* 4) Present to the window. */
        drawer.present(&screen)?;

        /* 5) FPS counter (logged + HUD once per second) */
        frames_this_second += 1;
        let now = Instant::now();
        if now.duration_since(last_fps_time) >= Duration::from_secs(1) {
            let secs = now.duration_since(last_fps_time).as_secs_f32();
            let fps = frames_this_second as f32 / secs;
            log::debug!("FPS: {fps:.1}");
            hud_fps_text = format!("FPS: {fps:.1}");
            frames_this_second = 0;
            last_fps_time = now;
        }
    }

    drop(controller);
    pipeline.shutdown()?;
    if source_ended {
        log::info!("frame source ended");
    }
    Ok(())
}
