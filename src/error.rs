// Crate-wide error type. Every variant states *where* things went wrong.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error("Camera init error: {0}")]
    CameraInit(String), // Opening/starting the camera failed
    #[error("Camera frame error: {0}")]
    CameraFrame(String), // Grabbing/decoding a single frame failed (skippable)
    #[error("Frame source exhausted")]
    SourceExhausted, // A finite source has no more frames
    #[error("Pixel buffer error: {0}")]
    Buffer(String),
    #[error("Face model error: {0}")]
    FaceModel(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
