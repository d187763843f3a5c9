// Live camera effects library.
// Visual: the live preview, or while processing is on, the same frames
// tinted blue or with faces ringed in red.

pub mod camera;
pub mod config;
pub mod display;
pub mod draw;
pub mod error;
pub mod fx;
pub mod orientation;
pub mod pipeline;
pub mod types;
pub mod vision;

pub use error::Error;
