//! Sleep window inference: night windows and per-date selection.

mod night;
mod window;

pub use night::NightWindow;
pub use window::{Inference, WindowInferencer};
