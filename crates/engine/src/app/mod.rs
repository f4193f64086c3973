mod display;
mod input;
mod loop_runner;
mod metrics;
mod viewport;

pub use display::{Color, DisplayList, DrawItem};
pub use input::{Key, KeyEvent, KeyStates};
pub use loop_runner::{run_main_loop, AppError, LoopConfig, LoopSummary, Platform};
pub use metrics::LoopMetricsSnapshot;
pub use viewport::Viewport;
