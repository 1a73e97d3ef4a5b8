//! Audio capture and spectrum analysis.

pub mod analysis;
pub mod capture;
pub mod shared;

pub use analysis::{AnalyzerState, SpectrumAnalyzer, SpectrumFrame};
pub use capture::CaptureSource;
pub use shared::FrameSlot;
