//! Utilities
pub mod stats;
pub mod window;

pub use stats::OnlineMeanVariance;
pub use window::RecencyWindow;
