//! Post-inference processing

pub mod filter;
pub mod smoothing;

pub use filter::DetectionFilter;
pub use smoothing::BoxSmoother;
