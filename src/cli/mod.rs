//! Command-line interface
mod options;

pub use options::Options;
