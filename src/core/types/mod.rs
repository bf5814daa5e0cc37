mod build;
pub mod config;
mod error;
mod stats;

pub use build::*;
pub use error::*;
pub use stats::*;
