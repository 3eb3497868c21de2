// src/utils/mod.rs
pub mod error;
pub mod logging;
pub mod text_debug;
pub mod warnings;

pub use error::AppError; // Re-export main error type for convenience
pub use warnings::{ExtractionWarning, WarningKind, WarningLog};
