// src/lib.rs
//! Locates the balance sheet, income statement and cash-flow statement in
//! annual-report PDFs, normalizes their numbers and reconciles line items
//! across fiscal years.

pub mod document;
pub mod extractors;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use document::{Document, DocumentInput, StatementType};
pub use pipeline::{ExtractionResult, Pipeline, PipelineConfig};
pub use utils::AppError;
