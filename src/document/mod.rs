// src/document/mod.rs
pub mod loader;
pub mod models;

pub use loader::{discover_company_documents, infer_fiscal_year, list_companies, load_document};
pub use models::{CellProvenance, Document, DocumentInput, RowProvenance, StatementType};
