// src/storage/mod.rs
use crate::pipeline::{DocumentStatus, ExtractionResult};
use crate::utils::error::StorageError;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// `<base>/<COMPANY>/`, created on demand.
    pub fn company_dir(&self, company: &str) -> Result<PathBuf, StorageError> {
        let target_dir = self.base_dir.join(company.to_uppercase());
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir).map_err(StorageError::IoError)?;
        }
        Ok(target_dir)
    }

    /// `<base>/<COMPANY>/debug/`, created on demand.
    pub fn debug_dir(&self, company: &str) -> Result<PathBuf, StorageError> {
        let target_dir = self.company_dir(company)?.join("debug");
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir).map_err(StorageError::IoError)?;
        }
        Ok(target_dir)
    }

    /// Saves the extraction result as pretty JSON.
    pub fn save_result(&self, result: &ExtractionResult) -> Result<PathBuf, StorageError> {
        let file_path = self
            .company_dir(&result.company)?
            .join(format!("{}_extraction.json", result.company.to_lowercase()));

        let json = result
            .to_json()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, json).map_err(StorageError::IoError)?;

        tracing::info!("Saved extraction result to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves a Markdown run log: per-document status, statements extracted
    /// and every warning.
    pub fn save_extraction_log(&self, result: &ExtractionResult) -> Result<PathBuf, StorageError> {
        let file_path = self
            .company_dir(&result.company)?
            .join(format!("{}_extraction_log.md", result.company.to_lowercase()));

        let log = render_extraction_log(result, &chrono::Utc::now().to_rfc3339())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, log).map_err(StorageError::IoError)?;

        tracing::info!("Saved extraction log to {}", file_path.display());
        Ok(file_path)
    }
}

fn render_extraction_log(result: &ExtractionResult, generated_at: &str) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# PDF Table Extraction Log: {}", result.company)?;
    writeln!(out)?;
    writeln!(out, "Generated: {}", generated_at)?;
    let years: Vec<String> = result.fiscal_years.iter().map(|y| y.to_string()).collect();
    writeln!(out, "Fiscal years: {}", if years.is_empty() { "none".to_string() } else { years.join(", ") })?;
    writeln!(out)?;

    writeln!(out, "## Documents")?;
    writeln!(out)?;
    writeln!(out, "| Document | FY | Status | Statements | Classified | Unclassified |")?;
    writeln!(out, "|---|---|---|---|---|---|")?;
    for doc in &result.documents {
        let status = match doc.status {
            DocumentStatus::Processed => "processed".to_string(),
            DocumentStatus::Skipped => format!("skipped ({})", doc.message.as_deref().unwrap_or("unreadable")),
        };
        let statements: Vec<&str> = doc.statements_found.iter().map(|s| s.display_name()).collect();
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            doc.source_name,
            doc.fiscal_year,
            status,
            if statements.is_empty() { "-".to_string() } else { statements.join(", ") },
            doc.rows_classified,
            doc.rows_unclassified
        )?;
    }
    writeln!(out)?;

    writeln!(out, "## Line items")?;
    writeln!(out)?;
    for statement in crate::document::models::StatementType::ALL {
        let count = result.records_for(statement).count();
        writeln!(out, "- {}: {} line items", statement, count)?;
    }
    writeln!(out)?;

    writeln!(out, "## Warnings ({})", result.warnings.len())?;
    writeln!(out)?;
    for warning in &result.warnings {
        writeln!(out, "- {}", warning)?;
    }
    Ok(out)
}
