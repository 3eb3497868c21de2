// src/document/loader.rs
use crate::document::models::{Document, DocumentInput};
use crate::utils::error::DocumentError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static DIGIT_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("Failed to compile DIGIT_RUN_RE"));

/// Extracts per-page text from the PDF bytes and builds the Document.
/// Any failure here is fatal for this document only.
pub fn load_document(company: &str, input: &DocumentInput) -> Result<Document, DocumentError> {
    tracing::debug!("Extracting text layer from {} ({} bytes)", input.source_name, input.bytes.len());

    // pdf-extract can panic on malformed content streams; treat that as a corrupt file.
    let bytes = input.bytes.as_slice();
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| DocumentError::ExtractorPanic(input.source_name.clone()))?;
    let pages = extracted.map_err(|e| DocumentError::Pdf(format!("{}: {}", input.source_name, e)))?;

    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(DocumentError::NoText(input.source_name.clone()));
    }

    tracing::info!("Loaded {} ({} pages, FY{})", input.source_name, pages.len(), input.fiscal_year);
    Ok(Document::from_pages(company, &input.source_name, input.fiscal_year, pages))
}

/// Picks the fiscal year out of a file name: the last standalone 4-digit
/// run that looks like a year (19xx / 20xx).
pub fn infer_fiscal_year(file_name: &str) -> Option<u32> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    DIGIT_RUN_RE
        .find_iter(stem)
        .map(|m| m.as_str())
        .filter(|run| run.len() == 4 && (run.starts_with("19") || run.starts_with("20")))
        .last()
        .and_then(|run| run.parse::<u32>().ok())
}

/// Lists company folders (sub-directories) under the PDF root, sorted by name.
pub async fn list_companies(pdf_folder: &Path) -> Result<Vec<String>, DocumentError> {
    let mut companies = Vec::new();
    let mut entries = tokio::fs::read_dir(pdf_folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                companies.push(name.to_string());
            }
        }
    }
    companies.sort();
    Ok(companies)
}

/// Reads every `*.pdf` in `<pdf_folder>/<company>/`, sorted by file name,
/// tagging each with the fiscal year inferred from its name. Files without an
/// inferable year are skipped.
pub async fn discover_company_documents(
    pdf_folder: &Path,
    company: &str,
) -> Result<Vec<DocumentInput>, DocumentError> {
    let company_dir = pdf_folder.join(company);
    tracing::info!("Scanning {} for annual reports", company_dir.display());

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&company_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut inputs = Vec::with_capacity(names.len());
    for name in names {
        let Some(fiscal_year) = infer_fiscal_year(&name) else {
            tracing::warn!("Skipping {}: no fiscal year in file name", name);
            continue;
        };
        let bytes = tokio::fs::read(company_dir.join(&name)).await?;
        tracing::debug!("Queued {} as FY{} ({} bytes)", name, fiscal_year, bytes.len());
        inputs.push(DocumentInput {
            source_name: name,
            fiscal_year,
            bytes,
        });
    }

    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "statement_extractor_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_infer_fiscal_year() {
        assert_eq!(infer_fiscal_year("acme_2023.pdf"), Some(2023));
        assert_eq!(infer_fiscal_year("AR-2022-final.pdf"), Some(2022));
        assert_eq!(infer_fiscal_year("acme_2022_2023.pdf"), Some(2023));
        assert_eq!(infer_fiscal_year("report_12345.pdf"), None);
        assert_eq!(infer_fiscal_year("annual_report.pdf"), None);
        assert_eq!(infer_fiscal_year("fy1999.PDF"), Some(1999));
    }

    #[test]
    fn test_load_document_rejects_garbage_bytes() {
        let input = DocumentInput {
            source_name: "broken_2023.pdf".to_string(),
            fiscal_year: 2023,
            bytes: b"this is not a pdf".to_vec(),
        };
        assert!(load_document("Acme", &input).is_err());
    }

    #[test]
    fn test_discover_company_documents_sorted_and_filtered() {
        let root = scratch_dir("discover");
        let company_dir = root.join("Acme");
        std::fs::create_dir_all(&company_dir).unwrap();
        std::fs::write(company_dir.join("acme_2023.pdf"), b"b").unwrap();
        std::fs::write(company_dir.join("acme_2022.pdf"), b"a").unwrap();
        std::fs::write(company_dir.join("acme_annual.pdf"), b"c").unwrap();
        std::fs::write(company_dir.join("notes_2023.txt"), b"d").unwrap();

        let inputs = tokio_test::block_on(discover_company_documents(&root, "Acme")).unwrap();
        let found: Vec<_> = inputs
            .iter()
            .map(|i| (i.source_name.as_str(), i.fiscal_year))
            .collect();
        assert_eq!(found, vec![("acme_2022.pdf", 2022), ("acme_2023.pdf", 2023)]);
        assert_eq!(inputs[0].bytes, b"a".to_vec());

        let companies = tokio_test::block_on(list_companies(&root)).unwrap();
        assert_eq!(companies, vec!["Acme".to_string()]);

        let _ = std::fs::remove_dir_all(&root);
    }
}
