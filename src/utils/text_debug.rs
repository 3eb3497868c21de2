// src/utils/text_debug.rs
use crate::document::models::Document;
use crate::utils::error::AppError;
use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Wraps each highlighted span as `[[label: text]]`. Overlapping spans after
/// the first are skipped.
pub fn annotate_text(text: &str, highlights: &[(usize, usize, &str)]) -> String {
    let mut sorted = highlights.to_vec();
    sorted.sort_by_key(|h| (h.0, h.1));

    let mut out = String::with_capacity(text.len() + highlights.len() * 16);
    let mut last_pos = 0;
    for (start, end, label) in sorted {
        if start < last_pos {
            continue;
        }
        out.push_str(&text[last_pos..start]);
        out.push_str(&format!("[[{}: {}]]", label, &text[start..end]));
        last_pos = end;
    }
    out.push_str(&text[last_pos..]);
    out
}

/// Writes every page of the document with pattern matches marked, so
/// heading and ToC decisions can be checked by eye.
pub fn create_debug_dump(document: &Document, filename: &Path, patterns: &[(&str, &str)]) -> Result<(), AppError> {
    let compiled = patterns
        .iter()
        .map(|(pattern, label)| {
            Regex::new(pattern)
                .map(|re| (re, *label))
                .map_err(|e| AppError::Config(format!("Invalid regex pattern '{}': {}", pattern, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut file = File::create(filename)?;
    writeln!(file, "# {} (FY{})", document.source_name(), document.fiscal_year())?;

    for (number, text) in document.pages() {
        let mut highlights = Vec::new();
        for (re, label) in &compiled {
            for mat in re.find_iter(text) {
                highlights.push((mat.start(), mat.end(), *label));
            }
        }
        writeln!(file, "\n===== Page {} ({} matches) =====", number, highlights.len())?;
        writeln!(file, "{}", annotate_text(text, &highlights))?;
    }

    tracing::info!("Saved debug dump to {}", filename.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_text_marks_spans_and_skips_overlaps() {
        let text = "Consolidated Balance Sheets";
        let annotated = annotate_text(text, &[(13, 27, "balance_sheet"), (21, 27, "other")]);
        assert_eq!(annotated, "Consolidated [[balance_sheet: Balance Sheets]]");
    }

    #[test]
    fn test_create_debug_dump_writes_pages() {
        let doc = Document::from_pages(
            "Acme",
            "acme_2023.pdf",
            2023,
            vec!["Table of Contents".to_string(), "Consolidated Balance Sheets".to_string()],
        );
        let path = std::env::temp_dir().join(format!("statement_extractor_dump_{}.txt", std::process::id()));
        let result = create_debug_dump(&doc, &path, &[(r"(?i)balance\s+sheets", "balance_sheet")]);
        assert!(result.is_ok(), "dump failed: {:?}", result.err());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("===== Page 2 (1 matches) ====="));
        assert!(written.contains("[[balance_sheet: Balance Sheets]]"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let doc = Document::from_pages("Acme", "a_2023.pdf", 2023, vec!["x".to_string()]);
        let path = std::env::temp_dir().join("statement_extractor_never_written.txt");
        let result = create_debug_dump(&doc, &path, &[("(unclosed", "bad")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
