// src/extractors/classifier.rs

// --- Imports ---
use crate::document::models::{RowProvenance, StatementType};
use crate::extractors::locator::{heading_statement, RawLine, RawTableRegion};
use crate::extractors::normalizer::looks_like_value;
use crate::extractors::vocabulary::{normalize_label, CanonicalLabel, LabelMatch, Vocabulary};
use crate::utils::warnings::{ExtractionWarning, WarningKind, WarningLog};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

// --- Constants ---
/// Bare integers at or below this are note references, not values.
pub const DEFAULT_MAX_NOTE_REFERENCE: u32 = 60;
/// Accepted gap between adjacent year columns of a header row.
const MAX_HEADER_YEAR_STEP: u32 = 5;
/// Header years must fall within this many years before the document year.
const HEADER_YEAR_LOOKBACK: u32 = 10;

const BARE_CURRENCY: &[&str] = &["$", "€", "£", "¥", "US$"];

// --- Regex Patterns (Lazy Static) ---
static YEAR_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:fy)?((?:19|20)\d{2})[*,]?$").expect("Failed to compile YEAR_TOKEN_RE")
});
static DAY_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2},?$").expect("Failed to compile DAY_TOKEN_RE"));
static NOTE_REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}$").expect("Failed to compile NOTE_REFERENCE_RE"));
// "(1)" or "[2]" printed between the label and the values
static LABEL_FOOTNOTE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\(\d{1,2}\)|\[\d{1,2}\])$").expect("Failed to compile LABEL_FOOTNOTE_TOKEN_RE")
});

// Running page headers and footers left in the text layer
static PAGE_ARTIFACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(?:page\s+)?\d{1,3}(?:\s+of\s+\d{1,3})?$",
        r"^[A-Z]{1,2}-\d{1,3}$",
        r"(?i)^\(?continued\)?$",
    ]
    .iter()
    .map(|pat| Regex::new(pat).expect("Failed to compile PAGE_ARTIFACT_PATTERNS"))
    .collect()
});

// --- Data Structures ---

/// A text line split into its label and the value tokens peeled off its
/// right end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTokens {
    pub label: String,
    pub values: Vec<String>,
}

/// A raw value token with the fiscal year of its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueToken {
    pub raw: String,
    pub fiscal_year: u32,
}

#[derive(Debug, Clone)]
pub struct ClassifiedRow {
    pub statement_type: StatementType,
    /// `None` for rows kept as unclassified.
    pub label: Option<CanonicalLabel>,
    pub raw_label: String,
    pub tokens: Vec<ValueToken>,
    pub provenance: RowProvenance,
}

impl ClassifiedRow {
    pub fn is_classified(&self) -> bool {
        self.label.is_some()
    }
}

#[derive(Debug)]
pub struct ClassifiedTable {
    pub statement_type: StatementType,
    pub caption_lines: Vec<String>,
    /// Year of each value column, left to right.
    pub column_years: Vec<u32>,
    /// False when the years were derived from the document year.
    pub header_found: bool,
    pub rows: Vec<ClassifiedRow>,
    pub warnings: WarningLog,
}

/// A data row before its tokens are bound to year columns.
struct PendingRow<'a> {
    line: &'a RawLine,
    label: String,
    values: Vec<String>,
}

// --- Main Classifier Structure ---
pub struct TableClassifier {
    vocabulary: Vocabulary,
    max_note_reference: u32,
}

impl TableClassifier {
    pub fn new(vocabulary: Vocabulary, max_note_reference: u32) -> Self {
        Self {
            vocabulary,
            max_note_reference,
        }
    }

    /// Splits a region into rows, drops structural noise, binds value tokens
    /// to year columns and labels each row. Unmatched regions yield `None`.
    pub fn classify(&self, region: &RawTableRegion, document_year: u32) -> Option<ClassifiedTable> {
        let statement = region.statement_type?;
        let mut warnings = WarningLog::new();

        // 1. Structural filtering and year header detection
        let mut header_years: Option<Vec<u32>> = None;
        let mut pending: Vec<PendingRow> = Vec::new();
        let mut wrapped_label: Option<String> = None;

        for line in &region.lines {
            let text = line.text.trim();
            if text.is_empty() || is_page_artifact(text) || heading_statement(text).is_some() {
                continue;
            }
            if let Some(years) = parse_year_header(text) {
                if self.is_plausible_header(text, &years, statement, document_year) {
                    if header_years.is_none() {
                        tracing::debug!("{}: year header {:?} on page {}", statement, years, line.page);
                        header_years = Some(years);
                    }
                    wrapped_label = None;
                    continue;
                }
            }

            let RowTokens { label, values } = split_row(text);
            if values.is_empty() {
                // Section headers, captions, or the first half of a wrapped label
                wrapped_label = if is_wrappable_label(&label) { Some(label) } else { None };
                continue;
            }
            let label = match wrapped_label.take() {
                Some(prefix) if label.is_empty() || starts_lowercase(&label) => {
                    format!("{} {}", prefix, label).trim().to_string()
                }
                _ => label,
            };
            if normalize_label(&label).is_empty() {
                tracing::trace!("Dropping label-less row on page {}: '{}'", line.page, text);
                continue;
            }
            pending.push(PendingRow { line, label, values });
        }

        // 2. Column years: the header row, else counted back from the document year
        let header_found = header_years.is_some();
        let column_count = match &header_years {
            Some(years) => years.len(),
            None => modal_value_count(&pending),
        };
        let column_years: Vec<u32> = match header_years {
            Some(years) => years,
            None => (0..column_count as u32)
                .filter_map(|i| document_year.checked_sub(i))
                .collect(),
        };

        // 3. Bind tokens to columns and label the rows
        let mut rows = Vec::with_capacity(pending.len());
        for row in pending {
            let values = self.align_columns(row.values, &column_years, &row.label, row.line, &region.document, &mut warnings);
            let tokens = values
                .into_iter()
                .zip(column_years.iter())
                .map(|(raw, year)| ValueToken { raw, fiscal_year: *year })
                .collect();

            let matched = self.vocabulary.match_label(statement, &row.label);
            if let LabelMatch::Unmatched { closest } = &matched {
                let hint = closest
                    .map(|(label, score)| format!(" (closest: '{}' at {:.2})", label, score))
                    .unwrap_or_default();
                warnings.push(
                    ExtractionWarning::new(
                        WarningKind::ClassificationMiss,
                        format!("{} row '{}' not in vocabulary{}", statement, row.label, hint),
                    )
                    .in_document(&region.document)
                    .on_page(row.line.page),
                );
            }

            rows.push(ClassifiedRow {
                statement_type: statement,
                label: matched.label(),
                raw_label: row.label,
                tokens,
                provenance: RowProvenance {
                    document: region.document.clone(),
                    document_year,
                    page: row.line.page,
                    row_index: row.line.line_index,
                },
            });
        }

        tracing::debug!(
            "{} in {}: {} rows, {} classified, columns {:?}",
            statement,
            region.document,
            rows.len(),
            rows.iter().filter(|r| r.is_classified()).count(),
            column_years
        );

        Some(ClassifiedTable {
            statement_type: statement,
            caption_lines: region.caption_lines.clone(),
            column_years,
            header_found,
            rows,
            warnings,
        })
    }

    /// Drops a leading note reference or label footnote when the row is too
    /// wide. Anything still too wide keeps its rightmost N tokens, since
    /// value columns are right-aligned.
    fn align_columns(
        &self,
        mut values: Vec<String>,
        column_years: &[u32],
        label: &str,
        line: &RawLine,
        document: &str,
        warnings: &mut WarningLog,
    ) -> Vec<String> {
        if values.len() > column_years.len()
            && (self.is_note_reference(&values[0]) || LABEL_FOOTNOTE_TOKEN_RE.is_match(&values[0]))
        {
            tracing::trace!("Dropping note reference '{}' from '{}'", values[0], label);
            values.remove(0);
        }
        if values.len() > column_years.len() {
            warnings.push(
                ExtractionWarning::new(
                    WarningKind::ColumnMismatch,
                    format!(
                        "row '{}' has {} value tokens for {} year columns",
                        label,
                        values.len(),
                        column_years.len()
                    ),
                )
                .in_document(document)
                .on_page(line.page),
            );
            let excess = values.len() - column_years.len();
            values.drain(..excess);
        }
        values
    }

    fn is_note_reference(&self, token: &str) -> bool {
        NOTE_REFERENCE_RE.is_match(token)
            && token.parse::<u32>().map_or(false, |n| n <= self.max_note_reference)
    }

    /// Rejects year-looking rows that are really data: a vocabulary label in
    /// front, or years far from the document year.
    fn is_plausible_header(&self, text: &str, years: &[u32], statement: StatementType, document_year: u32) -> bool {
        let in_window = years
            .iter()
            .all(|y| *y + HEADER_YEAR_LOOKBACK >= document_year && *y <= document_year + 1);
        if !in_window {
            return false;
        }
        let label = split_row(text).label;
        self.vocabulary.match_label(statement, &label).label().is_none()
    }
}

// --- Tokenizer ---

/// Peels value tokens off the right end of a line. A lone currency symbol is
/// merged into the value that follows it.
pub fn split_row(line: &str) -> RowTokens {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut values: Vec<String> = Vec::new();
    let mut end = tokens.len();

    while end > 0 {
        let token = tokens[end - 1];
        if looks_like_value(token) {
            values.push(token.to_string());
        } else if BARE_CURRENCY.contains(&token) && !values.is_empty() {
            if let Some(next) = values.last_mut() {
                *next = format!("{}{}", token, next);
            }
        } else {
            break;
        }
        end -= 1;
    }
    values.reverse();

    RowTokens {
        label: tokens[..end].join(" "),
        values,
    }
}

/// Recognizes a column header row such as `2023 2022`,
/// `Notes FY2023 FY2022` or `December 31, 2023 and 2022`.
pub fn parse_year_header(line: &str) -> Option<Vec<u32>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut years = Vec::new();
    let mut end = tokens.len();

    while end > 0 {
        let token = tokens[end - 1];
        if let Some(caps) = YEAR_TOKEN_RE.captures(token) {
            years.push(caps[1].parse::<u32>().ok()?);
        } else if !years.is_empty() && (token.eq_ignore_ascii_case("and") || token == "&") {
            // joins two years
        } else {
            break;
        }
        end -= 1;
    }
    if years.is_empty() {
        return None;
    }
    years.reverse();

    let prefix_ok = tokens[..end]
        .iter()
        .all(|t| !t.chars().any(|c| c.is_ascii_digit()) || DAY_TOKEN_RE.is_match(t));
    let steps_ok = years
        .windows(2)
        .all(|w| w[0] != w[1] && w[0].abs_diff(w[1]) <= MAX_HEADER_YEAR_STEP);

    (prefix_ok && steps_ok).then_some(years)
}

fn is_page_artifact(text: &str) -> bool {
    PAGE_ARTIFACT_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Mixed-case label text without a trailing colon may continue on the next
/// line. All-caps section headers never do.
fn is_wrappable_label(label: &str) -> bool {
    let has_lower = label.chars().any(|c| c.is_lowercase());
    !label.is_empty() && has_lower && !label.ends_with(':')
}

fn starts_lowercase(label: &str) -> bool {
    label.chars().next().map_or(false, |c| c.is_lowercase())
}

/// Most common token count among data rows; ties go to the narrower table.
fn modal_value_count(rows: &[PendingRow]) -> usize {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.values.len()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .fold((0, 0), |best, (width, n)| if n > best.1 { (width, n) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(statement: Option<StatementType>, lines: &[&str]) -> RawTableRegion {
        RawTableRegion {
            document: "acme_2023.pdf".to_string(),
            statement_type: statement,
            heading: "Consolidated Balance Sheets".to_string(),
            first_page: 4,
            last_page: 4,
            caption_lines: vec!["Consolidated Balance Sheets".to_string()],
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, text)| RawLine {
                    page: 4,
                    line_index: i + 1,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn classifier() -> TableClassifier {
        TableClassifier::new(Vocabulary::default(), DEFAULT_MAX_NOTE_REFERENCE)
    }

    #[test]
    fn test_split_row() {
        let row = split_row("Total current assets $ 1,234 (567)");
        assert_eq!(row.label, "Total current assets");
        assert_eq!(row.values, vec!["$1,234".to_string(), "(567)".to_string()]);

        let row = split_row("Long-term debt — 300");
        assert_eq!(row.label, "Long-term debt");
        assert_eq!(row.values, vec!["—".to_string(), "300".to_string()]);

        let row = split_row("CURRENT ASSETS");
        assert_eq!(row.label, "CURRENT ASSETS");
        assert!(row.values.is_empty());
    }

    #[test]
    fn test_parse_year_header() {
        assert_eq!(parse_year_header("2023 2022"), Some(vec![2023, 2022]));
        assert_eq!(parse_year_header("Notes FY2023 FY2022"), Some(vec![2023, 2022]));
        assert_eq!(
            parse_year_header("December 31, 2023 and 2022"),
            Some(vec![2023, 2022])
        );
        assert_eq!(
            parse_year_header("Year Ended December 31, 2023 2022 2021"),
            Some(vec![2023, 2022, 2021])
        );
        assert_eq!(parse_year_header("Total assets 5,000 4,500"), None);
        assert_eq!(parse_year_header("2023 2013"), None);
        assert_eq!(parse_year_header("Revenue"), None);
    }

    #[test]
    fn test_classify_maps_header_years_and_labels() {
        let region = region(
            Some(StatementType::BalanceSheet),
            &[
                "(In millions)",
                "2023 2022",
                "ASSETS",
                "Cash and cash equivalents $ 1,200 $ 1,000",
                "Total assets 5,000 4,500",
                "12",
                "Widgets on loan 10 9",
            ],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        assert!(table.header_found);
        assert_eq!(table.column_years, vec![2023, 2022]);
        assert_eq!(table.rows.len(), 3);

        let cash = &table.rows[0];
        assert_eq!(cash.label.map(|l| l.name), Some("Cash and Cash Equivalents"));
        assert_eq!(cash.tokens[0], ValueToken { raw: "$1,200".to_string(), fiscal_year: 2023 });
        assert_eq!(cash.tokens[1].fiscal_year, 2022);
        assert_eq!(cash.provenance.page, 4);
        assert_eq!(cash.provenance.row_index, 4);

        let unknown = &table.rows[2];
        assert!(!unknown.is_classified());
        assert_eq!(unknown.raw_label, "Widgets on loan");
        let misses: Vec<_> = table
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::ClassificationMiss)
            .collect();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].page, Some(4));
    }

    #[test]
    fn test_classify_without_header_counts_back_from_document_year() {
        let region = region(
            Some(StatementType::BalanceSheet),
            &["Total assets 500 450", "Total liabilities 300 280"],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        assert!(!table.header_found);
        assert_eq!(table.column_years, vec![2023, 2022]);
        assert_eq!(table.rows[1].tokens[1], ValueToken { raw: "280".to_string(), fiscal_year: 2022 });
    }

    #[test]
    fn test_note_reference_column_is_dropped() {
        let region = region(
            Some(StatementType::BalanceSheet),
            &["Note 2023 2022", "Inventories 7 1,500 1,400", "Total assets 9,000 8,000"],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        let raws: Vec<_> = table.rows[0].tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["1,500", "1,400"]);
        assert!(table.warnings.iter().all(|w| w.kind != WarningKind::ColumnMismatch));
    }

    #[test]
    fn test_extra_tokens_raise_column_mismatch() {
        let region = region(
            Some(StatementType::BalanceSheet),
            &["2023 2022", "Total assets 1,100 5,000 4,500"],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        let raws: Vec<_> = table.rows[0].tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["5,000", "4,500"]);
        assert_eq!(table.rows[0].tokens[1].fiscal_year, 2022);
        assert_eq!(
            table.warnings.iter().filter(|w| w.kind == WarningKind::ColumnMismatch).count(),
            1
        );
    }

    #[test]
    fn test_label_footnote_is_not_a_value() {
        let region = region(
            Some(StatementType::IncomeStatement),
            &["2023 2022", "Revenue (1) 1,234 1,100", "Net income [2] 70 60"],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        let revenue: Vec<_> = table.rows[0]
            .tokens
            .iter()
            .map(|t| (t.fiscal_year, t.raw.as_str()))
            .collect();
        assert_eq!(revenue, vec![(2023, "1,234"), (2022, "1,100")]);
        assert_eq!(table.rows[1].raw_label, "Net income [2]");
        assert!(table.rows.iter().all(|r| r.is_classified()));
        assert!(table.warnings.iter().all(|w| w.kind != WarningKind::ColumnMismatch));
    }

    #[test]
    fn test_pattern_tables_compile() {
        assert_eq!(PAGE_ARTIFACT_PATTERNS.len(), 3);
    }

    #[test]
    fn test_wrapped_label_is_joined() {
        let region = region(
            Some(StatementType::CashFlowStatement),
            &["Net cash provided by operating", "activities 1,234 1,100"],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].raw_label, "Net cash provided by operating activities");
        assert!(table.rows[0].is_classified());
    }

    #[test]
    fn test_page_artifacts_and_repeated_headings_are_skipped() {
        let region = region(
            Some(StatementType::IncomeStatement),
            &[
                "Net sales 900 800",
                "F-7",
                "Page 12",
                "Consolidated Statements of Operations (continued)",
                "Net income 70 60",
            ],
        );
        let table = classifier().classify(&region, 2023).unwrap();
        let labels: Vec<_> = table.rows.iter().map(|r| r.raw_label.as_str()).collect();
        assert_eq!(labels, vec!["Net sales", "Net income"]);
    }

    #[test]
    fn test_unmatched_region_is_not_classified() {
        let region = region(None, &["Balance at January 1 300 280"]);
        assert!(classifier().classify(&region, 2023).is_none());
    }
}
