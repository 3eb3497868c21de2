// src/pipeline/mod.rs
pub mod assembler;
pub mod reconciler;

use crate::document::loader::load_document;
use crate::document::models::{Document, DocumentInput, StatementType};
use crate::extractors::classifier::{TableClassifier, DEFAULT_MAX_NOTE_REFERENCE};
use crate::extractors::locator::{TableLocator, DEFAULT_MAX_HEADING_WORDS};
use crate::extractors::normalizer::{normalize_table, NormalizedTable, UnitScale};
use crate::extractors::vocabulary::{CanonicalLabel, Vocabulary, FUZZY_MATCH_THRESHOLD};
use crate::utils::error::DocumentError;
use crate::utils::warnings::{ExtractionWarning, WarningKind, WarningLog};
use std::collections::BTreeMap;
use std::time::Instant;

pub use assembler::{DocumentReport, DocumentStatus, ExtractionResult, StatementTable};
pub use reconciler::{ConflictNote, LineItemRecord, YearValue};

/// Immutable settings for one pipeline. Nothing is read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub target_statements: Vec<StatementType>,
    pub fuzzy_match_threshold: f64,
    pub max_heading_words: usize,
    /// Scale assumed for tables without a unit caption.
    pub default_scale: UnitScale,
    pub max_note_reference: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_statements: StatementType::ALL.to_vec(),
            fuzzy_match_threshold: FUZZY_MATCH_THRESHOLD,
            max_heading_words: DEFAULT_MAX_HEADING_WORDS,
            default_scale: UnitScale::Units,
            max_note_reference: DEFAULT_MAX_NOTE_REFERENCE,
        }
    }
}

/// Locator, classifier and normalizer output for one document.
#[derive(Debug)]
pub struct DocumentExtraction {
    pub source_name: String,
    pub fiscal_year: u32,
    /// Position in the input set; later-loaded documents win priority ties.
    pub load_order: usize,
    pub tables: Vec<NormalizedTable>,
    pub warnings: WarningLog,
}

pub struct Pipeline {
    config: PipelineConfig,
    locator: TableLocator,
    classifier: TableClassifier,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let vocabulary = Vocabulary::new(config.fuzzy_match_threshold);
        Self {
            locator: TableLocator::new(
                vocabulary.clone(),
                config.target_statements.clone(),
                config.max_heading_words,
            ),
            classifier: TableClassifier::new(vocabulary, config.max_note_reference),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads and processes every input. Unreadable documents are skipped with
    /// a FatalInputError warning; the rest still produce results.
    pub fn run(&self, company: &str, inputs: &[DocumentInput]) -> ExtractionResult {
        let loaded: Vec<_> = inputs
            .iter()
            .map(|input| (input, load_document(company, input)))
            .collect();
        self.run_loaded(company, &loaded)
    }

    /// Same as `run` for inputs whose load already happened, so callers that
    /// also need the page text extract each PDF once.
    pub fn run_loaded(
        &self,
        company: &str,
        loaded: &[(&DocumentInput, Result<Document, DocumentError>)],
    ) -> ExtractionResult {
        tracing::info!("Running extraction for {} over {} documents", company, loaded.len());
        let mut reports = Vec::with_capacity(loaded.len());
        let mut extractions = Vec::with_capacity(loaded.len());
        let mut warnings = WarningLog::new();

        for (load_order, (input, outcome)) in loaded.iter().enumerate() {
            match outcome {
                Ok(document) => {
                    let extraction = self.extract_document(document, load_order);
                    reports.push(DocumentReport::processed(&extraction));
                    extractions.push(extraction);
                }
                Err(e) => {
                    warnings.push(
                        ExtractionWarning::new(WarningKind::FatalInputError, format!("document skipped: {}", e))
                            .in_document(&input.source_name),
                    );
                    reports.push(DocumentReport::skipped(&input.source_name, input.fiscal_year, e.to_string()));
                }
            }
        }

        self.finish(company, reports, extractions, warnings)
    }

    /// Same as `run` for documents whose text is already extracted.
    pub fn run_documents(&self, company: &str, documents: &[Document]) -> ExtractionResult {
        tracing::info!("Running extraction for {} over {} documents", company, documents.len());
        let extractions: Vec<DocumentExtraction> = documents
            .iter()
            .enumerate()
            .map(|(load_order, document)| self.extract_document(document, load_order))
            .collect();
        let reports = extractions.iter().map(DocumentReport::processed).collect();
        self.finish(company, reports, extractions, WarningLog::new())
    }

    /// Locator, classifier and normalizer for one document. Independent of
    /// every other document.
    pub fn extract_document(&self, document: &Document, load_order: usize) -> DocumentExtraction {
        let started = Instant::now();
        let mut warnings = WarningLog::new();

        let located = self.locator.locate(document);
        warnings.extend(located.warnings);

        let mut tables = Vec::new();
        let mut used_labels = BTreeMap::new();
        for region in &located.regions {
            let Some(classified) = self.classifier.classify(region, document.fiscal_year()) else {
                tracing::debug!("Ignoring unmatched region '{}' on page {}", region.heading, region.first_page);
                continue;
            };
            let mut normalized = normalize_table(classified, self.config.default_scale);
            warnings.extend(std::mem::take(&mut normalized.warnings));
            demote_duplicate_rows(&mut normalized, &mut used_labels, &mut warnings);
            tables.push(normalized);
        }

        tracing::info!(
            "Processed {} (FY{}): {} statements in {:?}",
            document.source_name(),
            document.fiscal_year(),
            tables.len(),
            started.elapsed()
        );

        DocumentExtraction {
            source_name: document.source_name().to_string(),
            fiscal_year: document.fiscal_year(),
            load_order,
            tables,
            warnings,
        }
    }

    fn finish(
        &self,
        company: &str,
        reports: Vec<DocumentReport>,
        extractions: Vec<DocumentExtraction>,
        mut warnings: WarningLog,
    ) -> ExtractionResult {
        for extraction in &extractions {
            warnings.extend(extraction.warnings.clone());
        }
        let (records, reconcile_warnings) = reconciler::reconcile(&extractions);
        warnings.extend(reconcile_warnings);
        ExtractionResult::assemble(company, reports, &extractions, records, warnings)
    }
}

/// A document gives each line item one row. Later rows matching an
/// already-used label become unclassified so both stay visible.
fn demote_duplicate_rows(
    table: &mut NormalizedTable,
    used_labels: &mut BTreeMap<CanonicalLabel, String>,
    warnings: &mut WarningLog,
) {
    for row in &mut table.rows {
        let Some(label) = row.label else { continue };
        match used_labels.get(&label) {
            Some(first_row) => {
                warnings.push(
                    ExtractionWarning::new(
                        WarningKind::DuplicateLineItem,
                        format!(
                            "{} row '{}' also matches {} (already taken by '{}'), kept as unclassified",
                            row.statement_type, row.raw_label, label, first_row
                        ),
                    )
                    .in_document(&row.provenance.document)
                    .on_page(row.provenance.page),
                );
                row.label = None;
            }
            None => {
                used_labels.insert(label, row.raw_label.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn doc(source: &str, year: u32, pages: &[&str]) -> Document {
        Document::from_pages("Acme", source, year, pages.iter().map(|p| p.to_string()).collect())
    }

    fn balance_sheet_doc(year: u32, assets: &str, liabilities: &str) -> Document {
        let page = format!(
            "Consolidated Balance Sheets\n(In thousands)\nTotal Assets {}\nTotal Liabilities {}\n",
            assets, liabilities
        );
        doc(&format!("acme_{}.pdf", year), year, &[page.as_str()])
    }

    #[test]
    fn test_two_single_page_balance_sheets() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let docs = vec![
            balance_sheet_doc(2022, "4,500", "2,800"),
            balance_sheet_doc(2023, "5,000", "3,000"),
        ];
        let result = pipeline.run_documents("Acme", &docs);

        assert_eq!(result.records.len(), 2);
        for record in &result.records {
            assert_eq!(record.statement_type, StatementType::BalanceSheet);
            assert_eq!(record.values.keys().copied().collect::<Vec<_>>(), vec![2022, 2023]);
        }
        assert_eq!(result.records[0].label.name, "Total Assets");
        assert_eq!(result.records[0].value_for(2023).unwrap().value, Decimal::from(5000));
        assert_eq!(result.records[0].value_for(2023).unwrap().scale, UnitScale::Thousands);
        assert_eq!(result.fiscal_years, vec![2022, 2023]);
    }

    #[test]
    fn test_missing_cash_flow_does_not_affect_other_statements() {
        let page = "Consolidated Balance Sheets\n\
            (In millions)\n\
            2023 2022\n\
            Total assets 500 450\n\
            Consolidated Statements of Operations\n\
            (In millions)\n\
            2023 2022\n\
            Net income 70 60\n";
        let result = Pipeline::new(PipelineConfig::default()).run_documents("Acme", &[doc("acme_2023.pdf", 2023, &[page])]);

        let misses: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::StructuralMiss)
            .collect();
        assert_eq!(misses.len(), 1);
        assert!(misses[0].message.contains("Cash-Flow"));
        assert_eq!(result.records_for(StatementType::CashFlowStatement).count(), 0);
        assert_eq!(result.records_for(StatementType::BalanceSheet).count(), 1);
        assert_eq!(result.records_for(StatementType::IncomeStatement).count(), 1);
        assert_eq!(
            result.documents[0].statements_found,
            vec![StatementType::BalanceSheet, StatementType::IncomeStatement]
        );
    }

    #[test]
    fn test_restated_prior_year_is_retained_with_conflict_note() {
        let report_2022 = "Consolidated Statements of Operations\n\
            (In millions)\n\
            2022 2021\n\
            Revenue 120 100\n";
        let report_2023 = "Consolidated Statements of Operations\n\
            (In millions)\n\
            2023 2022 2021\n\
            Revenue 130 120 95\n";
        let docs = vec![
            doc("acme_2022.pdf", 2022, &[report_2022]),
            doc("acme_2023.pdf", 2023, &[report_2023]),
        ];
        let result = Pipeline::new(PipelineConfig::default()).run_documents("Acme", &docs);

        let revenue = result
            .records
            .iter()
            .find(|r| r.label.name == "Revenue")
            .unwrap();
        assert_eq!(revenue.value_for(2021).unwrap().value, Decimal::from(95));
        assert_eq!(revenue.conflicts.len(), 1);
        assert_eq!(revenue.conflicts[0].superseded.value.value, Decimal::from(100));
        assert_eq!(revenue.conflicts[0].superseded.provenance.document, "acme_2022.pdf");
        assert!(result.warnings.iter().any(|w| w.kind == WarningKind::ConflictingValue));
    }

    #[test]
    fn test_runs_are_idempotent() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let docs = vec![
            balance_sheet_doc(2022, "4,500", "(2,800)"),
            balance_sheet_doc(2023, "5,000", "—"),
        ];
        let first = pipeline.run_documents("Acme", &docs).to_json().unwrap();
        let second = pipeline.run_documents("Acme", &docs).to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unreadable_document_is_skipped() {
        let inputs = vec![DocumentInput {
            source_name: "broken_2023.pdf".to_string(),
            fiscal_year: 2023,
            bytes: b"%PDF-garbage".to_vec(),
        }];
        let result = Pipeline::new(PipelineConfig::default()).run("Acme", &inputs);
        assert!(result.records.is_empty());
        assert_eq!(result.documents[0].status, DocumentStatus::Skipped);
        assert_eq!(result.warnings[0].kind, WarningKind::FatalInputError);
    }

    #[test]
    fn test_missing_scale_defaults_with_warning() {
        let page = "Consolidated Balance Sheets\n2023 2022\nTotal assets 500 450\n";
        let result = Pipeline::new(PipelineConfig::default()).run_documents("Acme", &[doc("acme_2023.pdf", 2023, &[page])]);
        assert!(result.warnings.iter().any(|w| w.kind == WarningKind::MissingUnitScale));
        assert_eq!(result.records[0].value_for(2022).unwrap().scale, UnitScale::Units);
    }

    #[test]
    fn test_repeated_label_in_one_document_is_not_a_conflict() {
        let page = "Consolidated Balance Sheets\n(In millions)\n2023 2022\n\
            Prepaid expenses 10 9\n\
            Other current assets 20 18\n\
            Accounts receivable 30 25\n\
            Trade receivables 31 26\n";
        let result = Pipeline::new(PipelineConfig::default()).run_documents("Acme", &[doc("acme_2023.pdf", 2023, &[page])]);

        let value = |name: &str| {
            result
                .records
                .iter()
                .find(|r| r.label.name == name)
                .and_then(|r| r.value_for(2023))
                .map(|v| v.value)
        };
        assert_eq!(value("Prepaid Expenses"), Some(Decimal::from(10)));
        assert_eq!(value("Other Current Assets"), Some(Decimal::from(20)));
        assert_eq!(value("Accounts Receivable"), Some(Decimal::from(30)));
        assert!(result.records.iter().all(|r| r.conflicts.is_empty()));
        assert!(result.warnings.iter().all(|w| w.kind != WarningKind::ConflictingValue));

        assert_eq!(result.unclassified.len(), 1);
        assert_eq!(result.unclassified[0].raw_label, "Trade receivables");
        assert_eq!(result.unclassified[0].values[&2023].value, Decimal::from(31));
        let duplicates: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::DuplicateLineItem)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert!(duplicates[0].message.contains("'Accounts receivable'"));
    }

    #[test]
    fn test_run_loaded_reuses_documents_and_reports_failures() {
        let good = DocumentInput {
            source_name: "acme_2023.pdf".to_string(),
            fiscal_year: 2023,
            bytes: Vec::new(),
        };
        let bad = DocumentInput {
            source_name: "acme_2022.pdf".to_string(),
            fiscal_year: 2022,
            bytes: Vec::new(),
        };
        let page = "Consolidated Balance Sheets\n(In millions)\n2023 2022\nTotal assets 500 450\n";
        let loaded = vec![
            (&bad, Err(DocumentError::NoText("acme_2022.pdf".to_string()))),
            (&good, Ok(doc("acme_2023.pdf", 2023, &[page]))),
        ];
        let result = Pipeline::new(PipelineConfig::default()).run_loaded("Acme", &loaded);

        assert_eq!(result.documents[0].status, DocumentStatus::Skipped);
        assert_eq!(result.documents[1].status, DocumentStatus::Processed);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::FatalInputError);
    }

    #[test]
    fn test_unclassified_rows_are_kept_but_not_reconciled() {
        let page = "Consolidated Balance Sheets\n(In millions)\n2023 2022\nTotal assets 500 450\nWidgets on loan 7 6\n";
        let result = Pipeline::new(PipelineConfig::default()).run_documents("Acme", &[doc("acme_2023.pdf", 2023, &[page])]);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.unclassified.len(), 1);
        assert_eq!(result.unclassified[0].raw_label, "Widgets on loan");
        assert_eq!(result.documents[0].rows_unclassified, 1);
    }
}
