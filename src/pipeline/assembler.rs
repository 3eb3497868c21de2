// src/pipeline/assembler.rs
use crate::document::models::{RowProvenance, StatementType};
use crate::extractors::normalizer::NormalizedValue;
use crate::pipeline::reconciler::LineItemRecord;
use crate::pipeline::DocumentExtraction;
use crate::utils::warnings::{ExtractionWarning, WarningLog};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processed,
    Skipped,
}

/// Per-input summary: what was found, or why the document was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub source_name: String,
    pub fiscal_year: u32,
    pub status: DocumentStatus,
    pub statements_found: Vec<StatementType>,
    pub rows_classified: usize,
    pub rows_unclassified: usize,
    pub message: Option<String>,
}

impl DocumentReport {
    pub fn skipped(source_name: &str, fiscal_year: u32, message: String) -> Self {
        Self {
            source_name: source_name.to_string(),
            fiscal_year,
            status: DocumentStatus::Skipped,
            statements_found: Vec::new(),
            rows_classified: 0,
            rows_unclassified: 0,
            message: Some(message),
        }
    }

    pub fn processed(extraction: &DocumentExtraction) -> Self {
        let rows = extraction.tables.iter().flat_map(|t| t.rows.iter());
        let (classified, unclassified): (Vec<_>, Vec<_>) = rows.partition(|r| r.label.is_some());
        Self {
            source_name: extraction.source_name.clone(),
            fiscal_year: extraction.fiscal_year,
            status: DocumentStatus::Processed,
            statements_found: extraction.tables.iter().map(|t| t.statement_type).collect(),
            rows_classified: classified.len(),
            rows_unclassified: unclassified.len(),
            message: None,
        }
    }
}

/// A row that matched no vocabulary entry. Kept for review, never reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnclassifiedRow {
    pub statement_type: StatementType,
    pub raw_label: String,
    pub provenance: RowProvenance,
    pub values: BTreeMap<u32, NormalizedValue>,
}

/// Everything one run produced for one company. Deterministic for a given
/// input set: records follow (statement, vocabulary order), years ascend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub company: String,
    pub fiscal_years: Vec<u32>,
    pub documents: Vec<DocumentReport>,
    pub records: Vec<LineItemRecord>,
    pub unclassified: Vec<UnclassifiedRow>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Wide label × year view of one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementTable {
    pub statement_type: StatementType,
    pub fiscal_years: Vec<u32>,
    pub rows: Vec<StatementTableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementTableRow {
    pub label: String,
    /// One slot per entry of `fiscal_years`.
    pub values: Vec<Option<NormalizedValue>>,
}

impl ExtractionResult {
    pub fn assemble(
        company: &str,
        documents: Vec<DocumentReport>,
        extractions: &[DocumentExtraction],
        mut records: Vec<LineItemRecord>,
        warnings: WarningLog,
    ) -> Self {
        records.sort_by_key(|r| r.label);

        let unclassified: Vec<UnclassifiedRow> = extractions
            .iter()
            .flat_map(|e| e.tables.iter())
            .flat_map(|t| t.rows.iter())
            .filter(|r| r.label.is_none())
            .map(|r| UnclassifiedRow {
                statement_type: r.statement_type,
                raw_label: r.raw_label.clone(),
                provenance: r.provenance.clone(),
                values: r.cells.iter().map(|c| (c.fiscal_year, c.value)).collect(),
            })
            .collect();

        let fiscal_years = collect_years(&records);
        tracing::info!(
            "Assembled {}: {} line items over {:?}, {} unclassified rows, {} warnings",
            company,
            records.len(),
            fiscal_years,
            unclassified.len(),
            warnings.len()
        );

        Self {
            company: company.to_string(),
            fiscal_years,
            documents,
            records,
            unclassified,
            warnings: warnings.into_vec(),
        }
    }

    pub fn records_for(&self, statement: StatementType) -> impl Iterator<Item = &LineItemRecord> {
        self.records.iter().filter(move |r| r.statement_type == statement)
    }

    /// Copy restricted to the given fiscal years. Records left with no values
    /// are dropped; documents and warnings are kept as-is.
    pub fn for_years(&self, years: &[u32]) -> Self {
        let wanted: BTreeSet<u32> = years.iter().copied().collect();

        let records: Vec<LineItemRecord> = self
            .records
            .iter()
            .filter_map(|record| {
                let mut record = record.clone();
                record.values.retain(|year, _| wanted.contains(year));
                record.conflicts.retain(|c| wanted.contains(&c.fiscal_year));
                (!record.values.is_empty()).then_some(record)
            })
            .collect();

        let unclassified = self
            .unclassified
            .iter()
            .filter_map(|row| {
                let mut row = row.clone();
                row.values.retain(|year, _| wanted.contains(year));
                (!row.values.is_empty()).then_some(row)
            })
            .collect();

        Self {
            company: self.company.clone(),
            fiscal_years: collect_years(&records),
            documents: self.documents.clone(),
            records,
            unclassified,
            warnings: self.warnings.clone(),
        }
    }

    pub fn statement_table(&self, statement: StatementType) -> StatementTable {
        let records: Vec<&LineItemRecord> = self.records_for(statement).collect();
        let fiscal_years: Vec<u32> = records
            .iter()
            .flat_map(|r| r.values.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rows = records
            .iter()
            .map(|r| StatementTableRow {
                label: r.label.name.to_string(),
                values: fiscal_years.iter().map(|y| r.value_for(*y).copied()).collect(),
            })
            .collect();
        StatementTable {
            statement_type: statement,
            fiscal_years,
            rows,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn collect_years(records: &[LineItemRecord]) -> Vec<u32> {
    records
        .iter()
        .flat_map(|r| r.values.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::CellProvenance;
    use crate::extractors::normalizer::{SignMarker, UnitScale};
    use crate::extractors::vocabulary::Vocabulary;
    use crate::pipeline::reconciler::YearValue;
    use rust_decimal::Decimal;

    fn record(statement: StatementType, name: &str, years: &[(u32, i64)]) -> LineItemRecord {
        let label = Vocabulary::labels(statement).find(|l| l.name == name).unwrap();
        let values = years
            .iter()
            .map(|(year, v)| {
                (
                    *year,
                    YearValue {
                        value: NormalizedValue {
                            value: Decimal::from(*v),
                            scale: UnitScale::Millions,
                            sign: SignMarker::None,
                        },
                        provenance: CellProvenance {
                            document: format!("acme_{}.pdf", year),
                            document_year: *year,
                            page: 1,
                            row_index: 1,
                            raw_label: name.to_string(),
                            original_text: v.to_string(),
                            footnote: None,
                        },
                    },
                )
            })
            .collect();
        LineItemRecord {
            statement_type: statement,
            label,
            values,
            conflicts: Vec::new(),
        }
    }

    fn result() -> ExtractionResult {
        let records = vec![
            record(StatementType::IncomeStatement, "Net Income", &[(2022, 60), (2023, 70)]),
            record(StatementType::BalanceSheet, "Total Liabilities", &[(2023, 300)]),
            record(StatementType::BalanceSheet, "Total Assets", &[(2021, 400), (2022, 450), (2023, 500)]),
        ];
        ExtractionResult::assemble("Acme", Vec::new(), &[], records, WarningLog::new())
    }

    #[test]
    fn test_records_follow_statement_then_vocabulary_order() {
        let result = result();
        let names: Vec<_> = result.records.iter().map(|r| r.label.name).collect();
        assert_eq!(names, vec!["Total Assets", "Total Liabilities", "Net Income"]);
        assert_eq!(result.fiscal_years, vec![2021, 2022, 2023]);
    }

    #[test]
    fn test_for_years_filters_values_and_drops_empty_records() {
        let filtered = result().for_years(&[2021]);
        assert_eq!(filtered.fiscal_years, vec![2021]);
        assert_eq!(filtered.records.len(), 1);
        assert_eq!(filtered.records[0].label.name, "Total Assets");
    }

    #[test]
    fn test_statement_table_is_wide_and_ascending() {
        let table = result().statement_table(StatementType::BalanceSheet);
        assert_eq!(table.fiscal_years, vec![2021, 2022, 2023]);
        assert_eq!(table.rows.len(), 2);
        let liabilities = &table.rows[1];
        assert_eq!(liabilities.label, "Total Liabilities");
        assert!(liabilities.values[0].is_none());
        assert_eq!(liabilities.values[2].map(|v| v.value), Some(Decimal::from(300)));
    }

    #[test]
    fn test_to_json_is_stable() {
        let a = result().to_json().unwrap();
        let b = result().to_json().unwrap();
        assert_eq!(a, b);
        assert!(a.contains("\"company\": \"Acme\""));
    }
}
