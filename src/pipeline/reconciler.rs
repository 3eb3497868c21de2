// src/pipeline/reconciler.rs
use crate::document::models::{CellProvenance, StatementType};
use crate::extractors::normalizer::NormalizedValue;
use crate::extractors::vocabulary::CanonicalLabel;
use crate::pipeline::DocumentExtraction;
use crate::utils::warnings::{ExtractionWarning, WarningKind, WarningLog};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// The value kept for one fiscal year, with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearValue {
    pub value: NormalizedValue,
    pub provenance: CellProvenance,
}

/// A value that lost reconciliation. Kept so nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictNote {
    pub fiscal_year: u32,
    pub retained_document: String,
    pub superseded: YearValue,
}

/// One canonical line item across all documents of a company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemRecord {
    pub statement_type: StatementType,
    #[serde(serialize_with = "label_name")]
    pub label: CanonicalLabel,
    /// Fiscal year -> value, ascending.
    pub values: BTreeMap<u32, YearValue>,
    pub conflicts: Vec<ConflictNote>,
}

impl LineItemRecord {
    pub fn value_for(&self, fiscal_year: u32) -> Option<&NormalizedValue> {
        self.values.get(&fiscal_year).map(|v| &v.value)
    }
}

fn label_name<S: Serializer>(label: &CanonicalLabel, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(label.name)
}

struct Candidate {
    value: YearValue,
    load_order: usize,
}

impl Candidate {
    /// Higher wins: a document speaking about its own year first, then the
    /// most recent document, then the later-loaded one.
    fn priority(&self, fiscal_year: u32) -> (bool, u32, usize) {
        let doc_year = self.value.provenance.document_year;
        (doc_year == fiscal_year, doc_year, self.load_order)
    }
}

/// Groups classified cells by (statement, canonical label, year) and picks one
/// value per group. Unclassified rows never reach this stage.
pub fn reconcile(extractions: &[DocumentExtraction]) -> (Vec<LineItemRecord>, WarningLog) {
    let mut warnings = WarningLog::new();

    // CanonicalLabel orders by (statement, vocabulary order)
    let mut grouped: BTreeMap<CanonicalLabel, BTreeMap<u32, Vec<Candidate>>> = BTreeMap::new();
    for extraction in extractions {
        for table in &extraction.tables {
            for row in &table.rows {
                let Some(label) = row.label else { continue };
                for cell in &row.cells {
                    grouped
                        .entry(label)
                        .or_default()
                        .entry(cell.fiscal_year)
                        .or_default()
                        .push(Candidate {
                            value: YearValue {
                                value: cell.value,
                                provenance: cell.provenance.clone(),
                            },
                            load_order: extraction.load_order,
                        });
                }
            }
        }
    }

    let mut records = Vec::with_capacity(grouped.len());
    for (label, years) in grouped {
        let mut values = BTreeMap::new();
        let mut conflicts = Vec::new();

        for (fiscal_year, candidates) in years {
            // Strictly greater: on a full tie the first row seen stays
            let mut winner_idx = 0;
            for (idx, candidate) in candidates.iter().enumerate().skip(1) {
                if candidate.priority(fiscal_year) > candidates[winner_idx].priority(fiscal_year) {
                    winner_idx = idx;
                }
            }

            let mut candidates = candidates;
            let winner = candidates.remove(winner_idx).value;
            for loser in candidates {
                if loser.value.value.same_amount(&winner.value) {
                    continue;
                }
                warnings.push(
                    ExtractionWarning::new(
                        WarningKind::ConflictingValue,
                        format!(
                            "{} FY{}: kept {} from {}, superseded {} from {}",
                            label,
                            fiscal_year,
                            winner.value,
                            winner.provenance.document,
                            loser.value.value,
                            loser.value.provenance.document
                        ),
                    )
                    .in_document(&loser.value.provenance.document)
                    .on_page(loser.value.provenance.page),
                );
                conflicts.push(ConflictNote {
                    fiscal_year,
                    retained_document: winner.provenance.document.clone(),
                    superseded: loser.value,
                });
            }
            values.insert(fiscal_year, winner);
        }

        tracing::trace!("Reconciled {} across {} years ({} conflicts)", label, values.len(), conflicts.len());
        records.push(LineItemRecord {
            statement_type: label.statement,
            label,
            values,
            conflicts,
        });
    }

    tracing::debug!("Reconciled {} line items from {} documents", records.len(), extractions.len());
    (records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::RowProvenance;
    use crate::extractors::normalizer::{
        NormalizedCell, NormalizedRow, NormalizedTable, SignMarker, UnitScale,
    };
    use crate::extractors::vocabulary::Vocabulary;
    use rust_decimal::Decimal;

    fn revenue() -> CanonicalLabel {
        Vocabulary::labels(StatementType::IncomeStatement)
            .find(|l| l.name == "Revenue")
            .unwrap()
    }

    fn extraction(source: &str, doc_year: u32, load_order: usize, scale: UnitScale, cells: &[(u32, i64)]) -> DocumentExtraction {
        let provenance = RowProvenance {
            document: source.to_string(),
            document_year: doc_year,
            page: 3,
            row_index: 7,
        };
        let row = NormalizedRow {
            statement_type: StatementType::IncomeStatement,
            label: Some(revenue()),
            raw_label: "Revenue".to_string(),
            provenance,
            cells: cells
                .iter()
                .map(|(year, v)| NormalizedCell {
                    fiscal_year: *year,
                    value: NormalizedValue {
                        value: Decimal::from(*v),
                        scale,
                        sign: SignMarker::None,
                    },
                    provenance: CellProvenance {
                        document: source.to_string(),
                        document_year: doc_year,
                        page: 3,
                        row_index: 7,
                        raw_label: "Revenue".to_string(),
                        original_text: v.to_string(),
                        footnote: None,
                    },
                })
                .collect(),
        };
        DocumentExtraction {
            source_name: source.to_string(),
            fiscal_year: doc_year,
            load_order,
            tables: vec![NormalizedTable {
                statement_type: StatementType::IncomeStatement,
                scale,
                column_years: cells.iter().map(|(y, _)| *y).collect(),
                rows: vec![row],
                warnings: WarningLog::new(),
            }],
            warnings: WarningLog::new(),
        }
    }

    #[test]
    fn test_restatement_from_latest_document_wins_prior_year() {
        let docs = vec![
            extraction("acme_2022.pdf", 2022, 0, UnitScale::Units, &[(2022, 120), (2021, 100)]),
            extraction("acme_2023.pdf", 2023, 1, UnitScale::Units, &[(2023, 130), (2022, 120), (2021, 95)]),
        ];
        let (records, warnings) = reconcile(&docs);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.values.keys().copied().collect::<Vec<_>>(), vec![2021, 2022, 2023]);
        assert_eq!(record.value_for(2021).unwrap().value, Decimal::from(95));
        assert_eq!(record.conflicts.len(), 1);
        let note = &record.conflicts[0];
        assert_eq!(note.fiscal_year, 2021);
        assert_eq!(note.superseded.value.value, Decimal::from(100));
        assert_eq!(note.superseded.provenance.document, "acme_2022.pdf");
        assert_eq!(note.retained_document, "acme_2023.pdf");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings.iter().next().unwrap().kind, WarningKind::ConflictingValue);
    }

    #[test]
    fn test_same_year_source_beats_later_restatement() {
        let docs = vec![
            extraction("acme_2022.pdf", 2022, 0, UnitScale::Units, &[(2022, 120)]),
            extraction("acme_2023.pdf", 2023, 1, UnitScale::Units, &[(2023, 130), (2022, 118)]),
        ];
        let (records, _) = reconcile(&docs);
        let record = &records[0];
        assert_eq!(record.value_for(2022).unwrap().value, Decimal::from(120));
        assert_eq!(record.values[&2022].provenance.document, "acme_2022.pdf");
        assert_eq!(record.conflicts[0].superseded.value.value, Decimal::from(118));
    }

    #[test]
    fn test_equal_scaled_values_are_not_conflicts() {
        let docs = vec![
            extraction("acme_2022.pdf", 2022, 0, UnitScale::Thousands, &[(2021, 1_500)]),
            extraction("acme_2023.pdf", 2023, 1, UnitScale::Millions, &[(2021, 1)]),
        ];
        let (records, warnings) = reconcile(&docs);
        // 1,500 thousands vs 1 million differ
        assert_eq!(records[0].conflicts.len(), 1);
        assert_eq!(warnings.len(), 1);

        let docs = vec![
            extraction("acme_2022.pdf", 2022, 0, UnitScale::Thousands, &[(2021, 2_000)]),
            extraction("acme_2023.pdf", 2023, 1, UnitScale::Millions, &[(2021, 2)]),
        ];
        let (records, warnings) = reconcile(&docs);
        assert!(records[0].conflicts.is_empty());
        assert!(warnings.is_empty());
        assert_eq!(records[0].value_for(2021).unwrap().scale, UnitScale::Millions);
    }

    #[test]
    fn test_equal_priority_goes_to_later_loaded_document() {
        let docs = vec![
            extraction("acme_2023_a.pdf", 2023, 0, UnitScale::Units, &[(2021, 10)]),
            extraction("acme_2023_b.pdf", 2023, 1, UnitScale::Units, &[(2021, 11)]),
        ];
        let (records, _) = reconcile(&docs);
        assert_eq!(records[0].values[&2021].provenance.document, "acme_2023_b.pdf");
    }

    #[test]
    fn test_unscalable_values_compare_without_panicking() {
        let mut docs = vec![
            extraction("acme_2022.pdf", 2022, 0, UnitScale::Billions, &[(2021, 0)]),
            extraction("acme_2023.pdf", 2023, 1, UnitScale::Billions, &[(2021, 4)]),
        ];
        docs[0].tables[0].rows[0].cells[0].value.value = Decimal::MAX;

        let (records, warnings) = reconcile(&docs);
        assert_eq!(records[0].value_for(2021).unwrap().value, Decimal::from(4));
        assert_eq!(records[0].conflicts.len(), 1);
        let message = &warnings.iter().next().unwrap().message;
        assert!(message.contains("kept 4000000000"), "{}", message);
        assert!(message.contains("(Billions)"), "{}", message);
    }

    #[test]
    fn test_record_serializes_label_by_name() {
        let docs = vec![extraction("acme_2023.pdf", 2023, 0, UnitScale::Units, &[(2023, 5)])];
        let (records, _) = reconcile(&docs);
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["label"], "Revenue");
        assert_eq!(json["statement_type"], "income_statement");
        assert_eq!(json["values"]["2023"]["value"]["value"], "5");
    }
}
