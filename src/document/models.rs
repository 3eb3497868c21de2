// src/document/models.rs
use serde::Serialize;
use std::fmt;

/// The three target statements. Declaration order is the output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    BalanceSheet,
    IncomeStatement,
    CashFlowStatement,
}

impl StatementType {
    pub const ALL: [StatementType; 3] = [
        StatementType::BalanceSheet,
        StatementType::IncomeStatement,
        StatementType::CashFlowStatement,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::IncomeStatement => "Income Statement",
            StatementType::CashFlowStatement => "Cash-Flow Statement",
        }
    }

    /// Short machine tag, used in debug dumps and file names.
    pub fn tag(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::IncomeStatement => "income_statement",
            StatementType::CashFlowStatement => "cash_flow",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Raw input as handed over by the caller: a PDF plus the fiscal year the
/// caller associated with it.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub source_name: String,
    pub fiscal_year: u32,
    pub bytes: Vec<u8>,
}

/// One loaded annual report. Immutable once built.
#[derive(Debug, Clone)]
pub struct Document {
    company: String,
    source_name: String,
    fiscal_year: u32,
    pages: Vec<String>,
}

impl Document {
    /// Builds a document from page text that was already extracted.
    pub fn from_pages(
        company: &str,
        source_name: &str,
        fiscal_year: u32,
        pages: Vec<String>,
    ) -> Self {
        Self {
            company: company.to_string(),
            source_name: source_name.to_string(),
            fiscal_year,
            pages,
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn fiscal_year(&self) -> u32 {
        self.fiscal_year
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pages with their 1-based page number.
    pub fn pages(&self) -> impl Iterator<Item = (usize, &str)> {
        self.pages.iter().enumerate().map(|(i, p)| (i + 1, p.as_str()))
    }

    pub fn page(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .map(|p| p.as_str())
    }
}

/// Where a row came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowProvenance {
    pub document: String,
    /// Fiscal year of the source document (not of the value).
    pub document_year: u32,
    pub page: usize,
    /// Line index within the page.
    pub row_index: usize,
}

/// Where a single normalized value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellProvenance {
    pub document: String,
    pub document_year: u32,
    pub page: usize,
    pub row_index: usize,
    /// Raw row label as printed in the PDF.
    pub raw_label: String,
    /// Raw value token as printed in the PDF.
    pub original_text: String,
    /// Footnote marker stripped from the token, if any.
    pub footnote: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_order_follows_declaration() {
        let mut types = vec![
            StatementType::CashFlowStatement,
            StatementType::BalanceSheet,
            StatementType::IncomeStatement,
        ];
        types.sort();
        assert_eq!(types, StatementType::ALL.to_vec());
    }

    #[test]
    fn test_page_lookup_is_one_based() {
        let doc = Document::from_pages(
            "Acme",
            "acme_2023.pdf",
            2023,
            vec!["first".to_string(), "second".to_string()],
        );
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page(1), Some("first"));
        assert_eq!(doc.page(2), Some("second"));
        assert_eq!(doc.page(0), None);
        assert_eq!(doc.page(3), None);
    }
}
