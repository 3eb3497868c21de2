// src/utils/warnings.rs
use serde::Serialize;
use std::fmt;

/// Anomaly categories accumulated during a run. None of them abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A target statement table was not found in a document.
    StructuralMiss,
    /// A row label did not match the controlled vocabulary.
    ClassificationMiss,
    /// A value token could not be normalized.
    ParseFailure,
    /// Two documents disagree on a (label, year) value.
    ConflictingValue,
    /// A document was unreadable and skipped.
    FatalInputError,
    /// A table had no resolvable unit-scale caption.
    MissingUnitScale,
    /// A row carried more value tokens than the table has year columns.
    ColumnMismatch,
    /// A second row of one document matched an already-used line item.
    DuplicateLineItem,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningKind::StructuralMiss => "structural miss",
            WarningKind::ClassificationMiss => "classification miss",
            WarningKind::ParseFailure => "parse failure",
            WarningKind::ConflictingValue => "conflicting value",
            WarningKind::FatalInputError => "fatal input error",
            WarningKind::MissingUnitScale => "missing unit scale",
            WarningKind::ColumnMismatch => "column mismatch",
            WarningKind::DuplicateLineItem => "duplicate line item",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionWarning {
    pub kind: WarningKind,
    /// Source document name, when the anomaly is tied to one.
    pub document: Option<String>,
    /// 1-based page number, when known.
    pub page: Option<usize>,
    pub message: String,
}

impl ExtractionWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            document: None,
            page: None,
            message: message.into(),
        }
    }

    pub fn in_document(mut self, document: &str) -> Self {
        self.document = Some(document.to_string());
        self
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(doc) = &self.document {
            write!(f, " {}", doc)?;
        }
        if let Some(page) = self.page {
            write!(f, " p.{}", page)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered warning log. Every push is mirrored to `tracing::warn!`.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    entries: Vec<ExtractionWarning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ExtractionWarning) {
        tracing::warn!("{}", warning);
        self.entries.push(warning);
    }

    pub fn extend(&mut self, other: WarningLog) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionWarning> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<ExtractionWarning> {
        self.entries
    }
}
