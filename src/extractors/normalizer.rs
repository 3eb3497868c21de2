// src/extractors/normalizer.rs

// --- Imports ---
use crate::document::models::{CellProvenance, RowProvenance, StatementType};
use crate::extractors::classifier::ClassifiedTable;
use crate::extractors::vocabulary::CanonicalLabel;
use crate::utils::error::ParseFailure;
use crate::utils::warnings::{ExtractionWarning, WarningKind, WarningLog};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

// --- Constants ---
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];
// Checked after symbols are gone, so "US$" shows up here as "US"
const CURRENCY_CODES: &[&str] = &["USD", "EUR", "GBP", "US"];
const DASH_CHARS: &[char] = &['-', '–', '—', '−', '‒'];
const SUPERSCRIPT_DIGITS: &[char] = &['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];
const NOT_APPLICABLE: &[&str] = &["n/a", "na", "n.a.", "nm", "n/m", "not applicable"];

// --- Regex Patterns (Lazy Static) ---
static PLAIN_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?|\.\d+)$").expect("Failed to compile PLAIN_NUMBER_RE")
});

static GROUPED_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(?:[,']\d{3})+(?:\.\d+)?$").expect("Failed to compile GROUPED_NUMBER_RE")
});

// A bracketed marker hanging off the number: "1,234(1)", "(1,234)[a]"
static BRACKETED_FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<num>.*[\d)])(?P<mark>\([0-9a-z]{1,2}\)|\[[0-9a-z]{1,2}\])$")
        .expect("Failed to compile BRACKETED_FOOTNOTE_RE")
});

// Caption phrases declaring the unit scale, tried in order. `None` means the
// scale is read from capture group 1.
static SCALE_PATTERNS: Lazy<Vec<(Regex, Option<UnitScale>)>> = Lazy::new(|| {
    [
        (r"(?i)\bin\s+(?:u\.?s\.?\s*)?(?:[$€£]|usd|eur|gbp)?\s*(thousands?|millions?|billions?)\b", None),
        (r"(?i)\b(thousands?|millions?|billions?)\s+of\s+(?:u\.?s\.?\s+)?(?:dollars|euros|pounds|[$€£])", None),
        (r"(?i)\bin\s+(?:[$€£]|usd|eur|gbp)\s*(k|m|mn|bn)\b", None),
        (r"(?i)[$€£](k|m|mn|bn)\b", None),
        (r"(?i)[$€£]\s*'?000'?s?", Some(UnitScale::Thousands)),
        (r"(?i)\(\s*(?:[$€£]\s*)?000'?s?\s*\)", Some(UnitScale::Thousands)),
    ]
    .iter()
    .map(|(pat, scale)| (Regex::new(pat).expect("Failed to compile SCALE_PATTERNS"), *scale))
    .collect()
});

// --- Data Structures ---

/// Multiplier declared by a table caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitScale {
    Units,
    Thousands,
    Millions,
    Billions,
}

impl UnitScale {
    pub fn multiplier(&self) -> Decimal {
        match self {
            UnitScale::Units => Decimal::ONE,
            UnitScale::Thousands => Decimal::from(1_000i64),
            UnitScale::Millions => Decimal::from(1_000_000i64),
            UnitScale::Billions => Decimal::from(1_000_000_000i64),
        }
    }

    fn from_unit_word(word: &str) -> Option<Self> {
        let word = word.to_lowercase();
        if word.starts_with("thousand") || word == "k" {
            Some(UnitScale::Thousands)
        } else if word.starts_with("million") || word == "m" || word == "mn" {
            Some(UnitScale::Millions)
        } else if word.starts_with("billion") || word == "bn" {
            Some(UnitScale::Billions)
        } else {
            None
        }
    }
}

/// How the sign (or absence of a number) was expressed in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMarker {
    /// Plain non-negative number.
    None,
    /// Accounting negative, `(1,234)`.
    Parentheses,
    /// Literal leading minus.
    Minus,
    /// Lone dash or empty cell: stored as zero but distinct from a printed 0.
    ReportedBlank,
}

/// A cell value with its scale and sign origin always explicit. `value` is
/// the number as printed (signed); multiply by the scale only via `scaled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedValue {
    pub value: Decimal,
    pub scale: UnitScale,
    pub sign: SignMarker,
}

impl NormalizedValue {
    pub fn is_reported_blank(&self) -> bool {
        self.sign == SignMarker::ReportedBlank
    }

    /// The value in units (value × scale multiplier). `None` when the
    /// product does not fit a `Decimal`.
    pub fn scaled(&self) -> Option<Decimal> {
        self.value.checked_mul(self.scale.multiplier())
    }

    /// Same amount once scaled. Falls back to comparing the stored
    /// (value, scale) pair when either side cannot be scaled.
    pub fn same_amount(&self, other: &NormalizedValue) -> bool {
        match (self.scaled(), other.scaled()) {
            (Some(a), Some(b)) => a == b,
            _ => self.value == other.value && self.scale == other.scale,
        }
    }
}

impl std::fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scaled() {
            Some(amount) => write!(f, "{}", amount),
            None => write!(f, "{} ({:?})", self.value, self.scale),
        }
    }
}

/// Result of normalizing one token: the value plus any footnote marker that
/// was stripped on the way (kept for provenance).
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedToken {
    pub value: NormalizedValue,
    pub footnote: Option<String>,
}

// --- Operations ---

/// Resolves the table's unit scale from its caption lines. The first phrase
/// found, in line order, wins.
pub fn resolve_scale<S: AsRef<str>>(caption_lines: &[S]) -> Option<UnitScale> {
    for line in caption_lines {
        let line = line.as_ref();
        for (re, fixed) in SCALE_PATTERNS.iter() {
            if let Some(caps) = re.captures(line) {
                let scale = match fixed {
                    Some(scale) => Some(*scale),
                    None => caps.get(1).and_then(|m| UnitScale::from_unit_word(m.as_str())),
                };
                if let Some(scale) = scale {
                    tracing::trace!("Resolved unit scale {:?} from caption '{}'", scale, line);
                    return Some(scale);
                }
            }
        }
    }
    None
}

/// Cheap shape check used by the tokenizer to decide whether a whitespace
/// token belongs to the value columns.
pub fn looks_like_value(token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    if token.chars().all(|c| DASH_CHARS.contains(&c)) {
        return true;
    }
    if NOT_APPLICABLE.contains(&token.to_lowercase().as_str()) {
        return true;
    }
    let stripped = strip_currency(token);
    let (core, _) = strip_footnote(&stripped);
    if !core.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    core.chars().all(|c| {
        c.is_ascii_digit() || matches!(c, ',' | '.' | '(' | ')' | '\'') || DASH_CHARS.contains(&c)
    })
}

/// Normalizes one raw value token under the table's scale.
pub fn normalize_token(raw: &str, scale: UnitScale) -> Result<NormalizedToken, ParseFailure> {
    // 1. Currency symbols and whitespace
    let cleaned = strip_currency(raw);

    // Blank and dash cells
    if cleaned.is_empty() || cleaned.chars().all(|c| DASH_CHARS.contains(&c)) {
        return Ok(NormalizedToken {
            value: NormalizedValue {
                value: Decimal::ZERO,
                scale,
                sign: SignMarker::ReportedBlank,
            },
            footnote: None,
        });
    }

    if NOT_APPLICABLE.contains(&cleaned.to_lowercase().as_str()) {
        return Err(ParseFailure::NotApplicable(raw.trim().to_string()));
    }

    // Footnote markers go before sign detection so "(1,234)*" still reads as negative
    let (body, footnote) = strip_footnote(&cleaned);

    // 2. Parenthesized negative, 3. literal minus
    let (digits, sign) = if body.len() >= 2 && body.starts_with('(') && body.ends_with(')') {
        (&body[1..body.len() - 1], SignMarker::Parentheses)
    } else if let Some(first) = body.chars().next().filter(|c| DASH_CHARS.contains(c)) {
        (&body[first.len_utf8()..], SignMarker::Minus)
    } else {
        (body.as_str(), SignMarker::None)
    };

    // 5. Thousands separators, validated as 3-digit groups
    let plain = if GROUPED_NUMBER_RE.is_match(digits) {
        digits.replace([',', '\''], "")
    } else if PLAIN_NUMBER_RE.is_match(digits) {
        digits.to_string()
    } else if digits.chars().any(|c| c.is_ascii_digit()) {
        return Err(ParseFailure::MalformedGrouping(raw.trim().to_string()));
    } else {
        return Err(ParseFailure::NonNumeric(raw.trim().to_string()));
    };

    let plain = if plain.starts_with('.') { format!("0{}", plain) } else { plain };
    let magnitude = Decimal::from_str(&plain)
        .map_err(|_| ParseFailure::NonNumeric(raw.trim().to_string()))?;
    if magnitude.checked_mul(scale.multiplier()).is_none() {
        return Err(ParseFailure::OutOfRange(raw.trim().to_string()));
    }
    let value = match sign {
        SignMarker::Parentheses | SignMarker::Minus => -magnitude,
        _ => magnitude,
    };

    Ok(NormalizedToken {
        value: NormalizedValue { value, scale, sign },
        footnote,
    })
}

/// Drops currency symbols/codes and every whitespace character.
fn strip_currency(raw: &str) -> String {
    let mut s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    for code in CURRENCY_CODES {
        let n = code.len();
        if s.len() <= n {
            continue;
        }
        if s.is_char_boundary(n) && s[..n].eq_ignore_ascii_case(code) {
            s.drain(..n);
        } else if s.is_char_boundary(s.len() - n) && s[s.len() - n..].eq_ignore_ascii_case(code) {
            s.truncate(s.len() - n);
        }
    }
    s
}

/// Strips trailing footnote markers, returning the remaining text and the
/// marker (if any).
fn strip_footnote(token: &str) -> (String, Option<String>) {
    let mut marker = String::new();

    // Superscript digits can sit anywhere in the token
    let mut body: String = token
        .chars()
        .filter(|c| {
            if SUPERSCRIPT_DIGITS.contains(c) {
                marker.push(*c);
                false
            } else {
                true
            }
        })
        .collect();

    // Trailing symbols: *, †, ‡
    while let Some(last) = body.chars().last() {
        if matches!(last, '*' | '†' | '‡') {
            body.pop();
            marker.insert(0, last);
        } else {
            break;
        }
    }

    if let Some(caps) = BRACKETED_FOOTNOTE_RE.captures(&body) {
        let mark = caps["mark"].to_string();
        let num = caps["num"].to_string();
        // "(12)" on its own is a negative number, not "1" + "(2)"
        if !(num.starts_with('(') && !num.ends_with(')')) {
            marker.insert_str(0, &mark);
            body = num;
        }
    }

    let marker = if marker.is_empty() { None } else { Some(marker) };
    (body, marker)
}

// --- Table Normalization ---

/// One parsed cell. Cells whose token failed to parse are absent.
#[derive(Debug, Clone)]
pub struct NormalizedCell {
    pub fiscal_year: u32,
    pub value: NormalizedValue,
    pub provenance: CellProvenance,
}

#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub statement_type: StatementType,
    pub label: Option<CanonicalLabel>,
    pub raw_label: String,
    pub provenance: RowProvenance,
    pub cells: Vec<NormalizedCell>,
}

#[derive(Debug)]
pub struct NormalizedTable {
    pub statement_type: StatementType,
    pub scale: UnitScale,
    pub column_years: Vec<u32>,
    pub rows: Vec<NormalizedRow>,
    pub warnings: WarningLog,
}

/// Resolves the table's scale once and normalizes every cell under it.
/// Parse failures leave the cell unset and are logged as warnings.
pub fn normalize_table(table: ClassifiedTable, default_scale: UnitScale) -> NormalizedTable {
    let ClassifiedTable {
        statement_type,
        caption_lines,
        column_years,
        rows,
        mut warnings,
        ..
    } = table;

    let document = rows.first().map(|r| r.provenance.document.clone());
    let scale = match resolve_scale(caption_lines.as_slice()) {
        Some(scale) => scale,
        None => {
            let mut warning = ExtractionWarning::new(
                WarningKind::MissingUnitScale,
                format!("{} has no unit-scale caption, assuming {:?}", statement_type, default_scale),
            );
            if let Some(doc) = &document {
                warning = warning.in_document(doc);
            }
            warnings.push(warning);
            default_scale
        }
    };
    tracing::debug!("{} scale resolved to {:?}", statement_type, scale);

    let mut normalized_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(row.tokens.len());
        for token in &row.tokens {
            match normalize_token(&token.raw, scale) {
                Ok(NormalizedToken { value, footnote }) => cells.push(NormalizedCell {
                    fiscal_year: token.fiscal_year,
                    value,
                    provenance: CellProvenance {
                        document: row.provenance.document.clone(),
                        document_year: row.provenance.document_year,
                        page: row.provenance.page,
                        row_index: row.provenance.row_index,
                        raw_label: row.raw_label.clone(),
                        original_text: token.raw.clone(),
                        footnote,
                    },
                }),
                Err(failure) => warnings.push(
                    ExtractionWarning::new(
                        WarningKind::ParseFailure,
                        format!("{} '{}' FY{}: {}", statement_type, row.raw_label, token.fiscal_year, failure),
                    )
                    .in_document(&row.provenance.document)
                    .on_page(row.provenance.page),
                ),
            }
        }
        normalized_rows.push(NormalizedRow {
            statement_type: row.statement_type,
            label: row.label,
            raw_label: row.raw_label,
            provenance: row.provenance,
            cells,
        });
    }

    NormalizedTable {
        statement_type,
        scale,
        column_years,
        rows: normalized_rows,
        warnings,
    }
}
