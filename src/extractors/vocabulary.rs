// src/extractors/vocabulary.rs

// --- Imports ---
use crate::document::models::StatementType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

// --- Matching Constants ---

/// Minimum normalized similarity (0.0 to 1.0) for a fuzzy label match.
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.85;

/// Scores closer than this are ties; the entry that comes first in the
/// vocabulary wins a tie.
pub const SIMILARITY_TIE_EPSILON: f64 = 1e-9;

/// Words that separate otherwise near-identical line items. A fuzzy match
/// must carry the same words from each group as the label.
const KEY_TERM_GROUPS: &[&[&str]] = &[
    &["operating", "investing", "financing"],
    &["current", "noncurrent"],
    &["basic", "diluted"],
    &["beginning", "end"],
];

// Bracketed note references and footnote letters hanging off a label:
// "(Note 7)", "(notes 3 and 4)", "(a)", "(1)", "[2]"
static LABEL_FOOTNOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\((?:notes?\s+[0-9a-z,\s]+|[0-9a-z]{1,2})\)|\[[0-9a-z]{1,2}\]")
        .expect("Failed to compile LABEL_FOOTNOTE_RE")
});

// --- Vocabulary Tables ---

/// One controlled-vocabulary line item with the alternate wordings companies
/// use for it.
#[derive(Debug)]
pub struct VocabularyEntry {
    pub canonical: &'static str,
    pub synonyms: &'static [&'static str],
}

const fn entry(canonical: &'static str, synonyms: &'static [&'static str]) -> VocabularyEntry {
    VocabularyEntry { canonical, synonyms }
}

static BALANCE_SHEET: &[VocabularyEntry] = &[
    entry("Cash and Cash Equivalents", &["cash and equivalents", "cash", "cash and bank balances"]),
    entry("Short-Term Investments", &["marketable securities", "current marketable securities", "short-term marketable securities"]),
    entry("Accounts Receivable", &["accounts receivable, net", "trade receivables", "trade and other receivables", "receivables", "trade accounts receivable, net"]),
    entry("Inventories", &["inventory", "inventories, net"]),
    entry("Prepaid Expenses", &["prepayments", "prepaid expenses, current"]),
    entry("Other Current Assets", &["prepaid expenses and other current assets", "prepaid and other current assets", "other current assets, net"]),
    entry("Total Current Assets", &[]),
    entry("Property, Plant and Equipment", &["property, plant and equipment, net", "property and equipment, net", "property and equipment", "fixed assets"]),
    entry("Operating Lease Right-of-Use Assets", &["right-of-use assets", "operating lease assets"]),
    entry("Goodwill", &[]),
    entry("Intangible Assets", &["intangible assets, net", "other intangible assets, net", "acquired intangible assets, net"]),
    entry("Deferred Tax Assets", &["deferred income tax assets"]),
    entry("Other Non-Current Assets", &["other assets", "other long-term assets", "other noncurrent assets"]),
    entry("Total Non-Current Assets", &["total noncurrent assets"]),
    entry("Total Assets", &[]),
    entry("Accounts Payable", &["trade payables", "trade and other payables"]),
    entry("Accrued Liabilities", &["accrued expenses", "accrued liabilities, current", "accrued compensation and benefits"]),
    entry("Other Current Liabilities", &["accrued expenses and other current liabilities", "other accrued liabilities"]),
    entry("Deferred Revenue", &["contract liabilities", "unearned revenue"]),
    entry("Short-Term Debt", &["current portion of long-term debt", "short-term borrowings", "commercial paper", "current borrowings"]),
    entry("Total Current Liabilities", &[]),
    entry("Long-Term Debt", &["long-term debt, net of current portion", "long-term borrowings", "term debt", "long-term debt, net", "non-current borrowings"]),
    entry("Operating Lease Liabilities", &["long-term operating lease liabilities", "lease liabilities", "operating lease liabilities, non-current"]),
    entry("Deferred Tax Liabilities", &["deferred income tax liabilities"]),
    entry("Other Non-Current Liabilities", &["other liabilities", "other long-term liabilities", "other noncurrent liabilities"]),
    entry("Total Non-Current Liabilities", &["total noncurrent liabilities"]),
    entry("Total Liabilities", &[]),
    entry("Common Stock", &["common stock and additional paid-in capital", "share capital", "ordinary shares"]),
    entry("Additional Paid-In Capital", &["capital in excess of par value", "share premium"]),
    entry("Retained Earnings", &["retained earnings (accumulated deficit)", "accumulated deficit"]),
    entry("Accumulated Other Comprehensive Income", &["accumulated other comprehensive income (loss)", "accumulated other comprehensive loss"]),
    entry("Treasury Stock", &["treasury stock, at cost", "treasury shares"]),
    entry("Non-Controlling Interests", &["noncontrolling interests", "minority interest"]),
    entry("Total Equity", &["total stockholders' equity", "total shareholders' equity", "total stockholders' equity (deficit)"]),
    entry("Total Liabilities and Equity", &["total liabilities and stockholders' equity", "total liabilities and shareholders' equity", "total equity and liabilities"]),
];

static INCOME_STATEMENT: &[VocabularyEntry] = &[
    entry("Revenue", &["revenues", "net revenue", "net revenues", "net sales", "total revenue", "total revenues", "total net sales", "sales", "turnover", "total net revenue"]),
    entry("Cost of Revenue", &["cost of sales", "cost of goods sold", "cost of revenues", "total cost of revenue", "total cost of sales", "cost of products sold"]),
    entry("Gross Profit", &["gross margin"]),
    entry("Research and Development", &["research and development expenses", "research and development expense"]),
    entry("Selling, General and Administrative", &["selling, general and administrative expenses", "sales, general and administrative", "marketing, general and administrative"]),
    entry("Depreciation and Amortization", &["depreciation and amortisation"]),
    entry("Total Operating Expenses", &["operating expenses", "total costs and expenses", "total operating costs and expenses"]),
    entry("Operating Income", &["income from operations", "operating profit", "operating income (loss)", "income (loss) from operations", "profit from operations"]),
    entry("Interest Expense", &["interest expense, net", "finance costs"]),
    entry("Interest Income", &["interest and dividend income", "finance income"]),
    entry("Other Income (Expense)", &["other income (expense), net", "other income, net", "other expense, net"]),
    entry("Income Before Income Taxes", &["income before provision for income taxes", "profit before tax", "income before taxes", "earnings before income taxes", "income (loss) before income taxes"]),
    entry("Income Tax Expense", &["provision for income taxes", "income tax expense (benefit)", "income taxes", "tax expense", "provision for (benefit from) income taxes"]),
    entry("Net Income", &["net income (loss)", "net earnings", "profit for the year", "net loss", "net profit", "profit for the period"]),
    entry("Net Income Attributable to Non-Controlling Interests", &["net income attributable to noncontrolling interests", "less: net income attributable to noncontrolling interests"]),
    entry("Net Income Attributable to Shareholders", &["net income attributable to common stockholders", "profit attributable to owners of the parent"]),
    entry("Basic Earnings per Share", &["basic net income per share", "earnings per share, basic", "net income per share, basic", "basic earnings per share"]),
    entry("Diluted Earnings per Share", &["diluted net income per share", "earnings per share, diluted", "net income per share, diluted", "diluted earnings per share"]),
    entry("Weighted Average Shares Basic", &["weighted-average shares outstanding, basic", "weighted average number of shares, basic"]),
    entry("Weighted Average Shares Diluted", &["weighted-average shares outstanding, diluted", "weighted average number of shares, diluted"]),
];

static CASH_FLOW_STATEMENT: &[VocabularyEntry] = &[
    entry("Net Income", &["net income (loss)", "net earnings", "profit for the year", "net loss"]),
    entry("Depreciation and Amortization", &["depreciation and amortisation", "depreciation, amortization and other"]),
    entry("Stock-Based Compensation", &["share-based compensation", "stock-based compensation expense", "share-based compensation expense"]),
    entry("Deferred Income Taxes", &["deferred income tax", "deferred taxes", "deferred income tax expense (benefit)"]),
    entry("Net Cash from Operating Activities", &["net cash provided by operating activities", "net cash used in operating activities", "net cash provided by (used in) operating activities", "net cash (used in) provided by operating activities", "cash generated by operating activities", "net cash generated from operating activities", "cash provided by operating activities"]),
    entry("Capital Expenditures", &["purchases of property and equipment", "purchases of property, plant and equipment", "payments for acquisition of property, plant and equipment", "capital expenditure", "additions to property and equipment"]),
    entry("Acquisitions", &["acquisitions, net of cash acquired", "business acquisitions, net of cash acquired"]),
    entry("Purchases of Investments", &["purchases of marketable securities", "purchases of investments"]),
    entry("Proceeds from Sales of Investments", &["proceeds from sales of marketable securities", "proceeds from sale of investments", "proceeds from sales of investments"]),
    entry("Proceeds from Maturities of Investments", &["proceeds from maturities of marketable securities", "proceeds from maturities of investments"]),
    entry("Net Cash from Investing Activities", &["net cash used in investing activities", "net cash provided by investing activities", "net cash provided by (used in) investing activities", "net cash (used in) provided by investing activities", "cash used in investing activities", "cash generated by (used in) investing activities"]),
    entry("Proceeds from Debt", &["proceeds from issuance of long-term debt", "proceeds from borrowings", "proceeds from issuance of debt"]),
    entry("Repayments of Debt", &["repayments of long-term debt", "repayment of borrowings"]),
    entry("Dividends Paid", &["payments for dividends", "cash dividends paid", "dividends paid to shareholders", "payments for dividends and dividend equivalents"]),
    entry("Share Repurchases", &["repurchases of common stock", "purchases of treasury stock", "repurchase of common stock", "common stock repurchased"]),
    entry("Net Cash from Financing Activities", &["net cash used in financing activities", "net cash provided by financing activities", "net cash provided by (used in) financing activities", "net cash (used in) provided by financing activities", "cash used in financing activities"]),
    entry("Effect of Exchange Rate Changes", &["effect of exchange rate changes on cash and cash equivalents", "effect of foreign exchange rate changes", "effect of exchange rate changes on cash"]),
    entry("Net Change in Cash", &["net increase (decrease) in cash and cash equivalents", "net increase in cash and cash equivalents", "net decrease in cash and cash equivalents", "increase (decrease) in cash and cash equivalents", "net change in cash and cash equivalents"]),
    entry("Cash at Beginning of Period", &["cash and cash equivalents at beginning of year", "cash and cash equivalents, beginning of period", "cash and cash equivalents, beginning balances", "cash at beginning of year"]),
    entry("Cash at End of Period", &["cash and cash equivalents at end of year", "cash and cash equivalents, end of period", "cash and cash equivalents, ending balances", "cash at end of year"]),
];

// --- Data Structures ---

/// A controlled-vocabulary line item. Ordering is (statement, vocabulary
/// position), which is the output order of the extraction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CanonicalLabel {
    pub statement: StatementType,
    pub order: usize,
    pub name: &'static str,
}

impl fmt::Display for CanonicalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelMatch {
    Exact(CanonicalLabel),
    Fuzzy { label: CanonicalLabel, score: f64 },
    /// Nothing cleared the threshold; `closest` is kept for diagnostics.
    Unmatched { closest: Option<(CanonicalLabel, f64)> },
}

impl LabelMatch {
    pub fn label(&self) -> Option<CanonicalLabel> {
        match self {
            LabelMatch::Exact(label) | LabelMatch::Fuzzy { label, .. } => Some(*label),
            LabelMatch::Unmatched { .. } => None,
        }
    }
}

/// Similarity-scored lookup against the fixed per-statement vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    threshold: f64,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(FUZZY_MATCH_THRESHOLD)
    }
}

impl Vocabulary {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn entries(statement: StatementType) -> &'static [VocabularyEntry] {
        match statement {
            StatementType::BalanceSheet => BALANCE_SHEET,
            StatementType::IncomeStatement => INCOME_STATEMENT,
            StatementType::CashFlowStatement => CASH_FLOW_STATEMENT,
        }
    }

    /// All canonical labels of a statement, in vocabulary order.
    pub fn labels(statement: StatementType) -> impl Iterator<Item = CanonicalLabel> {
        Self::entries(statement)
            .iter()
            .enumerate()
            .map(move |(order, e)| CanonicalLabel {
                statement,
                order,
                name: e.canonical,
            })
    }

    /// First exact (normalized) match wins; otherwise the most similar entry
    /// at or above the threshold.
    pub fn match_label(&self, statement: StatementType, raw_label: &str) -> LabelMatch {
        let needle = normalize_label(raw_label);
        if needle.is_empty() {
            return LabelMatch::Unmatched { closest: None };
        }

        let entries = Self::entries(statement);
        let label_at = |order: usize| CanonicalLabel {
            statement,
            order,
            name: entries[order].canonical,
        };

        // Exact pass
        for (order, e) in entries.iter().enumerate() {
            let exact = std::iter::once(e.canonical)
                .chain(e.synonyms.iter().copied())
                .any(|candidate| normalize_label(candidate) == needle);
            if exact {
                return LabelMatch::Exact(label_at(order));
            }
        }

        // Fuzzy pass: only candidates agreeing on every key term
        let needle_terms = key_terms(&needle);
        let mut best: Option<(usize, f64)> = None;
        for (order, e) in entries.iter().enumerate() {
            let score = std::iter::once(e.canonical)
                .chain(e.synonyms.iter().copied())
                .map(|candidate| normalize_label(candidate))
                .filter(|candidate| key_terms(candidate) == needle_terms)
                .map(|candidate| similarity(&needle, &candidate))
                .fold(0.0_f64, f64::max);
            let better = match best {
                Some((_, best_score)) => score > best_score + SIMILARITY_TIE_EPSILON,
                None => true,
            };
            if better {
                best = Some((order, score));
            }
        }

        match best {
            Some((order, score)) if score >= self.threshold => {
                tracing::trace!("Fuzzy match '{}' -> '{}' ({:.3})", raw_label, entries[order].canonical, score);
                LabelMatch::Fuzzy { label: label_at(order), score }
            }
            Some((order, score)) => LabelMatch::Unmatched {
                closest: Some((label_at(order), score)),
            },
            None => LabelMatch::Unmatched { closest: None },
        }
    }

    /// How many of the given labels land in the statement's vocabulary.
    pub fn count_matches<'a, I>(&self, statement: StatementType, labels: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels
            .into_iter()
            .filter(|label| self.match_label(statement, label).label().is_some())
            .count()
    }
}

// --- Helpers ---

/// Case-insensitive, whitespace-collapsed, punctuation-stripped form of a
/// label, with footnote markers and note references removed.
pub fn normalize_label(raw: &str) -> String {
    let without_notes = LABEL_FOOTNOTE_RE.replace_all(raw, " ");
    let mut out = String::with_capacity(without_notes.len());
    for c in without_notes.chars() {
        if c == '&' {
            out.push_str(" and ");
        } else if c.is_alphanumeric() && !matches!(c, '⁰'..='⁹' | '¹' | '²' | '³') {
            out.extend(c.to_lowercase());
        } else if c == '\'' || c == '’' {
            // stockholders' -> stockholders
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key terms of a normalized label, in `KEY_TERM_GROUPS` order. "non current"
/// and "noncurrent" both read as `noncurrent`.
fn key_terms(normalized: &str) -> Vec<&'static str> {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut found = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let word = match *word {
            "current" if i > 0 && words[i - 1] == "non" => "noncurrent",
            other => other,
        };
        for group in KEY_TERM_GROUPS {
            if let Some(term) = group.iter().find(|t| **t == word) {
                if !found.contains(term) {
                    found.push(*term);
                }
            }
        }
    }
    found.sort_unstable();
    found
}

/// Normalized Levenshtein similarity over characters: 1.0 for identical
/// strings, 0.0 for completely different ones.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[b.len()] as f64 / longest as f64
}
