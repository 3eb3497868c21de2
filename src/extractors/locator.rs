// src/extractors/locator.rs

// --- Imports ---
use crate::document::models::{Document, StatementType};
use crate::extractors::classifier::{parse_year_header, split_row};
use crate::extractors::vocabulary::Vocabulary;
use crate::utils::warnings::{ExtractionWarning, WarningKind, WarningLog};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Constants ---
/// Heading lines longer than this are narrative text, not table titles.
pub const DEFAULT_MAX_HEADING_WORDS: usize = 14;
/// Non-blank lines at the top of a page searched for a "(continued)" heading.
const CONTINUATION_LOOKAHEAD: usize = 4;
/// Lines after the heading searched for the unit-scale caption.
const CAPTION_LOOKAHEAD: usize = 8;
/// Lines above the heading also offered as caption (company name, units).
const CAPTION_LOOKBEHIND: usize = 2;
/// Non-blank lines at the top of a page searched for a ToC title.
const TOC_TITLE_LOOKAHEAD: usize = 5;

// --- Heading Pattern Sources ---
// Kept as plain strings so the debug dump can highlight the same patterns.
const BALANCE_SHEET_HEADING: &str =
    r"(?i)\b(?:balance\s+sheets?|statements?\s+of\s+financial\s+(?:position|condition))\b";
const INCOME_STATEMENT_HEADING: &str = r"(?i)\b(?:statements?\s+of\s+(?:consolidated\s+)?(?:operations|income|earnings|profit\s+or\s+loss)|income\s+statements?|profit\s+and\s+loss\s+(?:account|statement)s?)\b";
const CASH_FLOW_HEADING: &str =
    r"(?i)\b(?:statements?\s+of\s+cash\s+flows?|cash\s+flows?\s+statements?)\b";
// Other primary statements and the notes: they end a region but are not targets
const OTHER_STATEMENT_HEADING: &str = r"(?i)\b(?:statements?\s+of\s+(?:comprehensive\s+(?:income|loss)|changes\s+in\s+(?:stockholders|shareholders)['’]?\s+equity|(?:stockholders|shareholders)['’]?\s+equity|changes\s+in\s+equity)|notes\s+to\s+(?:the\s+)?(?:consolidated\s+)?financial\s+statements)\b";
const REGION_END_MARKER: &str =
    r"(?i)^\s*(?:the\s+accompanying\s+notes|see\s+(?:the\s+)?accompanying\s+notes)";
const TOC_PAGE_TITLE: &str =
    r"(?i)\b(?:table\s+of\s+contents|index\s+to\s+(?:the\s+)?(?:consolidated\s+)?financial\s+statements)\b";

/// Pattern/label pairs for the annotated debug dump.
pub const DEBUG_PATTERNS: &[(&str, &str)] = &[
    (BALANCE_SHEET_HEADING, "balance_sheet"),
    (INCOME_STATEMENT_HEADING, "income_statement"),
    (CASH_FLOW_HEADING, "cash_flow"),
    (OTHER_STATEMENT_HEADING, "other"),
    (REGION_END_MARKER, "end"),
    (TOC_PAGE_TITLE, "toc"),
];

// --- Regex Patterns (Lazy Static) ---
static STATEMENT_HEADING_RE: Lazy<Vec<(StatementType, Regex)>> = Lazy::new(|| {
    [
        (StatementType::BalanceSheet, BALANCE_SHEET_HEADING),
        (StatementType::IncomeStatement, INCOME_STATEMENT_HEADING),
        (StatementType::CashFlowStatement, CASH_FLOW_HEADING),
    ]
    .iter()
    .map(|(st, pat)| (*st, Regex::new(pat).expect("Failed to compile STATEMENT_HEADING_RE")))
    .collect()
});

static OTHER_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(OTHER_STATEMENT_HEADING).expect("Failed to compile OTHER_HEADING_RE"));

static END_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(REGION_END_MARKER).expect("Failed to compile END_MARKER_RE"));

static TOC_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(TOC_PAGE_TITLE).expect("Failed to compile TOC_TITLE_RE"));

static CONTINUED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcontinued\b").expect("Failed to compile CONTINUED_RE"));

// "....... 45", "… F-4", or a bare trailing page reference
static TOC_LEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\.{3,}|…)").expect("Failed to compile TOC_LEADER_RE"));
static TOC_PAGE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s(?:\d{1,3}|[a-z]-\d{1,3})\s*$").expect("Failed to compile TOC_PAGE_REF_RE")
});

// --- Data Structures ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based page number.
    pub page: usize,
    /// 0-based line index within the page.
    pub line_index: usize,
    pub text: String,
}

/// A block of lines believed to hold one statement table.
#[derive(Debug, Clone)]
pub struct RawTableRegion {
    pub document: String,
    /// `None` when the heading is a statement this crate does not target.
    pub statement_type: Option<StatementType>,
    pub heading: String,
    pub first_page: usize,
    pub last_page: usize,
    /// Heading, the lines right below it, then the lines right above it.
    pub caption_lines: Vec<String>,
    pub lines: Vec<RawLine>,
}

#[derive(Debug, Default)]
pub struct LocatorOutput {
    /// One region per found target statement, plus unmatched regions.
    pub regions: Vec<RawTableRegion>,
    pub missing: Vec<StatementType>,
    pub warnings: WarningLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heading {
    Statement { statement: StatementType, continued: bool },
    Other,
}

// --- Main Locator Structure ---
pub struct TableLocator {
    vocabulary: Vocabulary,
    targets: Vec<StatementType>,
    max_heading_words: usize,
}

impl TableLocator {
    pub fn new(vocabulary: Vocabulary, targets: Vec<StatementType>, max_heading_words: usize) -> Self {
        Self {
            vocabulary,
            targets,
            max_heading_words,
        }
    }

    /// Finds the target statement tables in a document. Statements that are
    /// never found are reported as missing, never as an error.
    pub fn locate(&self, document: &Document) -> LocatorOutput {
        tracing::debug!("Locating statement tables in {} ({} pages)", document.source_name(), document.page_count());

        // 1. Split pages into lines once
        let pages: Vec<Vec<&str>> = document.pages().map(|(_, text)| text.lines().collect()).collect();
        let toc_pages: Vec<bool> = pages.iter().map(|lines| is_toc_page(lines)).collect();

        // 2. Collect candidate regions in document order
        let mut candidates: Vec<(RawTableRegion, usize)> = Vec::new();
        let mut unmatched: Vec<RawTableRegion> = Vec::new();
        for (page_idx, lines) in pages.iter().enumerate() {
            if toc_pages[page_idx] {
                tracing::trace!("Skipping page {}: table of contents", page_idx + 1);
                continue;
            }
            for (line_idx, line) in lines.iter().enumerate() {
                match self.classify_heading(line) {
                    Some(Heading::Statement { continued: true, .. }) => {
                        // continuation pages are stitched onto the region that precedes them
                        continue;
                    }
                    Some(Heading::Statement { statement, .. }) => {
                        let region = self.capture_region(document, &pages, page_idx, line_idx, Some(statement));
                        let score = self.score_region(statement, &region);
                        tracing::debug!(
                            "Candidate {} region at page {} line {}: {} rows, {} vocabulary hits",
                            statement, page_idx + 1, line_idx, region.lines.len(), score
                        );
                        candidates.push((region, score));
                    }
                    Some(Heading::Other) => {
                        let region = self.capture_region(document, &pages, page_idx, line_idx, None);
                        tracing::trace!("Unmatched statement heading at page {}: '{}'", page_idx + 1, line.trim());
                        unmatched.push(region);
                    }
                    None => {}
                }
            }
        }

        // 3. Pick the best candidate per target statement
        let mut output = LocatorOutput::default();
        for target in &self.targets {
            let mut best: Option<(RawTableRegion, usize)> = None;
            for (region, score) in candidates.iter().filter(|(r, _)| r.statement_type == Some(*target)) {
                // strictly greater: ties stay with the earliest page
                if best.as_ref().map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((region.clone(), *score));
                }
            }
            match best {
                Some((region, score)) => {
                    tracing::info!(
                        "Selected {} in {} (pages {}-{}, {} vocabulary hits)",
                        target, document.source_name(), region.first_page, region.last_page, score
                    );
                    output.regions.push(region);
                }
                None => {
                    output.missing.push(*target);
                    output.warnings.push(
                        ExtractionWarning::new(
                            WarningKind::StructuralMiss,
                            format!("{} heading not found", target),
                        )
                        .in_document(document.source_name()),
                    );
                }
            }
        }
        output.regions.extend(unmatched);
        output
    }

    fn classify_heading(&self, line: &str) -> Option<Heading> {
        let text = line.trim();
        if text.is_empty() || text.ends_with('.') {
            return None;
        }
        if text.split_whitespace().count() > self.max_heading_words {
            return None;
        }
        if is_toc_line(text) {
            tracing::trace!("Skipping ToC-style heading line: '{}'", text);
            return None;
        }
        if let Some(statement) = heading_statement(text) {
            return Some(Heading::Statement {
                statement,
                continued: CONTINUED_RE.is_match(text),
            });
        }
        if OTHER_HEADING_RE.is_match(text) {
            return Some(Heading::Other);
        }
        None
    }

    fn is_boundary(&self, line: &str) -> bool {
        END_MARKER_RE.is_match(line) || self.classify_heading(line).is_some()
    }

    /// Captures the lines after a heading up to the next heading, an end
    /// marker, or the end of the page. A region running off the page carries
    /// on when the next page opens with the same heading marked "continued".
    fn capture_region(
        &self,
        document: &Document,
        pages: &[Vec<&str>],
        page_idx: usize,
        line_idx: usize,
        statement: Option<StatementType>,
    ) -> RawTableRegion {
        let heading = pages[page_idx][line_idx].trim().to_string();
        let mut lines = Vec::new();
        let mut page = page_idx;
        let mut start = line_idx + 1;

        loop {
            let mut hit_boundary = false;
            for (i, text) in pages[page].iter().enumerate().skip(start) {
                if self.is_boundary(text) {
                    hit_boundary = true;
                    break;
                }
                lines.push(RawLine {
                    page: page + 1,
                    line_index: i,
                    text: text.to_string(),
                });
            }
            if hit_boundary {
                break;
            }
            let next = statement
                .and_then(|st| pages.get(page + 1).and_then(|next| self.continuation_start(next, st)));
            match next {
                Some(next_start) => {
                    tracing::debug!("{} continues onto page {}", heading, page + 2);
                    page += 1;
                    start = next_start;
                }
                None => break,
            }
        }

        let caption_lines = collect_caption(&heading, &pages[page_idx], line_idx, &lines);
        RawTableRegion {
            document: document.source_name().to_string(),
            statement_type: statement,
            heading,
            first_page: page_idx + 1,
            last_page: page + 1,
            caption_lines,
            lines,
        }
    }

    fn continuation_start(&self, lines: &[&str], statement: StatementType) -> Option<usize> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .take(CONTINUATION_LOOKAHEAD)
            .find(|(_, l)| {
                self.classify_heading(l)
                    == Some(Heading::Statement {
                        statement,
                        continued: true,
                    })
            })
            .map(|(i, _)| i + 1)
    }

    /// Number of rows whose label lands in the statement's vocabulary.
    fn score_region(&self, statement: StatementType, region: &RawTableRegion) -> usize {
        let rows: Vec<_> = region.lines.iter().map(|l| split_row(&l.text)).collect();
        self.vocabulary.count_matches(
            statement,
            rows.iter()
                .filter(|r| !r.values.is_empty())
                .map(|r| r.label.as_str()),
        )
    }
}

/// Which target statement a heading line names, by pattern only.
pub fn heading_statement(line: &str) -> Option<StatementType> {
    STATEMENT_HEADING_RE
        .iter()
        .find(|(_, re)| re.is_match(line))
        .map(|(st, _)| *st)
}

/// Leader dots or a trailing page reference mark a table-of-contents entry.
fn is_toc_line(text: &str) -> bool {
    TOC_LEADER_RE.is_match(text) || TOC_PAGE_REF_RE.is_match(text)
}

fn is_toc_page(lines: &[&str]) -> bool {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .take(TOC_TITLE_LOOKAHEAD)
        .any(|l| TOC_TITLE_RE.is_match(l))
}

/// Heading first, then the lines below it up to the first data row, then the
/// lines just above it.
fn collect_caption(heading: &str, page_lines: &[&str], heading_idx: usize, region: &[RawLine]) -> Vec<String> {
    let mut caption = vec![heading.to_string()];
    for line in region.iter().take(CAPTION_LOOKAHEAD) {
        let row = split_row(&line.text);
        let is_data_row = !row.values.is_empty() && parse_year_header(&line.text).is_none();
        if is_data_row {
            break;
        }
        if !line.text.trim().is_empty() {
            caption.push(line.text.trim().to_string());
        }
    }
    caption.extend(
        page_lines[..heading_idx]
            .iter()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(CAPTION_LOOKBEHIND)
            .map(|l| l.trim().to_string()),
    );
    caption
}
