//! Section boundary detection over noisy OCR page text.
//!
//! A document's target section (the Description body) is located by looking
//! only at a short cleaned *header* of each page: the first few dozen
//! characters of its recognised text. A page whose header matches a start
//! keyword opens the section; the next page whose header matches an end
//! keyword closes it and is itself excluded.
//!
//! Keywords are matched tolerantly: OCR often inserts spaces between CJK
//! characters, so `说明书` also matches `说 明 书`. Each keyword set may also
//! carry case-insensitive English fallbacks (`Description`, `Drawings`).
//!
//! ```text
//!            start header              end header
//!  Seeking ───────────────▶ InSection ────────────▶ Done
//!   │  ▲                      │  ▲
//!   └──┘ discard page         └──┘ accumulate page
//! ```

use crate::error::BatchError;
use crate::output::DocumentId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Rules ────────────────────────────────────────────────────────────────

/// Keywords signalling one boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    /// Keywords matched with arbitrary whitespace between their characters.
    pub tolerant: Vec<String>,
    /// Keywords matched case-insensitively as written.
    pub fallback: Vec<String>,
}

impl KeywordSet {
    pub fn new<T, F>(tolerant: T, fallback: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            tolerant: tolerant.into_iter().map(Into::into).collect(),
            fallback: fallback.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile into a single alternation.
    ///
    /// `说明书` becomes `说\s*明\s*书`; fallbacks become `(?i:Description)`.
    pub fn to_pattern(&self) -> String {
        let tolerant = self.tolerant.iter().filter(|k| !k.trim().is_empty()).map(|k| {
            k.chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| regex::escape(&c.to_string()))
                .collect::<Vec<_>>()
                .join(r"\s*")
        });
        let fallback = self
            .fallback
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| format!("(?i:{})", regex::escape(k.trim())));
        tolerant.chain(fallback).collect::<Vec<_>>().join("|")
    }

    fn compile(&self) -> Result<Regex, BatchError> {
        let pattern = self.to_pattern();
        if pattern.is_empty() {
            return Err(BatchError::InvalidPattern {
                pattern,
                detail: "keyword set is empty".into(),
            });
        }
        Regex::new(&pattern).map_err(|e| BatchError::InvalidPattern {
            pattern,
            detail: e.to_string(),
        })
    }
}

/// Start/end keywords and header length for the boundary detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRules {
    /// Characters of recognised text inspected per page. Default: 50.
    pub header_chars: usize,
    /// Keywords that open the section.
    pub start: KeywordSet,
    /// Keywords that open the *following* section and so close this one.
    pub end: KeywordSet,
}

impl Default for SectionRules {
    fn default() -> Self {
        Self {
            header_chars: 50,
            start: KeywordSet::new(["说明书"], ["Description"]),
            end: KeywordSet::new(["说明书附图"], ["Drawings"]),
        }
    }
}

impl SectionRules {
    /// Check that both keyword sets compile and the header is non-empty.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.header_chars == 0 {
            return Err(BatchError::InvalidConfig(
                "Section header length must be ≥ 1 character".into(),
            ));
        }
        self.start.compile()?;
        self.end.compile()?;
        Ok(())
    }
}

// ── Detector ─────────────────────────────────────────────────────────────

/// Compiled [`SectionRules`]; cheap to share between documents.
#[derive(Debug, Clone)]
pub struct SectionDetector {
    header_chars: usize,
    start: Regex,
    end: Regex,
}

impl SectionDetector {
    pub fn new(rules: &SectionRules) -> Result<Self, BatchError> {
        rules.validate()?;
        Ok(Self {
            header_chars: rules.header_chars,
            start: rules.start.compile()?,
            end: rules.end.compile()?,
        })
    }

    /// Normalised header of a page: the first `header_chars` characters with
    /// everything except CJK ideographs, ASCII letters/digits and whitespace
    /// removed, whitespace runs collapsed to one space.
    pub fn header(&self, raw_text: &str) -> String {
        let kept: String = raw_text
            .chars()
            .take(self.header_chars)
            .filter(|c| is_cjk(*c) || c.is_ascii_alphanumeric() || c.is_whitespace())
            .collect();
        kept.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Build a [`PageText`] for page `index`.
    pub fn page(&self, index: usize, raw_text: impl Into<String>) -> PageText {
        let raw_text = raw_text.into();
        let header = self.header(&raw_text);
        PageText {
            index,
            raw_text,
            header,
        }
    }

    pub fn is_start(&self, header: &str) -> bool {
        self.start.is_match(header)
    }

    pub fn is_end(&self, header: &str) -> bool {
        self.end.is_match(header)
    }

    /// Start a scan of one document.
    pub fn scanner(&self, document_id: DocumentId) -> SectionScanner<'_> {
        SectionScanner {
            detector: self,
            document_id,
            state: ScanState::Seeking,
            start_page: None,
            end_page: None,
            text: String::new(),
        }
    }

    /// Run a whole document's pages through a fresh scanner.
    pub fn scan<I, S>(&self, document_id: DocumentId, pages: I) -> SectionScan
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scanner = self.scanner(document_id);
        for (index, text) in pages.into_iter().enumerate() {
            if scanner.feed(&self.page(index, text)) == ScanState::Done {
                break;
            }
        }
        scanner.finish()
    }
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// One page of recognised text, with its normalised header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Zero-based page ordinal.
    pub index: usize,
    pub raw_text: String,
    pub header: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Seeking,
    InSection,
    /// Terminal; further pages are ignored.
    Done,
}

/// Pages `[start_page, end_page)` of one document and their joined text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    pub document_id: DocumentId,
    pub start_page: usize,
    /// Exclusive end. `None` when the document ended inside the section.
    pub end_page: Option<usize>,
    /// Raw text of every in-span page, concatenated and trimmed.
    pub text: String,
}

/// Result of scanning one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionScan {
    Found(SectionSpan),
    /// No page header ever matched a start keyword.
    NotFound,
}

/// Incremental per-document state machine.
///
/// Feed pages in order; stop feeding once [`ScanState::Done`] is returned.
#[derive(Debug)]
pub struct SectionScanner<'a> {
    detector: &'a SectionDetector,
    document_id: DocumentId,
    state: ScanState,
    start_page: Option<usize>,
    end_page: Option<usize>,
    text: String,
}

impl SectionScanner<'_> {
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Advance the state machine by one page.
    pub fn feed(&mut self, page: &PageText) -> ScanState {
        match self.state {
            ScanState::Seeking => {
                // A "说明书附图" header also contains "说明书"; while seeking,
                // the start keyword wins.
                if self.detector.is_start(&page.header) {
                    debug!(doc = %self.document_id, page = page.index, header = %page.header, "section start");
                    self.state = ScanState::InSection;
                    self.start_page = Some(page.index);
                    self.text.push_str(&page.raw_text);
                }
            }
            ScanState::InSection => {
                if self.detector.is_end(&page.header) {
                    debug!(doc = %self.document_id, page = page.index, header = %page.header, "section end");
                    self.state = ScanState::Done;
                    self.end_page = Some(page.index);
                } else {
                    self.text.push_str(&page.raw_text);
                }
            }
            ScanState::Done => {}
        }
        self.state
    }

    /// Close the scan.
    ///
    /// A document that ends while still inside the section yields the pages
    /// accumulated so far with `end_page = None`.
    pub fn finish(self) -> SectionScan {
        match self.start_page {
            None => SectionScan::NotFound,
            Some(start_page) => SectionScan::Found(SectionSpan {
                document_id: self.document_id,
                start_page,
                end_page: self.end_page,
                text: self.text.trim().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SectionDetector {
        SectionDetector::new(&SectionRules::default()).unwrap()
    }

    fn id() -> DocumentId {
        DocumentId::new("CN101234567A")
    }

    #[test]
    fn span_covers_pages_between_start_and_end() {
        let pages = ["无关内容", "说明书\n正文第一段", "正文第二段", "说明书附图\n图1"];
        let SectionScan::Found(span) = detector().scan(id(), pages) else {
            panic!("section should be found");
        };
        assert_eq!(span.start_page, 1);
        assert_eq!(span.end_page, Some(3));
        assert_eq!(span.text, "说明书\n正文第一段正文第二段");
        assert!(!span.text.contains("无关内容"));
        assert!(!span.text.contains("图1"));
    }

    #[test]
    fn tolerant_match_accepts_injected_spaces() {
        let d = detector();
        assert!(d.is_start(&d.header("说 明 书")));
        assert!(d.is_start(&d.header("说明书")));
        assert!(d.is_end(&d.header("说  明 书 附\t图")));
    }

    #[test]
    fn english_fallback_is_case_insensitive() {
        let d = detector();
        assert!(d.is_start(&d.header("DESCRIPTION of the invention")));
        assert!(d.is_end(&d.header("drawings")));
    }

    #[test]
    fn never_entered_section_is_not_found() {
        let pages = ["权利要求书", "1. 一种装置", "摘要"];
        assert_eq!(detector().scan(id(), pages), SectionScan::NotFound);
    }

    #[test]
    fn document_ending_inside_section_keeps_text() {
        let pages = ["封面", "说明书 第一页", "第二页  "];
        let SectionScan::Found(span) = detector().scan(id(), pages) else {
            panic!("section should be found");
        };
        assert_eq!(span.start_page, 1);
        assert_eq!(span.end_page, None);
        assert_eq!(span.text, "说明书 第一页第二页");
    }

    #[test]
    fn drawings_header_while_seeking_opens_the_section() {
        let pages = ["说明书附图", "正文"];
        let SectionScan::Found(span) = detector().scan(id(), pages) else {
            panic!("section should be found");
        };
        assert_eq!(span.start_page, 0);
    }

    #[test]
    fn keyword_beyond_header_is_ignored() {
        let body = format!("{}说明书", "甲".repeat(60));
        assert_eq!(detector().scan(id(), [body]), SectionScan::NotFound);
    }

    #[test]
    fn header_strips_punctuation_and_collapses_whitespace() {
        let d = detector();
        assert_eq!(d.header("【说明书】\n\n  第 1 页，共3页"), "说明书 第 1 页共3页");
    }

    #[test]
    fn scanner_stops_after_done() {
        let d = detector();
        let mut s = d.scanner(id());
        assert_eq!(s.feed(&d.page(0, "说明书")), ScanState::InSection);
        assert_eq!(s.feed(&d.page(1, "Drawings")), ScanState::Done);
        assert_eq!(s.feed(&d.page(2, "说明书 again")), ScanState::Done);
        let SectionScan::Found(span) = s.finish() else {
            panic!("section should be found");
        };
        assert_eq!(span.text, "说明书");
    }

    #[test]
    fn empty_keyword_set_is_rejected() {
        let rules = SectionRules {
            start: KeywordSet::new(Vec::<String>::new(), Vec::<String>::new()),
            ..SectionRules::default()
        };
        assert!(matches!(rules.validate(), Err(BatchError::InvalidPattern { .. })));
    }

    #[test]
    fn keywords_are_escaped() {
        let set = KeywordSet::new(["a.b"], ["c+d"]);
        let re = Regex::new(&set.to_pattern()).unwrap();
        assert!(re.is_match("a . b"));
        assert!(!re.is_match("axb"));
        assert!(re.is_match("C+D"));
    }
}
