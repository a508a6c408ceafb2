//! Post-processing: deterministic cleanup of raw Tesseract output.
//!
//! Tesseract terminates every page with a form feed, emits CRLF on some
//! builds, and occasionally passes zero-width characters through from the
//! language model. None of that belongs in the result log.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF/CR → LF)
//! 2. Drop form feeds
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Collapse 3+ consecutive blank lines down to 2
//! 6. End non-empty text with exactly one newline, so consecutive pages
//!    concatenate on separate lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one region's OCR output.
pub fn clean_ocr_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = s.replace('\u{000C}', "");
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tesseract_page_terminator() {
        assert_eq!(clean_ocr_text("说明书\n正文\n\n\u{000C}"), "说明书\n正文\n");
    }

    #[test]
    fn normalises_crlf_and_trailing_spaces() {
        assert_eq!(clean_ocr_text("a  \r\nb\t\rc"), "a\nb\nc\n");
    }

    #[test]
    fn removes_invisible() {
        assert_eq!(clean_ocr_text("发\u{200B}明\u{FEFF}内容"), "发明内容\n");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_ocr_text("a\n\n\n\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn blank_page_is_empty() {
        assert_eq!(clean_ocr_text(" \n\u{000C}"), "");
    }
}
