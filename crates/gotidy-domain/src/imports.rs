//! Comment stripping inside Go `import ( … )` blocks.
//!
//! The rewrite is confined to the block span: from the `import (` opener at
//! the start of a line up to and including the first line that begins with
//! `)`. Everything outside a span is copied through byte for byte.

use std::ops::Range;
use std::sync::LazyLock;

use regex::bytes::{Regex, RegexBuilder};

/// Build a byte regex from a pattern literal.
///
/// # Panics
///
/// Panics if the pattern is invalid; all patterns are compile-time constants.
fn build_re(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .unicode(false)
        .build()
        .unwrap_or_else(|err| panic!("invalid import pattern {pattern:?}: {err}"))
}

/// `import (` alone on its line, optionally followed by a line comment.
static IMPORT_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(r"(?m)^import[ \t]*\([ \t]*(?://[^\n]*)?\r?\n"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(r"\s//[^\n]*|/\*(?s:.)*?\*/"));

static BLANK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| build_re(r"(?m)^[ \t]*\r?\n"));

/// Byte ranges of every complete `import ( … )` block in `source`.
#[must_use]
pub fn import_block_spans(source: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(open) = IMPORT_OPEN_RE.find_at(source, from) {
        let Some(close) = closing_paren(source, open.end()) else {
            break;
        };
        spans.push(open.start()..close + 1);
        from = close + 1;
    }
    spans
}

/// Offset of the first `)` that starts a line at or after `line_start`.
fn closing_paren(source: &[u8], mut line_start: usize) -> Option<usize> {
    while line_start < source.len() {
        let line_end = source[line_start..]
            .iter()
            .position(|byte| *byte == b'\n')
            .map_or(source.len(), |offset| line_start + offset);
        let line = &source[line_start..line_end];
        if let Some(indent) = line.iter().position(|byte| !matches!(byte, b' ' | b'\t')) {
            if line[indent] == b')' {
                return Some(line_start + indent);
            }
        }
        line_start = line_end + 1;
    }
    None
}

#[must_use]
pub fn has_import_block(source: &[u8]) -> bool {
    !import_block_spans(source).is_empty()
}

/// Remove line and block comments inside import blocks, then drop the
/// whitespace-only lines left behind. Bytes outside the blocks are untouched.
#[must_use]
pub fn strip_import_comments(source: &[u8]) -> Vec<u8> {
    let spans = import_block_spans(source);
    if spans.is_empty() {
        return source.to_vec();
    }

    let mut out = Vec::with_capacity(source.len());
    let mut cursor = 0;
    for span in spans {
        out.extend_from_slice(&source[cursor..span.start]);
        let stripped = COMMENT_RE.replace_all(&source[span.clone()], &b""[..]);
        let collapsed = BLANK_LINE_RE.replace_all(&stripped, &b""[..]);
        out.extend_from_slice(&collapsed);
        cursor = span.end;
    }
    out.extend_from_slice(&source[cursor..]);
    out
}
