//! Private CFI segments: `|[nav~key~value][nav~key~value]`.
//!
//! The block starts at the first `|` outside an assertion and runs to the end
//! of the parenthesized content. It is removed before the base grammar parses
//! the rest, so generic CFI consumers never see it.

use core::fmt;

use super::{CfiError, CfiErrorKind};

const NAMESPACE: &str = "nav";

/// One `[nav~key~value]` segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateSegment {
    pub key: String,
    pub value: String,
}

/// Split `inner` into the base CFI text and its private segments.
///
/// `origin` is the byte position of `inner` in the original input, used for
/// error positions.
pub(super) fn strip(inner: &str, origin: usize) -> Result<(&str, Vec<PrivateSegment>), CfiError> {
    let Some(split) = find_block_start(inner) else {
        return Ok((inner, Vec::new()));
    };
    let base = &inner[..split];
    let block = &inner[split + 1..];
    let segments = parse_block(block, origin + split + 1)?;
    Ok((base, segments))
}

fn find_block_start(inner: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (idx, ch) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '^' => escaped = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

fn parse_block(block: &str, origin: usize) -> Result<Vec<PrivateSegment>, CfiError> {
    let invalid = |at: usize| CfiError {
        kind: CfiErrorKind::InvalidExtension,
        position: origin + at,
    };
    if block.is_empty() {
        return Err(invalid(0));
    }

    let mut segments = Vec::with_capacity(2);
    let mut rest = block;
    let mut consumed = 0usize;
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(invalid(consumed));
        }
        let close = find_unescaped(rest, ']').ok_or_else(|| invalid(consumed))?;
        // Separators are found before unescaping so keys may carry `^~`.
        let body = &rest[1..close];
        let (namespace, tail) = split_unescaped(body, '~').ok_or_else(|| invalid(consumed))?;
        let (key, value) = split_unescaped(tail, '~').ok_or_else(|| invalid(consumed))?;
        if unescape(namespace) != NAMESPACE || key.is_empty() {
            return Err(invalid(consumed));
        }
        segments.push(PrivateSegment {
            key: unescape(key),
            value: unescape(value),
        });
        consumed += close + 1;
        rest = &rest[close + 1..];
    }
    Ok(segments)
}

fn find_unescaped(text: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '^' {
            escaped = true;
        } else if ch == target {
            return Some(idx);
        }
    }
    None
}

fn split_unescaped(text: &str, separator: char) -> Option<(&str, &str)> {
    let at = find_unescaped(text, separator)?;
    Some((&text[..at], &text[at + separator.len_utf8()..]))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut escaped = false;
    for ch in text.chars() {
        if !escaped && ch == '^' {
            escaped = true;
            continue;
        }
        escaped = false;
        out.push(ch);
    }
    out
}

pub(super) fn write_segments(
    f: &mut fmt::Formatter<'_>,
    segments: &[PrivateSegment],
) -> fmt::Result {
    if segments.is_empty() {
        return Ok(());
    }
    f.write_str("|")?;
    for segment in segments {
        write!(f, "[{}~", NAMESPACE)?;
        write_escaped(f, &segment.key)?;
        f.write_str("~")?;
        write_escaped(f, &segment.value)?;
        f.write_str("]")?;
    }
    Ok(())
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if matches!(ch, '^' | '[' | ']' | '~') {
            f.write_str("^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}
