// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured-result extraction from mixed agent output.
//!
//! Agents interleave prose, tool chatter, and JSON snippets on one stream.
//! The scanner collects candidate fragments from fenced code blocks and from
//! balanced brace/bracket spans (string- and escape-aware, so braces inside
//! string literals never confuse the depth count), parses each as JSON, and
//! returns the last object that parses. Last wins: an agent may print
//! several JSON snippets, but only its final status block is authoritative.

use serde_json::Value;

/// Last parsable JSON object in `text`, by scan order.
pub fn extract_last_json(text: &str) -> Option<Value> {
    let mut candidates: Vec<(usize, String)> = fenced_blocks(text);
    for (start, span) in balanced_spans(text) {
        candidates.push((start, span.to_string()));
    }
    candidates.sort_by_key(|(start, _)| *start);

    let mut last = None;
    for (_, candidate) in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) {
            if value.is_object() {
                last = Some(value);
            }
        }
    }
    last
}

/// Contents of ``` fenced blocks, keyed by the byte offset of the fence.
fn fenced_blocks(text: &str) -> Vec<(usize, String)> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, String)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            match open.take() {
                Some(block) => blocks.push(block),
                // Language tag (```json) is part of the fence line, not content.
                None => open = Some((offset, String::new())),
            }
        } else if let Some((_, content)) = open.as_mut() {
            content.push_str(line);
        }
        offset += line.len();
    }
    blocks
}

/// Balanced `{...}`/`[...]` spans, non-overlapping, in document order.
fn balanced_spans(text: &str) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = span_end(bytes, i) {
                spans.push((i, &text[i..end]));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    spans
}

/// Byte offset one past the close that balances the open at `start`, if any.
fn span_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (off, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + off + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
