/*
 * header.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Raven, a multi-tenant IMAP4rev1 mail-access server.
 *
 * Raven is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Raven is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Raven.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Header-field extraction for `BODY[HEADER]` / `BODY[HEADER.FIELDS (...)]` /
//! `BODY[HEADER.FIELDS.NOT (...)]` (RFC 3501 §6.4.5). Works directly on the
//! raw header block bytes rather than the MIME event parser, since FETCH
//! needs the original folded text back, not parsed values.

/// Split `raw` into its header block and return each header as `(name, value)`,
/// unfolding continuation lines (those starting with SP or TAB) into the
/// previous header's value. Line endings (CRLF or bare LF) are stripped.
pub fn folded_headers(raw: &[u8]) -> Vec<(String, String)> {
    let header_block = header_block(raw);
    let mut out: Vec<(String, String)> = Vec::new();
    for line in split_lines(header_block) {
        if line.is_empty() {
            continue;
        }
        if (line[0] == b' ' || line[0] == b'\t') && !out.is_empty() {
            let last = out.last_mut().unwrap();
            last.1.push(' ');
            last.1.push_str(String::from_utf8_lossy(trim(line)).trim());
            continue;
        }
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            let value = String::from_utf8_lossy(trim(&line[colon + 1..])).trim().to_string();
            out.push((name, value));
        }
    }
    out
}

/// Build the RFC 3501 `HEADER.FIELDS`/`HEADER.FIELDS.NOT` byte block: selected
/// headers in their original order, each `Name: value\r\n`, terminated by a
/// trailing blank line. `names` is matched case-insensitively; `not` inverts
/// the selection (`HEADER.FIELDS.NOT`). An empty `names` with `not == false`
/// yields just the trailing blank line, matching plain `BODY[HEADER]` when no
/// field list narrows it (callers wanting the whole header block should use
/// `folded_headers` directly instead).
pub fn extract_header_fields(raw: &[u8], names: &[String], not: bool) -> Vec<u8> {
    let wanted: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
    let mut out = Vec::new();
    for (name, value) in folded_headers(raw) {
        let matches = wanted.contains(&name.to_ascii_lowercase());
        if matches != not {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn header_block(raw: &[u8]) -> &[u8] {
    if let Some(i) = find(raw, b"\r\n\r\n") {
        return &raw[..i + 2];
    }
    if let Some(i) = find(raw, b"\n\n") {
        return &raw[..i + 1];
    }
    raw
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split_lines(block: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 0..block.len() {
        if block[i] == b'\n' {
            let end = if i > start && block[i - 1] == b'\r' { i - 1 } else { i };
            out.push(&block[start..end]);
            start = i + 1;
        }
    }
    if start < block.len() {
        out.push(&block[start..]);
    }
    out
}

fn trim(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();
    while start < end && (line[start] == b' ' || line[start] == b'\t') {
        start += 1;
    }
    while end > start && (line[end - 1] == b' ' || line[end - 1] == b'\t') {
        end -= 1;
    }
    &line[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: Hi\r\n there\r\nDate: Fri, 21 Nov 1997 09:55:06 -0600\r\n\r\nBody text\r\n";

    #[test]
    fn folds_continuation_lines() {
        let headers = folded_headers(RAW);
        let subject = headers.iter().find(|(n, _)| n == "Subject").unwrap();
        assert_eq!(subject.1, "Hi there");
    }

    #[test]
    fn extracts_only_requested_fields_in_order() {
        let names = vec!["subject".to_string(), "from".to_string()];
        let block = extract_header_fields(RAW, &names, false);
        let text = String::from_utf8(block).unwrap();
        assert!(text.starts_with("Subject: Hi there\r\nFrom: Alice <alice@example.com>\r\n\r\n") || text.starts_with("From: Alice <alice@example.com>\r\nSubject: Hi there\r\n\r\n"));
        assert!(!text.contains("To:"));
        assert!(!text.contains("Date:"));
    }

    #[test]
    fn header_fields_not_excludes_named_fields() {
        let names = vec!["date".to_string()];
        let block = extract_header_fields(RAW, &names, true);
        let text = String::from_utf8(block).unwrap();
        assert!(!text.contains("Date:"));
        assert!(text.contains("From:"));
        assert!(text.contains("To:"));
        assert!(text.contains("Subject:"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn plain_header_block_preserves_order() {
        let all_names: Vec<String> = Vec::new();
        let block = extract_header_fields(RAW, &all_names, true);
        let text = String::from_utf8(block).unwrap();
        let from_pos = text.find("From:").unwrap();
        let to_pos = text.find("To:").unwrap();
        let subject_pos = text.find("Subject:").unwrap();
        let date_pos = text.find("Date:").unwrap();
        assert!(from_pos < to_pos && to_pos < subject_pos && subject_pos < date_pos);
    }

    #[test]
    fn handles_bare_lf_line_endings() {
        let raw = b"From: a@b.com\nSubject: test\n\nBody\n";
        let headers = folded_headers(raw);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "From");
        assert_eq!(headers[1].1, "test");
    }
}
