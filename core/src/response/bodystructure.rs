/*
 * bodystructure.rs
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

//! BODYSTRUCTURE/BODY construction (RFC 3501 §7.4.2) from a MIME tree.
//!
//! The underlying [`MimeParser`] emits a flat stream of `start_entity` /
//! `end_entity` events rather than an already-nested tree: a boundary line
//! that introduces a new part fires `start_entity` without a matching
//! `end_entity` for whatever part preceded it, and the part that declared a
//! `boundary` parameter never gets its own explicit close until its last
//! child (or, for an empty multipart, no child at all) is closed. We
//! reconstruct nesting here with one extra bit of state per open part:
//! `awaiting_first_child`, set when a part's Content-Type declares a
//! boundary and cleared the moment any event arrives for it again. If that
//! bit is set when the next `start_entity` fires, the new part nests under
//! the current top of the stack; otherwise the current top is finalized
//! (appended to its own parent's children) and the new part becomes its
//! sibling. `end_entity` always finalizes exactly the current top, moving
//! one level up the stack.

use crate::mime::{
    parse_content_disposition, parse_content_type, ContentDisposition, ContentType, MimeHandler,
    MimeParseError, MimeParser,
};

use super::{imap_quote, nil_or_quote};

#[derive(Default)]
struct PartNode {
    content_type: Option<ContentType>,
    disposition: Option<ContentDisposition>,
    transfer_encoding: Option<String>,
    content_id: Option<String>,
    description: Option<String>,
    body: Vec<u8>,
    children: Vec<PartNode>,
    awaiting_first_child: bool,
}

impl PartNode {
    fn is_multipart(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.is_primary_type("multipart"))
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct Collector {
    stack: Vec<PartNode>,
    root: Option<PartNode>,
}

impl Collector {
    fn finalize_top(&mut self) {
        if let Some(node) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => self.root = Some(node),
            }
        }
    }
}

impl MimeHandler for Collector {
    fn start_entity(&mut self, _boundary: Option<&str>) -> Result<(), MimeParseError> {
        let nests_as_child = self.stack.last().map(|t| t.awaiting_first_child).unwrap_or(true);
        if !nests_as_child {
            self.finalize_top();
        }
        if let Some(top) = self.stack.last_mut() {
            top.awaiting_first_child = false;
        }
        self.stack.push(PartNode::default());
        Ok(())
    }

    fn content_type(&mut self, value: &str) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            let ct = parse_content_type(value);
            top.awaiting_first_child = ct
                .as_ref()
                .map(|c| c.is_primary_type("multipart") && c.has_parameter("boundary"))
                .unwrap_or(false);
            top.content_type = ct;
        }
        Ok(())
    }

    fn content_disposition(&mut self, value: &str) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            top.disposition = parse_content_disposition(value);
        }
        Ok(())
    }

    fn content_transfer_encoding(&mut self, value: &str) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            top.transfer_encoding = Some(value.to_string());
        }
        Ok(())
    }

    fn content_id(&mut self, value: &str) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            top.content_id = Some(value.to_string());
        }
        Ok(())
    }

    fn content_description(&mut self, value: &str) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            top.description = Some(value.to_string());
        }
        Ok(())
    }

    fn body_content(&mut self, data: &[u8]) -> Result<(), MimeParseError> {
        if let Some(top) = self.stack.last_mut() {
            if !top.body.is_empty() {
                top.body.extend_from_slice(b"\r\n");
            }
            top.body.extend_from_slice(data);
        }
        Ok(())
    }

    fn end_entity(&mut self, _boundary: Option<&str>) -> Result<(), MimeParseError> {
        self.finalize_top();
        Ok(())
    }
}

fn param_list(params: &[(String, String)]) -> String {
    if params.is_empty() {
        return "NIL".to_string();
    }
    let mut out = String::from("(");
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&imap_quote(&k.to_ascii_uppercase()));
        out.push(' ');
        out.push_str(&imap_quote(v));
    }
    out.push(')');
    out
}

fn sorted_params(ct: Option<&ContentType>) -> Vec<(String, String)> {
    let mut v: Vec<(String, String)> = ct
        .map(|c| c.parameters().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default();
    v.sort_by(|a, b| a.0.cmp(&b.0));
    v
}

fn count_lines(body: &[u8]) -> usize {
    if body.is_empty() {
        return 0;
    }
    body.iter().filter(|&&b| b == b'\n').count() + 1
}

fn disposition_clause(node: &PartNode) -> String {
    match &node.disposition {
        Some(d) => {
            let mut params: Vec<(String, String)> =
                d.parameters().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            params.sort_by(|a, b| a.0.cmp(&b.0));
            format!(
                "({} {})",
                imap_quote(&d.get_disposition_type().to_ascii_uppercase()),
                param_list(&params)
            )
        }
        None => "NIL".to_string(),
    }
}

/// Build the full (BODYSTRUCTURE) form, including disposition/language/location.
pub fn build_bodystructure(raw: &[u8]) -> String {
    build(raw, true)
}

/// Build the bare (BODY) form, which omits extension data for BODYSTRUCTURE.
pub fn build_body(raw: &[u8]) -> String {
    build(raw, false)
}

fn build(raw: &[u8], extended: bool) -> String {
    let mut parser = MimeParser::new(Collector::default());
    let _ = parser.receive(raw);
    let _ = parser.close();
    let mut collector = parser.into_inner();
    while !collector.stack.is_empty() {
        collector.finalize_top();
    }
    match collector.root {
        Some(root) => render(&root, extended),
        None => "(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 0 0)".to_string(),
    }
}

fn render(node: &PartNode, extended: bool) -> String {
    if node.is_multipart() {
        return render_multipart(node, extended);
    }
    render_leaf(node, extended)
}

fn render_leaf(node: &PartNode, extended: bool) -> String {
    let (primary, sub) = node
        .content_type
        .as_ref()
        .map(|ct| (ct.get_primary_type().to_ascii_uppercase(), ct.get_sub_type().to_ascii_uppercase()))
        .unwrap_or_else(|| ("TEXT".to_string(), "PLAIN".to_string()));
    let params = sorted_params(node.content_type.as_ref());
    let encoding = node.transfer_encoding.as_deref().unwrap_or("7BIT").to_ascii_uppercase();
    let size = node.body.len();

    let mut out = format!(
        "({} {} {} {} {} {} {}",
        imap_quote(&primary),
        imap_quote(&sub),
        param_list(&params),
        nil_or_quote(node.content_id.as_deref()),
        nil_or_quote(node.description.as_deref()),
        imap_quote(&encoding),
        size,
    );
    if primary == "TEXT" {
        out.push(' ');
        out.push_str(&count_lines(&node.body).to_string());
    }
    if extended {
        out.push(' ');
        out.push_str(&disposition_clause(node));
        out.push_str(" NIL NIL");
    }
    out.push(')');
    out
}

fn render_multipart(node: &PartNode, extended: bool) -> String {
    let sub = node
        .content_type
        .as_ref()
        .map(|ct| ct.get_sub_type().to_ascii_uppercase())
        .unwrap_or_else(|| "MIXED".to_string());

    if node.children.is_empty() {
        // No boundary recognized on ingest (or a genuinely empty multipart):
        // fall back to a single leaf structure for the whole body per
        // the documented liberality for malformed multipart input.
        return render_leaf(node, extended);
    }

    let mut out = String::from("(");
    for child in &node.children {
        out.push_str(&render(child, extended));
    }
    out.push(' ');
    out.push_str(&imap_quote(&sub));
    if extended {
        let params = sorted_params(node.content_type.as_ref());
        out.push(' ');
        out.push_str(&param_list(&params));
        out.push(' ');
        out.push_str(&disposition_clause(node));
        out.push_str(" NIL NIL");
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_part_text_message() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 7bit\r\n\r\nHello\r\nworld\r\n";
        let bs = build_bodystructure(raw);
        assert!(bs.starts_with("(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\")"));
        assert!(bs.contains("\"7BIT\""));
        assert!(bs.ends_with("NIL NIL)"));
    }

    #[test]
    fn multipart_mixed_with_two_parts() {
        let raw = b"Content-Type: multipart/mixed; boundary=sep\r\n\r\n--sep\r\nContent-Type: text/plain\r\n\r\nPart one\r\n--sep\r\nContent-Type: text/html\r\n\r\n<p>hi</p>\r\n--sep--\r\n";
        let bs = build_bodystructure(raw);
        assert!(bs.starts_with("((\"TEXT\" \"PLAIN\""));
        assert!(bs.contains("(\"TEXT\" \"HTML\""));
        assert!(bs.contains("\"MIXED\""));
    }

    #[test]
    fn nested_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=A\r\n\r\n--A\r\nContent-Type: multipart/alternative; boundary=B\r\n\r\n--B\r\nContent-Type: text/plain\r\n\r\ntext\r\n--B\r\nContent-Type: text/html\r\n\r\n<b>html</b>\r\n--B--\r\n--A\r\nContent-Type: application/octet-stream\r\n\r\nbinary\r\n--A--\r\n";
        let bs = build_bodystructure(raw);
        assert!(bs.contains("\"ALTERNATIVE\""));
        assert!(bs.contains("\"MIXED\""));
        assert!(bs.contains("\"OCTET-STREAM\""));
    }

    #[test]
    fn body_form_omits_extension_data() {
        let raw = b"Content-Type: text/plain\r\n\r\nHello\r\n";
        let body = build_body(raw);
        assert!(!body.contains("NIL NIL)"));
    }

    #[test]
    fn multipart_without_boundary_falls_back_to_leaf() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nwhatever this is\r\n";
        let bs = build_bodystructure(raw);
        assert!(bs.starts_with("(\"MULTIPART\" \"MIXED\""));
    }
}
