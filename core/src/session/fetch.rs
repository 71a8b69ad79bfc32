/*
 * fetch.rs
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

//! FETCH / UID FETCH (§4.7, §4.8). The generic command tokenizer doesn't
//! understand `[`, `]`, `<`, `>` as grammar characters (they're ordinary atom
//! bytes to it), so a `BODY[HEADER.FIELDS (To From)]` argument arrives split
//! across several [`Token`]s with the field list as a nested list. We
//! reassemble the original text from the token sequence and run a dedicated
//! parser over that instead of trying to read section syntax off the token
//! tree directly.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{Codec, WireSegment};
use crate::error::Result;
use crate::mime::parse_content_type;
use crate::parser::sequence_set::SeqSet;
use crate::parser::Token;
use crate::response::header::folded_headers;
use crate::response::{build_body, build_bodystructure, build_envelope, extract_header_fields};
use crate::store::{FlagMode, IdSet, MessageView, UserStore};

use super::{Outcome, Session};

#[derive(Debug, Clone, PartialEq)]
enum PartSuffix {
    Mime,
    Header,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
enum SectionSpec {
    Whole,
    Header,
    HeaderFields { invert: bool, names: Vec<String> },
    Text,
    Part { path: Vec<u32>, suffix: Option<PartSuffix> },
}

#[derive(Debug, Clone, PartialEq)]
enum FetchItem {
    Uid,
    Flags,
    InternalDate,
    Rfc822Size,
    Envelope,
    Body { extended: bool },
    Rfc822,
    Rfc822Header,
    Rfc822Text,
    Section { peek: bool, spec: SectionSpec, partial: Option<(u64, u64)> },
}

fn render_token(t: &Token) -> String {
    match t {
        Token::Atom(s) => s.clone(),
        Token::QuotedString(s) => crate::response::imap_quote(s),
        Token::Literal(b) => crate::response::imap_quote(&String::from_utf8_lossy(b)),
        Token::List(items) => format!("({})", items.iter().map(render_token).collect::<Vec<_>>().join(" ")),
    }
}

fn render_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(render_token).collect::<Vec<_>>().join(" ")
}

/// Split on spaces outside of any `(`/`[`/`<` nesting (tracked as one
/// combined depth counter; the grammar never mismatches bracket kinds).
fn split_top_level(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' | '[' | '<' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '>' => {
                depth -= 1;
                current.push(c);
            }
            ' ' if depth <= 0 => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn parse_field_list(s: &str) -> Vec<String> {
    let inner = s.trim_start_matches('(').trim_end_matches(')');
    inner.split_whitespace().map(|s| s.trim_matches('"').to_string()).collect()
}

fn parse_section(spec: &str) -> Option<SectionSpec> {
    if spec.is_empty() {
        return Some(SectionSpec::Whole);
    }
    let upper = spec.to_ascii_uppercase();
    if upper == "HEADER" {
        return Some(SectionSpec::Header);
    }
    if upper == "TEXT" {
        return Some(SectionSpec::Text);
    }
    if let Some(rest) = upper.strip_prefix("HEADER.FIELDS.NOT") {
        let names = parse_field_list(spec[spec.len() - rest.len()..].trim());
        return Some(SectionSpec::HeaderFields { invert: true, names });
    }
    if let Some(rest) = upper.strip_prefix("HEADER.FIELDS") {
        let names = parse_field_list(spec[spec.len() - rest.len()..].trim());
        return Some(SectionSpec::HeaderFields { invert: false, names });
    }
    // Numeric part path, optionally suffixed with .MIME / .HEADER / .TEXT.
    let (path_str, suffix) = if let Some(p) = upper.strip_suffix(".MIME") {
        (&spec[..p.len()], Some(PartSuffix::Mime))
    } else if let Some(p) = upper.strip_suffix(".HEADER") {
        (&spec[..p.len()], Some(PartSuffix::Header))
    } else if let Some(p) = upper.strip_suffix(".TEXT") {
        (&spec[..p.len()], Some(PartSuffix::Text))
    } else {
        (spec, None)
    };
    let mut path = Vec::new();
    for seg in path_str.split('.') {
        path.push(seg.parse::<u32>().ok()?);
    }
    if path.is_empty() {
        return None;
    }
    Some(SectionSpec::Part { path, suffix })
}

fn parse_partial(tail: &str) -> Option<(u64, u64)> {
    let inner = tail.strip_prefix('<')?.strip_suffix('>')?;
    let (a, b) = inner.split_once('.')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

fn parse_item(raw: &str) -> Option<FetchItem> {
    let upper = raw.to_ascii_uppercase();
    match upper.as_str() {
        "UID" => return Some(FetchItem::Uid),
        "FLAGS" => return Some(FetchItem::Flags),
        "INTERNALDATE" => return Some(FetchItem::InternalDate),
        "RFC822.SIZE" => return Some(FetchItem::Rfc822Size),
        "ENVELOPE" => return Some(FetchItem::Envelope),
        "BODY" => return Some(FetchItem::Body { extended: false }),
        "BODYSTRUCTURE" => return Some(FetchItem::Body { extended: true }),
        "RFC822" => return Some(FetchItem::Rfc822),
        "RFC822.HEADER" => return Some(FetchItem::Rfc822Header),
        "RFC822.TEXT" => return Some(FetchItem::Rfc822Text),
        _ => {}
    }
    let (peek, rest) = if upper.starts_with("BODY.PEEK[") {
        (true, &raw["BODY.PEEK[".len()..])
    } else if upper.starts_with("BODY[") {
        (false, &raw["BODY[".len()..])
    } else {
        return None;
    };
    let close = rest.find(']')?;
    let section = &rest[..close];
    let tail = &rest[close + 1..];
    let partial = if tail.is_empty() { None } else { parse_partial(tail) };
    let spec = parse_section(section)?;
    Some(FetchItem::Section { peek, spec, partial })
}

fn parse_items(text: &str) -> Option<Vec<FetchItem>> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')).unwrap_or(trimmed);
    split_top_level(body).iter().map(|s| parse_item(s)).collect()
}

fn apply_partial(mut data: Vec<u8>, partial: Option<(u64, u64)>) -> Vec<u8> {
    let Some((offset, len)) = partial else { return data };
    let offset = offset as usize;
    if offset >= data.len() {
        return Vec::new();
    }
    data = data.split_off(offset);
    data.truncate(len as usize);
    data
}

fn header_body_split(msg: &[u8]) -> (&[u8], &[u8]) {
    if let Some(i) = msg.windows(4).position(|w| w == b"\r\n\r\n") {
        return (&msg[..i + 2], &msg[i + 4..]);
    }
    if let Some(i) = msg.windows(2).position(|w| w == b"\n\n") {
        return (&msg[..i + 1], &msg[i + 2..]);
    }
    (msg, b"")
}

fn content_type_boundary(headers: &[u8]) -> Option<(bool, bool, String)> {
    let fields = folded_headers(headers);
    let (_, value) = fields.iter().find(|(n, _)| n.eq_ignore_ascii_case("Content-Type"))?;
    let ct = parse_content_type(value)?;
    let is_multipart = ct.is_primary_type("multipart");
    let is_message_rfc822 = ct.is_mime_type("message", "rfc822");
    let boundary = ct.get_parameter("boundary").unwrap_or("").to_string();
    Some((is_multipart, is_message_rfc822, boundary))
}

/// Split a multipart body on its boundary lines. Preamble (before the first
/// boundary) and epilogue (after the closing `--boundary--`) are dropped.
fn split_multipart(body: &[u8], boundary: &str) -> Vec<Vec<u8>> {
    let marker = format!("--{boundary}");
    let text_lines: Vec<&[u8]> = split_keep_lines(body);
    let mut parts: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    for line in text_lines {
        let trimmed = line.strip_suffix(b"\r\n").or_else(|| line.strip_suffix(b"\n")).unwrap_or(line);
        if trimmed == format!("{marker}--").as_bytes() {
            if let Some(buf) = current.take() {
                parts.push(strip_trailing_newline(buf));
            }
            break;
        }
        if trimmed == marker.as_bytes() {
            if let Some(buf) = current.take() {
                parts.push(strip_trailing_newline(buf));
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(buf) = current.as_mut() {
            buf.extend_from_slice(line);
        }
    }
    parts
}

fn strip_trailing_newline(mut buf: Vec<u8>) -> Vec<u8> {
    if buf.ends_with(b"\r\n") {
        buf.truncate(buf.len() - 2);
    } else if buf.ends_with(b"\n") {
        buf.truncate(buf.len() - 1);
    }
    buf
}

fn split_keep_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 0..data.len() {
        if data[i] == b'\n' {
            out.push(&data[start..=i]);
            start = i + 1;
        }
    }
    if start < data.len() {
        out.push(&data[start..]);
    }
    out
}

/// Resolves a numeric part path to that part's full raw octets (header and
/// body). `message/rfc822` parts continue numbering into their embedded
/// message rather than treating it as a further nesting level.
fn locate_part(msg: &[u8], path: &[u32]) -> Option<Vec<u8>> {
    if path.is_empty() {
        return Some(msg.to_vec());
    }
    let (headers, body) = header_body_split(msg);
    match content_type_boundary(headers) {
        Some((true, _, boundary)) if !boundary.is_empty() => {
            let parts = split_multipart(body, &boundary);
            let n = *path.first()? as usize;
            if n == 0 || n > parts.len() {
                return None;
            }
            locate_part(&parts[n - 1], &path[1..])
        }
        Some((_, true, _)) => locate_part(body, path),
        _ => {
            if path == [1] {
                Some(msg.to_vec())
            } else {
                None
            }
        }
    }
}

fn section_content(raw: &[u8], spec: &SectionSpec) -> Vec<u8> {
    match spec {
        SectionSpec::Whole => raw.to_vec(),
        SectionSpec::Header => extract_header_fields(raw, &[], true),
        SectionSpec::HeaderFields { invert, names } => extract_header_fields(raw, names, *invert),
        SectionSpec::Text => header_body_split(raw).1.to_vec(),
        SectionSpec::Part { path, suffix } => {
            let Some(part_raw) = locate_part(raw, path) else {
                return Vec::new();
            };
            let (headers, body) = header_body_split(&part_raw);
            match suffix {
                Some(PartSuffix::Mime) | Some(PartSuffix::Header) => headers.to_vec(),
                Some(PartSuffix::Text) | None => body.to_vec(),
            }
        }
    }
}

fn section_label(spec: &SectionSpec) -> String {
    match spec {
        SectionSpec::Whole => String::new(),
        SectionSpec::Header => "HEADER".to_string(),
        SectionSpec::HeaderFields { invert, names } => {
            let verb = if *invert { "HEADER.FIELDS.NOT" } else { "HEADER.FIELDS" };
            format!("{verb} ({})", names.iter().map(|n| crate::response::imap_quote(n)).collect::<Vec<_>>().join(" "))
        }
        SectionSpec::Text => "TEXT".to_string(),
        SectionSpec::Part { path, suffix } => {
            let nums = path.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".");
            match suffix {
                Some(PartSuffix::Mime) => format!("{nums}.MIME"),
                Some(PartSuffix::Header) => format!("{nums}.HEADER"),
                Some(PartSuffix::Text) => format!("{nums}.TEXT"),
                None => nums,
            }
        }
    }
}

pub async fn handle_fetch<S, C>(session: &mut Session<S>, codec: &mut Codec<C>, args: &[Token], uid: bool) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    let Some(set_str) = args.first().and_then(Token::as_str_value) else {
        return Ok(Outcome::bad("FETCH requires a sequence set"));
    };
    let Ok(seq_set) = SeqSet::parse(&set_str) else {
        return Ok(Outcome::bad("invalid sequence set"));
    };
    let items_text = render_tokens(&args[1..]);
    let Some(items) = parse_items(&items_text) else {
        return Ok(Outcome::bad("invalid FETCH item list"));
    };
    if items.is_empty() {
        return Ok(Outcome::bad("FETCH requires at least one item"));
    }

    let max = if uid {
        match session.store.max_uid(selection.mailbox_id).await {
            Ok(v) => v,
            Err(e) => return Ok(Outcome::no(e.to_string())),
        }
    } else {
        match session.store.message_count(selection.mailbox_id).await {
            Ok(v) => v,
            Err(e) => return Ok(Outcome::no(e.to_string())),
        }
    };
    let ranges = seq_set.resolve(max);
    let id_set = if uid { IdSet::Uid(ranges) } else { IdSet::Seq(ranges) };
    let mut views = match session.store.iterate_messages(selection.mailbox_id, &id_set).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    views.sort_by_key(|v| v.seq);

    for view in &views {
        write_fetch_response(session, codec, view, &items, uid).await?;
    }

    let verb = if uid { "UID FETCH" } else { "FETCH" };
    Ok(Outcome::ok(format!("{verb} completed")))
}

async fn write_fetch_response<S, C>(
    session: &Session<S>,
    codec: &mut Codec<C>,
    view: &MessageView,
    items: &[FetchItem],
    uid: bool,
) -> Result<()>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let selection = session.selection.as_ref().expect("selection checked by caller");
    let mut raw: Option<Vec<u8>> = None;

    // Each rendered item is either plain text or `<prefix><owned literal
    // bytes>`; owned bytes are kept here (not round-tripped through a lossy
    // `String`) so the `{N}` length the wire announces always matches what
    // actually follows it.
    enum Rendered {
        Text(String),
        Literal(String, Vec<u8>),
    }
    let mut rendered: Vec<Rendered> = Vec::new();
    let mut needs_seen = false;

    for item in items {
        match item {
            FetchItem::Uid => rendered.push(Rendered::Text(format!("UID {}", view.uid))),
            FetchItem::Flags => {
                rendered.push(Rendered::Text(format!("FLAGS ({})", view.flags.join(" "))));
            }
            FetchItem::InternalDate => {
                rendered.push(Rendered::Text(format!(
                    "INTERNALDATE \"{}\"",
                    view.internal_date.format("%d-%b-%Y %H:%M:%S %z")
                )));
            }
            FetchItem::Rfc822Size => rendered.push(Rendered::Text(format!("RFC822.SIZE {}", view.size))),
            FetchItem::Envelope => {
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?;
                rendered.push(Rendered::Text(format!("ENVELOPE {}", build_envelope(raw))));
            }
            FetchItem::Body { extended } => {
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?;
                let verb = if *extended { "BODYSTRUCTURE" } else { "BODY" };
                let rendered_body = if *extended { build_bodystructure(raw) } else { build_body(raw) };
                rendered.push(Rendered::Text(format!("{verb} {rendered_body}")));
            }
            FetchItem::Rfc822 => {
                needs_seen = true;
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?.to_vec();
                rendered.push(Rendered::Literal("RFC822 ".to_string(), raw));
            }
            FetchItem::Rfc822Header => {
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?;
                let block = extract_header_fields(raw, &[], true);
                rendered.push(Rendered::Literal("RFC822.HEADER ".to_string(), block));
            }
            FetchItem::Rfc822Text => {
                needs_seen = true;
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?;
                let (_, body) = header_body_split(raw);
                rendered.push(Rendered::Literal("RFC822.TEXT ".to_string(), body.to_vec()));
            }
            FetchItem::Section { peek, spec, partial } => {
                if !peek {
                    needs_seen = true;
                }
                let raw = fetch_raw(session, selection.mailbox_id, view.uid, &mut raw).await?;
                let content = apply_partial(section_content(raw, spec), *partial);
                let label = section_label(spec);
                let partial_suffix = partial.map(|(off, _)| format!("<{off}>")).unwrap_or_default();
                rendered.push(Rendered::Literal(format!("BODY[{label}]{partial_suffix} "), content));
            }
        }
    }

    if needs_seen && !view.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen")) {
        let _ = session.store.set_flags(selection.mailbox_id, view.uid, FlagMode::Add, &["\\Seen".to_string()]).await;
    }

    if uid && !items.contains(&FetchItem::Uid) {
        rendered.insert(0, Rendered::Text(format!("UID {}", view.uid)));
    }

    let mut segments: Vec<WireSegment> = Vec::new();
    for (i, item) in rendered.iter().enumerate() {
        if i > 0 {
            segments.push(WireSegment::Text(" ".to_string()));
        }
        match item {
            Rendered::Text(s) => segments.push(WireSegment::Text(s.clone())),
            Rendered::Literal(prefix, bytes) => {
                segments.push(WireSegment::Text(prefix.clone()));
                segments.push(WireSegment::Raw(bytes));
            }
        }
    }
    segments.push(WireSegment::Text(")".to_string()));

    codec.write_untagged_segments(&format!("{} FETCH (", view.seq), &segments).await
}

async fn fetch_raw<'a, S: UserStore>(
    session: &Session<S>,
    mailbox_id: i64,
    uid: u32,
    cache: &'a mut Option<Vec<u8>>,
) -> Result<&'a [u8]> {
    if cache.is_none() {
        let raw = session.store.reconstruct_raw(mailbox_id, uid).await.unwrap_or_default();
        *cache = Some(normalize_newlines(&raw));
    }
    Ok(cache.as_ref().unwrap())
}

fn normalize_newlines(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\n' && (i == 0 || raw[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}
