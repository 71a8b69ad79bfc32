/*
 * search.rs
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

//! SEARCH / UID SEARCH (§4.7): the full search-key grammar, evaluated
//! against every message in the selected mailbox. Keys combine by space
//! (implicit AND), a parenthesized list is itself one AND'd key, and NOT/OR
//! take nested keys.

use chrono::NaiveDate;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
use crate::error::Result;
use crate::parser::sequence_set::SeqSet;
use crate::parser::Token;
use crate::response::folded_headers;
use crate::store::{IdRange, IdSet, MessageView, UserStore};

use super::{Outcome, Session};

#[derive(Debug, Clone)]
enum SearchKey {
    All,
    Answered,
    Deleted,
    Draft,
    Flagged,
    New,
    Old,
    Recent,
    Seen,
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unseen,
    Keyword(String),
    Unkeyword(String),
    From(String),
    To(String),
    Cc(String),
    Bcc(String),
    Subject(String),
    Body(String),
    Text(String),
    Header(String, String),
    Before(NaiveDate),
    On(NaiveDate),
    Since(NaiveDate),
    SentBefore(NaiveDate),
    SentOn(NaiveDate),
    SentSince(NaiveDate),
    Larger(u32),
    Smaller(u32),
    Uid(SeqSet),
    SeqSet(SeqSet),
    Not(Box<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    And(Vec<SearchKey>),
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn take_astring(&mut self) -> Option<String> {
        self.advance().and_then(Token::as_str_value)
    }

    fn take_number(&mut self) -> Option<u32> {
        self.take_astring().and_then(|s| s.parse().ok())
    }

    fn take_date(&mut self) -> Option<NaiveDate> {
        let s = self.take_astring()?;
        NaiveDate::parse_from_str(&s, "%d-%b-%Y").ok()
    }
}

fn parse_keys(tokens: &[Token]) -> std::result::Result<Vec<SearchKey>, String> {
    let mut cursor = Cursor::new(tokens);
    // The optional leading `CHARSET <name>` is accepted and ignored: all
    // string comparisons here already operate on decoded UTF-8.
    if matches!(cursor.peek(), Some(Token::Atom(a)) if a.eq_ignore_ascii_case("CHARSET")) {
        cursor.advance();
        if cursor.take_astring().is_none() {
            return Err("CHARSET requires a name".to_string());
        }
    }
    let mut keys = Vec::new();
    while !cursor.at_end() {
        keys.push(parse_one(&mut cursor)?);
    }
    if keys.is_empty() {
        return Err("SEARCH requires at least one key".to_string());
    }
    Ok(keys)
}

fn parse_one(cursor: &mut Cursor) -> std::result::Result<SearchKey, String> {
    let tok = cursor.advance().ok_or("unexpected end of search key")?;
    match tok {
        Token::List(items) => {
            let inner = parse_keys(items)?;
            Ok(SearchKey::And(inner))
        }
        Token::Atom(name) => parse_atom_key(cursor, name),
        _ => Err("search key must be an atom, sequence set, or parenthesized list".to_string()),
    }
}

fn parse_atom_key(cursor: &mut Cursor, name: &str) -> std::result::Result<SearchKey, String> {
    match name.to_ascii_uppercase().as_str() {
        "ALL" => Ok(SearchKey::All),
        "ANSWERED" => Ok(SearchKey::Answered),
        "DELETED" => Ok(SearchKey::Deleted),
        "DRAFT" => Ok(SearchKey::Draft),
        "FLAGGED" => Ok(SearchKey::Flagged),
        "NEW" => Ok(SearchKey::New),
        "OLD" => Ok(SearchKey::Old),
        "RECENT" => Ok(SearchKey::Recent),
        "SEEN" => Ok(SearchKey::Seen),
        "UNANSWERED" => Ok(SearchKey::Unanswered),
        "UNDELETED" => Ok(SearchKey::Undeleted),
        "UNDRAFT" => Ok(SearchKey::Undraft),
        "UNFLAGGED" => Ok(SearchKey::Unflagged),
        "UNSEEN" => Ok(SearchKey::Unseen),
        "KEYWORD" => Ok(SearchKey::Keyword(cursor.take_astring().ok_or("KEYWORD requires a flag name")?)),
        "UNKEYWORD" => Ok(SearchKey::Unkeyword(cursor.take_astring().ok_or("UNKEYWORD requires a flag name")?)),
        "FROM" => Ok(SearchKey::From(cursor.take_astring().ok_or("FROM requires a string")?)),
        "TO" => Ok(SearchKey::To(cursor.take_astring().ok_or("TO requires a string")?)),
        "CC" => Ok(SearchKey::Cc(cursor.take_astring().ok_or("CC requires a string")?)),
        "BCC" => Ok(SearchKey::Bcc(cursor.take_astring().ok_or("BCC requires a string")?)),
        "SUBJECT" => Ok(SearchKey::Subject(cursor.take_astring().ok_or("SUBJECT requires a string")?)),
        "BODY" => Ok(SearchKey::Body(cursor.take_astring().ok_or("BODY requires a string")?)),
        "TEXT" => Ok(SearchKey::Text(cursor.take_astring().ok_or("TEXT requires a string")?)),
        "HEADER" => {
            let field = cursor.take_astring().ok_or("HEADER requires a field name")?;
            let value = cursor.take_astring().ok_or("HEADER requires a value")?;
            Ok(SearchKey::Header(field, value))
        }
        "BEFORE" => Ok(SearchKey::Before(cursor.take_date().ok_or("BEFORE requires a date")?)),
        "ON" => Ok(SearchKey::On(cursor.take_date().ok_or("ON requires a date")?)),
        "SINCE" => Ok(SearchKey::Since(cursor.take_date().ok_or("SINCE requires a date")?)),
        "SENTBEFORE" => Ok(SearchKey::SentBefore(cursor.take_date().ok_or("SENTBEFORE requires a date")?)),
        "SENTON" => Ok(SearchKey::SentOn(cursor.take_date().ok_or("SENTON requires a date")?)),
        "SENTSINCE" => Ok(SearchKey::SentSince(cursor.take_date().ok_or("SENTSINCE requires a date")?)),
        "LARGER" => Ok(SearchKey::Larger(cursor.take_number().ok_or("LARGER requires a number")?)),
        "SMALLER" => Ok(SearchKey::Smaller(cursor.take_number().ok_or("SMALLER requires a number")?)),
        "UID" => {
            let s = cursor.take_astring().ok_or("UID requires a sequence set")?;
            let set = SeqSet::parse(&s).map_err(|e| e.message)?;
            Ok(SearchKey::Uid(set))
        }
        "NOT" => Ok(SearchKey::Not(Box::new(parse_one(cursor)?))),
        "OR" => {
            let a = parse_one(cursor)?;
            let b = parse_one(cursor)?;
            Ok(SearchKey::Or(Box::new(a), Box::new(b)))
        }
        _ => {
            let set = SeqSet::parse(name).map_err(|_| format!("unknown search key {name}"))?;
            Ok(SearchKey::SeqSet(set))
        }
    }
}

fn requires_raw(key: &SearchKey) -> bool {
    match key {
        SearchKey::From(_)
        | SearchKey::To(_)
        | SearchKey::Cc(_)
        | SearchKey::Bcc(_)
        | SearchKey::Subject(_)
        | SearchKey::Body(_)
        | SearchKey::Text(_)
        | SearchKey::Header(..)
        | SearchKey::SentBefore(_)
        | SearchKey::SentOn(_)
        | SearchKey::SentSince(_) => true,
        SearchKey::Not(inner) => requires_raw(inner),
        SearchKey::Or(a, b) => requires_raw(a) || requires_raw(b),
        SearchKey::And(keys) => keys.iter().any(requires_raw),
        _ => false,
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn body_text(raw: &[u8]) -> String {
    let sep = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
        .unwrap_or(0);
    String::from_utf8_lossy(&raw[sep..]).into_owned()
}

struct SearchCtx {
    max_seq: u32,
    max_uid: u32,
}

fn eval(key: &SearchKey, view: &MessageView, raw: Option<&[u8]>, ctx: &SearchCtx) -> bool {
    let has_flag = |f: &str| view.flags.iter().any(|x| x.eq_ignore_ascii_case(f));
    match key {
        SearchKey::All => true,
        SearchKey::Answered => has_flag("\\Answered"),
        SearchKey::Deleted => has_flag("\\Deleted"),
        SearchKey::Draft => has_flag("\\Draft"),
        SearchKey::Flagged => has_flag("\\Flagged"),
        SearchKey::Seen => has_flag("\\Seen"),
        SearchKey::Unanswered => !has_flag("\\Answered"),
        SearchKey::Undeleted => !has_flag("\\Deleted"),
        SearchKey::Undraft => !has_flag("\\Draft"),
        SearchKey::Unflagged => !has_flag("\\Flagged"),
        SearchKey::Unseen => !has_flag("\\Seen"),
        SearchKey::Recent => has_flag("\\Recent"),
        SearchKey::New => has_flag("\\Recent") && !has_flag("\\Seen"),
        SearchKey::Old => !has_flag("\\Recent"),
        SearchKey::Keyword(k) => has_flag(k),
        SearchKey::Unkeyword(k) => !has_flag(k),
        SearchKey::Larger(n) => view.size > *n,
        SearchKey::Smaller(n) => view.size < *n,
        SearchKey::Before(d) => view.internal_date.date_naive() < *d,
        SearchKey::On(d) => view.internal_date.date_naive() == *d,
        SearchKey::Since(d) => view.internal_date.date_naive() >= *d,
        SearchKey::Uid(set) => set.resolve(ctx.max_uid).iter().any(|r: &IdRange| r.contains(view.uid)),
        SearchKey::SeqSet(set) => set.resolve(ctx.max_seq).iter().any(|r: &IdRange| r.contains(view.seq)),
        SearchKey::Not(inner) => !eval(inner, view, raw, ctx),
        SearchKey::Or(a, b) => eval(a, view, raw, ctx) || eval(b, view, raw, ctx),
        SearchKey::And(keys) => keys.iter().all(|k| eval(k, view, raw, ctx)),
        SearchKey::From(s) | SearchKey::To(s) | SearchKey::Cc(s) | SearchKey::Bcc(s) | SearchKey::Subject(s) => {
            let Some(raw) = raw else { return false };
            let field = match key {
                SearchKey::From(_) => "From",
                SearchKey::To(_) => "To",
                SearchKey::Cc(_) => "Cc",
                SearchKey::Bcc(_) => "Bcc",
                _ => "Subject",
            };
            let headers = folded_headers(raw);
            header_value(&headers, field).is_some_and(|v| contains_ci(v, s))
        }
        SearchKey::Header(name, value) => {
            let Some(raw) = raw else { return false };
            let headers = folded_headers(raw);
            match header_value(&headers, name) {
                Some(v) => value.is_empty() || contains_ci(v, value),
                None => false,
            }
        }
        SearchKey::Body(s) => raw.is_some_and(|r| contains_ci(&body_text(r), s)),
        SearchKey::Text(s) => raw.is_some_and(|r| contains_ci(&String::from_utf8_lossy(r), s)),
        SearchKey::SentBefore(d) | SearchKey::SentOn(d) | SearchKey::SentSince(d) => {
            let Some(raw) = raw else { return false };
            let headers = folded_headers(raw);
            let Some(date_hdr) = header_value(&headers, "Date") else { return false };
            let Some(sent) = chrono::DateTime::parse_from_rfc2822(date_hdr.trim()).ok() else { return false };
            let sent = sent.date_naive();
            match key {
                SearchKey::SentBefore(_) => sent < *d,
                SearchKey::SentOn(_) => sent == *d,
                _ => sent >= *d,
            }
        }
    }
}

pub async fn handle_search<S, C>(session: &mut Session<S>, codec: &mut Codec<C>, args: &[Token], uid: bool) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    let keys = match parse_keys(args) {
        Ok(k) => k,
        Err(msg) => return Ok(Outcome::bad(msg)),
    };
    let combined = SearchKey::And(keys);

    let max_seq = match session.store.message_count(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let max_uid = match session.store.max_uid(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let ctx = SearchCtx { max_seq, max_uid };

    let set = IdSet::Seq(if max_seq == 0 { Vec::new() } else { vec![IdRange { start: 1, end: max_seq }] });
    let views = match session.store.iterate_messages(selection.mailbox_id, &set).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };

    let need_raw = requires_raw(&combined);
    let mut matched = Vec::new();
    for view in &views {
        let raw = if need_raw {
            session.store.reconstruct_raw(selection.mailbox_id, view.uid).await.ok()
        } else {
            None
        };
        if eval(&combined, view, raw.as_deref(), &ctx) {
            matched.push(if uid { view.uid } else { view.seq });
        }
    }

    let body = matched.iter().map(u32::to_string).collect::<Vec<_>>().join(" ");
    codec.write_untagged(&format!("SEARCH {body}")).await?;

    let verb = if uid { "UID SEARCH" } else { "SEARCH" };
    Ok(Outcome::ok(format!("{verb} completed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(seq: u32, uid: u32, flags: &[&str], size: u32) -> MessageView {
        MessageView {
            seq,
            uid,
            flags: flags.iter().map(|s| s.to_string()).collect(),
            internal_date: chrono::Utc::now(),
            size,
        }
    }

    #[test]
    fn parses_simple_and_list() {
        let tokens = vec![Token::Atom("SEEN".to_string()), Token::Atom("DELETED".to_string())];
        let keys = parse_keys(&tokens).unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn parses_or_and_not() {
        let tokens = vec![
            Token::Atom("OR".to_string()),
            Token::Atom("NOT".to_string()),
            Token::Atom("SEEN".to_string()),
            Token::Atom("DELETED".to_string()),
        ];
        let keys = parse_keys(&tokens).unwrap();
        assert!(matches!(keys[0], SearchKey::Or(..)));
    }

    #[test]
    fn parses_parenthesized_group() {
        let tokens = vec![Token::List(vec![
            Token::Atom("SEEN".to_string()),
            Token::Atom("FLAGGED".to_string()),
        ])];
        let keys = parse_keys(&tokens).unwrap();
        assert!(matches!(keys[0], SearchKey::And(ref inner) if inner.len() == 2));
    }

    #[test]
    fn bare_sequence_set_is_a_key() {
        let tokens = vec![Token::Atom("1:3".to_string())];
        let keys = parse_keys(&tokens).unwrap();
        assert!(matches!(keys[0], SearchKey::SeqSet(_)));
    }

    #[test]
    fn eval_flag_keys() {
        let ctx = SearchCtx { max_seq: 1, max_uid: 1 };
        let v = view(1, 1, &["\\Seen", "\\Flagged"], 100);
        assert!(eval(&SearchKey::Seen, &v, None, &ctx));
        assert!(!eval(&SearchKey::Deleted, &v, None, &ctx));
        assert!(eval(&SearchKey::And(vec![SearchKey::Seen, SearchKey::Flagged]), &v, None, &ctx));
    }

    #[test]
    fn eval_header_substring_match() {
        let ctx = SearchCtx { max_seq: 1, max_uid: 1 };
        let v = view(1, 1, &[], 0);
        let raw = b"From: Alice <alice@example.com>\r\nSubject: Hello\r\n\r\nbody\r\n";
        assert!(eval(&SearchKey::From("alice".to_string()), &v, Some(raw), &ctx));
        assert!(!eval(&SearchKey::From("bob".to_string()), &v, Some(raw), &ctx));
    }
}
