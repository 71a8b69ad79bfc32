/*
 * copy.rs
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

//! APPEND and COPY / UID COPY (§4.7): both land new messages in a mailbox
//! via `UserStore::append_message`/`copy_messages`, and both fail with
//! `NO [TRYCREATE]` rather than creating the destination themselves.

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
use crate::error::Result;
use crate::parser::sequence_set::SeqSet;
use crate::parser::Token;
use crate::store::{IdSet, UserStore};

use super::{Outcome, Session};

fn parse_append_date(s: &str) -> Option<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_str(s, "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub async fn handle_append<S, C>(session: &mut Session<S>, _codec: &mut Codec<C>, args: &[Token]) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some((mailbox_tok, rest)) = args.split_first() else {
        return Ok(Outcome::bad("APPEND requires a mailbox name"));
    };
    let Some(path) = mailbox_tok.as_str_value() else {
        return Ok(Outcome::bad("APPEND mailbox name must be an astring"));
    };
    let path = super::canonicalize_path(&path);

    let mut flags: Vec<String> = Vec::new();
    let mut internal_date = Utc::now();
    let mut idx = 0;
    if let Some(Token::List(items)) = rest.get(idx) {
        flags = match items.iter().map(Token::as_str_value).collect::<Option<Vec<_>>>() {
            Some(v) => v,
            None => return Ok(Outcome::bad("APPEND flag list must be atoms")),
        };
        flags.retain(|f| !f.eq_ignore_ascii_case("\\Recent"));
        idx += 1;
    }
    if let Some(tok @ (Token::QuotedString(_) | Token::Atom(_))) = rest.get(idx) {
        if !tok.is_nil() {
            let Some(s) = tok.as_str_value() else {
                return Ok(Outcome::bad("APPEND date must be a string"));
            };
            internal_date = match parse_append_date(&s) {
                Some(d) => d,
                None => return Ok(Outcome::bad("invalid APPEND date-time")),
            };
        }
        idx += 1;
    }
    let Some(literal_tok) = rest.get(idx) else {
        return Ok(Outcome::bad("APPEND requires a message literal"));
    };
    let raw = match literal_tok {
        Token::Literal(bytes) => bytes.clone(),
        _ => return Ok(Outcome::bad("APPEND message must be a literal")),
    };

    let mailbox_id = match session.store.get_mailbox(session.user_id, &path).await {
        Ok(id) => id,
        Err(_) => return Ok(Outcome::no_code("TRYCREATE", "no such mailbox")),
    };
    let uid = match session.store.append_message(mailbox_id, &raw, &flags, internal_date).await {
        Ok(u) => u,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let info = match session.store.mailbox_info(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };

    Ok(Outcome::ok(format!(
        "[APPENDUID {} {uid}] APPEND completed",
        info.uid_validity
    )))
}

pub async fn handle_copy<S: UserStore>(session: &mut Session<S>, args: &[Token], uid: bool) -> Result<Outcome> {
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    let [set_tok, dest_tok] = args else {
        return Ok(Outcome::bad("COPY requires a sequence set and destination mailbox"));
    };
    let Some(set_str) = set_tok.as_str_value() else {
        return Ok(Outcome::bad("COPY sequence set must be an astring"));
    };
    let Ok(seq_set) = SeqSet::parse(&set_str) else {
        return Ok(Outcome::bad("invalid sequence set"));
    };
    let Some(dest_path) = dest_tok.as_str_value() else {
        return Ok(Outcome::bad("COPY destination must be an astring"));
    };
    let dest_path = super::canonicalize_path(&dest_path);

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
    let views = match session.store.iterate_messages(selection.mailbox_id, &id_set).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    if views.is_empty() {
        let verb = if uid { "UID COPY" } else { "COPY" };
        return Ok(Outcome::ok(format!("{verb} completed")));
    }

    let dest_mailbox_id = match session.store.get_mailbox(session.user_id, &dest_path).await {
        Ok(id) => id,
        Err(_) => return Ok(Outcome::no_code("TRYCREATE", "no such mailbox")),
    };
    let uids: Vec<u32> = views.iter().map(|v| v.uid).collect();
    if let Err(e) = session.store.copy_messages(selection.mailbox_id, &uids, dest_mailbox_id).await {
        return Ok(Outcome::no(e.to_string()));
    }

    let verb = if uid { "UID COPY" } else { "COPY" };
    Ok(Outcome::ok(format!("{verb} completed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_append_date() {
        let dt = parse_append_date("01-Jan-2026 12:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2026-01-01");
    }

    #[test]
    fn rejects_malformed_append_date() {
        assert!(parse_append_date("not a date").is_none());
    }
}
