/*
 * flags.rs
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

//! STORE / UID STORE and EXPUNGE (§4.7): flag mutation and permanent removal
//! of `\Deleted` messages in the selected mailbox.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
use crate::error::Result;
use crate::parser::sequence_set::SeqSet;
use crate::parser::Token;
use crate::store::{FlagMode, IdSet, UserStore};

use super::{Outcome, Session};

fn parse_store_item(name: &str) -> Option<(FlagMode, bool)> {
    match name.to_ascii_uppercase().as_str() {
        "FLAGS" => Some((FlagMode::Replace, false)),
        "FLAGS.SILENT" => Some((FlagMode::Replace, true)),
        "+FLAGS" => Some((FlagMode::Add, false)),
        "+FLAGS.SILENT" => Some((FlagMode::Add, true)),
        "-FLAGS" => Some((FlagMode::Remove, false)),
        "-FLAGS.SILENT" => Some((FlagMode::Remove, true)),
        _ => None,
    }
}

/// Flag values may arrive as one parenthesized list or as a flat run of
/// atoms (RFC 3501 permits both for `store-att-flags`).
fn parse_flag_values(tokens: &[Token]) -> Option<Vec<String>> {
    if let [Token::List(items)] = tokens {
        return items.iter().map(Token::as_str_value).collect();
    }
    tokens.iter().map(Token::as_str_value).collect()
}

pub async fn handle_store<S, C>(session: &mut Session<S>, codec: &mut Codec<C>, args: &[Token], uid: bool) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    if selection.read_only {
        return Ok(Outcome::no("mailbox is read-only"));
    }
    let [set_tok, item_tok, rest @ ..] = args else {
        return Ok(Outcome::bad("STORE requires a sequence set, item name, and flags"));
    };
    let Some(set_str) = set_tok.as_str_value() else {
        return Ok(Outcome::bad("STORE sequence set must be an astring"));
    };
    let Ok(seq_set) = SeqSet::parse(&set_str) else {
        return Ok(Outcome::bad("invalid sequence set"));
    };
    let Some(item_name) = item_tok.as_str_value() else {
        return Ok(Outcome::bad("STORE item name must be an atom"));
    };
    let Some((mode, silent)) = parse_store_item(&item_name) else {
        return Ok(Outcome::bad(format!("unknown STORE item {item_name}")));
    };
    let Some(mut flags) = parse_flag_values(rest) else {
        return Ok(Outcome::bad("STORE flag list must be atoms"));
    };
    // \Recent reflects session history, not client intent; it is never settable.
    flags.retain(|f| !f.eq_ignore_ascii_case("\\Recent"));

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

    for view in views {
        let resulting = match session.store.set_flags(selection.mailbox_id, view.uid, mode, &flags).await {
            Ok(v) => v,
            Err(e) => return Ok(Outcome::no(e.to_string())),
        };
        if !silent {
            let uid_prefix = if uid { format!("UID {} ", view.uid) } else { String::new() };
            codec
                .write_untagged(&format!("{} FETCH ({uid_prefix}FLAGS ({}))", view.seq, resulting.join(" ")))
                .await?;
        }
    }

    let verb = if uid { "UID STORE" } else { "STORE" };
    Ok(Outcome::ok(format!("{verb} completed")))
}

pub async fn handle_expunge<S, C>(session: &mut Session<S>, codec: &mut Codec<C>) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    if selection.read_only {
        return Ok(Outcome::no("mailbox is read-only"));
    }
    let removed = match session.store.expunge_deleted(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    for seq in &removed {
        codec.write_untagged(&format!("{seq} EXPUNGE")).await?;
    }

    // Keep the view cache in sync so a later NOOP/IDLE doesn't re-report
    // these same removals as a fresh delta.
    if let Ok(unseen) = session.store.unseen_count(selection.mailbox_id).await {
        if let Some(sel) = session.selection.as_mut() {
            sel.last_exists = sel.last_exists.saturating_sub(removed.len() as u32);
            sel.last_unseen = unseen;
        }
    }

    Ok(Outcome::ok("EXPUNGE completed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_item_variants() {
        assert_eq!(parse_store_item("FLAGS"), Some((FlagMode::Replace, false)));
        assert_eq!(parse_store_item("+flags.silent"), Some((FlagMode::Add, true)));
        assert_eq!(parse_store_item("-FLAGS"), Some((FlagMode::Remove, false)));
        assert_eq!(parse_store_item("BOGUS"), None);
    }

    #[test]
    fn parses_parenthesized_flag_list() {
        let tokens = vec![Token::List(vec![
            Token::Atom("\\Deleted".to_string()),
            Token::Atom("\\Seen".to_string()),
        ])];
        let flags = parse_flag_values(&tokens).unwrap();
        assert_eq!(flags, vec!["\\Deleted", "\\Seen"]);
    }

    #[test]
    fn parses_flat_flag_list() {
        let tokens = vec![Token::Atom("\\Deleted".to_string())];
        let flags = parse_flag_values(&tokens).unwrap();
        assert_eq!(flags, vec!["\\Deleted"]);
    }
}
