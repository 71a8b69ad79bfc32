/*
 * mailbox.rs
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

//! Mailbox Manager (§4.5): LIST/LSUB/CREATE/DELETE/RENAME/SUBSCRIBE/
//! UNSUBSCRIBE/STATUS/NAMESPACE, plus the `Roles/<email>/…` projection.

use std::collections::{HashMap, HashSet};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
use crate::error::Result;
use crate::parser::Token;
use crate::response::imap_quote;
use crate::store::{MailboxAttr, MailboxListing, UserStore};

use super::{canonicalize_path, pattern, Outcome, Session};

const ROLES_PREFIX: &str = "Roles";

pub async fn handle_list<S, C>(
    session: &Session<S>,
    codec: &mut Codec<C>,
    args: &[Token],
    lsub: bool,
) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let verb = if lsub { "LSUB" } else { "LIST" };
    let [reference, pattern_arg] = args else {
        return Ok(Outcome::bad(format!("{verb} requires a reference and a pattern")));
    };
    let (Some(reference), Some(pat)) = (reference.as_str_value(), pattern_arg.as_str_value()) else {
        return Ok(Outcome::bad(format!("{verb} arguments must be strings")));
    };

    if pat.is_empty() {
        codec
            .write_untagged(&format!("{verb} (\\Noselect) \"/\" {}", imap_quote(&reference)))
            .await?;
        return Ok(Outcome::ok(format!("{verb} completed")));
    }

    let canonical = pattern::canonical_pattern(&reference, &pat);
    let listings = match session.store.list_mailboxes(session.user_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let roles = role_listings(session, &listings).await?;
    let mut all: Vec<MailboxListing> = listings;
    all.extend(roles);

    if lsub {
        write_lsub(codec, &all, session, &canonical).await?;
    } else {
        let mut matched: Vec<&MailboxListing> =
            all.iter().filter(|l| pattern::matches(&canonical, &l.path)).collect();
        matched.sort_by(|a, b| a.path.cmp(&b.path));
        for l in matched {
            write_list_line(codec, "LIST", &l.attributes, &l.path).await?;
        }
    }

    Ok(Outcome::ok(format!("{verb} completed")))
}

/// Project `Roles/<email>/<leaf>` entries for the caller's role assignments,
/// plus the `Roles` and `Roles/<email>` intermediate nodes (§4.5).
async fn role_listings<S: UserStore>(
    session: &Session<S>,
    _own: &[MailboxListing],
) -> Result<Vec<MailboxListing>> {
    if session.role_mailbox_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = vec![
        MailboxListing {
            path: ROLES_PREFIX.to_string(),
            attributes: vec![MailboxAttr::Noselect, MailboxAttr::HasChildren],
            subscribed: false,
        },
    ];
    for &role_id in &session.role_mailbox_ids {
        let listings = session.store.list_mailboxes(role_id).await.unwrap_or_default();
        let email = role_email(session, role_id).await;
        let base = format!("{ROLES_PREFIX}/{email}");
        out.push(MailboxListing {
            path: base.clone(),
            attributes: vec![MailboxAttr::Noselect, MailboxAttr::HasChildren],
            subscribed: false,
        });
        for l in listings {
            out.push(MailboxListing {
                path: format!("{base}/{}", l.path),
                attributes: l.attributes,
                subscribed: l.subscribed,
            });
        }
    }
    Ok(out)
}

/// Best-effort reverse lookup of a role mailbox's address. The store only
/// exposes a forward lookup (`email -> id`); since role mailbox ids are
/// already known from the session's role assignments, we use the id itself
/// as a stable placeholder when no reverse mapping is available.
async fn role_email<S: UserStore>(_session: &Session<S>, role_id: i64) -> String {
    format!("role-{role_id}")
}

async fn write_lsub<S, C>(
    codec: &mut Codec<C>,
    listings: &[MailboxListing],
    session: &Session<S>,
    canonical: &str,
) -> Result<()>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let subs: HashSet<String> = match session.store.list_subscriptions(session.user_id).await {
        Ok(v) => v.into_iter().collect(),
        Err(_) => return Ok(()),
    };
    let attrs_by_path: HashMap<&str, &[MailboxAttr]> =
        listings.iter().map(|l| (l.path.as_str(), l.attributes.as_slice())).collect();

    let mut lines: Vec<(String, Vec<MailboxAttr>)> = Vec::new();
    let mut emitted: HashSet<String> = HashSet::new();

    for path in &subs {
        if !pattern::matches(canonical, path) {
            continue;
        }
        if emitted.insert(path.clone()) {
            let attrs = attrs_by_path.get(path.as_str()).map(|a| a.to_vec()).unwrap_or_default();
            lines.push((path.clone(), attrs));
        }
    }
    for path in &subs {
        for ancestor in pattern::ancestors(path) {
            if subs.contains(&ancestor) || !pattern::matches(canonical, &ancestor) {
                continue;
            }
            if emitted.insert(ancestor.clone()) {
                lines.push((ancestor, vec![MailboxAttr::Noselect]));
            }
        }
    }
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    for (path, attrs) in &lines {
        write_list_line(codec, "LSUB", attrs, path).await?;
    }
    Ok(())
}

async fn write_list_line<C>(codec: &mut Codec<C>, verb: &str, attrs: &[MailboxAttr], path: &str) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let attr_str = attrs.iter().map(MailboxAttr::as_str).collect::<Vec<_>>().join(" ");
    codec.write_untagged(&format!("{verb} ({attr_str}) \"/\" {}", imap_quote(path))).await
}

fn mailbox_name<S: UserStore>(_session: &Session<S>, args: &[Token]) -> Option<String> {
    let name = args.first()?.as_str_value()?;
    let trimmed = name.strip_suffix('/').unwrap_or(&name);
    Some(canonicalize_path(trimmed))
}

pub async fn handle_create<S: UserStore>(session: &Session<S>, args: &[Token]) -> Result<Outcome> {
    let Some(path) = mailbox_name(session, args) else {
        return Ok(Outcome::bad("CREATE requires a mailbox name"));
    };
    if path.is_empty() {
        return Ok(Outcome::bad("CREATE requires a non-empty mailbox name"));
    }
    match session.store.create_mailbox(session.user_id, &path).await {
        Ok(()) => Ok(Outcome::ok("CREATE completed")),
        Err(e) => Ok(Outcome::no(e.to_string())),
    }
}

pub async fn handle_delete<S: UserStore>(session: &Session<S>, args: &[Token]) -> Result<Outcome> {
    let Some(path) = mailbox_name(session, args) else {
        return Ok(Outcome::bad("DELETE requires a mailbox name"));
    };
    match session.store.delete_mailbox(session.user_id, &path).await {
        Ok(()) => Ok(Outcome::ok("DELETE completed")),
        Err(e) => Ok(Outcome::no(e.to_string())),
    }
}

pub async fn handle_rename<S: UserStore>(session: &Session<S>, args: &[Token]) -> Result<Outcome> {
    let [from, to] = args else {
        return Ok(Outcome::bad("RENAME requires two mailbox names"));
    };
    let (Some(from), Some(to)) = (from.as_str_value(), to.as_str_value()) else {
        return Ok(Outcome::bad("RENAME arguments must be strings"));
    };
    let from = canonicalize_path(from.strip_suffix('/').unwrap_or(&from));
    let to = canonicalize_path(to.strip_suffix('/').unwrap_or(&to));
    match session.store.rename_mailbox(session.user_id, &from, &to).await {
        Ok(()) => Ok(Outcome::ok("RENAME completed")),
        Err(e) => Ok(Outcome::no(e.to_string())),
    }
}

pub async fn handle_subscribe<S: UserStore>(session: &Session<S>, args: &[Token], subscribe: bool) -> Result<Outcome> {
    let Some(path) = mailbox_name(session, args) else {
        return Ok(Outcome::bad("mailbox name required"));
    };
    let result = if subscribe {
        session.store.subscribe(session.user_id, &path).await
    } else {
        session.store.unsubscribe(session.user_id, &path).await
    };
    let verb = if subscribe { "SUBSCRIBE" } else { "UNSUBSCRIBE" };
    match result {
        Ok(()) => Ok(Outcome::ok(format!("{verb} completed"))),
        Err(e) => Ok(Outcome::no(e.to_string())),
    }
}

const STATUS_ITEMS: &[&str] = &["MESSAGES", "RECENT", "UIDNEXT", "UIDVALIDITY", "UNSEEN"];

pub async fn handle_status<S, C>(session: &Session<S>, codec: &mut Codec<C>, args: &[Token]) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let [mailbox, items] = args else {
        return Ok(Outcome::bad("STATUS requires a mailbox and an item list"));
    };
    let Some(path) = mailbox.as_str_value() else {
        return Ok(Outcome::bad("STATUS mailbox name must be a string"));
    };
    let path = canonicalize_path(&path);
    let Some(items) = items.as_list() else {
        return Ok(Outcome::bad("STATUS requires a parenthesized item list"));
    };
    let mut requested = Vec::with_capacity(items.len());
    for item in items {
        let Some(name) = item.as_str_value() else {
            return Ok(Outcome::bad("STATUS item must be an atom"));
        };
        let upper = name.to_ascii_uppercase();
        if !STATUS_ITEMS.contains(&upper.as_str()) {
            return Ok(Outcome::bad(format!("unknown STATUS item {upper}")));
        }
        requested.push(upper);
    }

    let mailbox_id = match session.store.get_mailbox(session.user_id, &path).await {
        Ok(id) => id,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let info = match session.store.mailbox_info(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let messages = match session.store.message_count(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let unseen = match session.store.unseen_count(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };

    let mut parts = Vec::with_capacity(requested.len());
    for item in &requested {
        let value = match item.as_str() {
            "MESSAGES" => messages,
            "RECENT" => unseen,
            "UIDNEXT" => info.uid_next,
            "UIDVALIDITY" => info.uid_validity,
            "UNSEEN" => unseen,
            _ => unreachable!(),
        };
        parts.push(format!("{item} {value}"));
    }
    codec
        .write_untagged(&format!("STATUS {} ({})", imap_quote(&path), parts.join(" ")))
        .await?;
    Ok(Outcome::ok("STATUS completed"))
}

pub async fn handle_namespace<C>(codec: &mut Codec<C>) -> Result<Outcome>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    codec.write_untagged("NAMESPACE ((\"\" \"/\")) NIL NIL").await?;
    Ok(Outcome::ok("NAMESPACE completed"))
}
