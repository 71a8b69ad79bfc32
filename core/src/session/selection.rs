/*
 * selection.rs
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

//! SELECT / EXAMINE / CLOSE / UNSELECT (§4.6). SELECT and EXAMINE share
//! resolution and response assembly and differ only in `read_only` and the
//! PERMANENTFLAGS line; the two untagged sequences are ordered differently
//! and that ordering is load-bearing for real clients, so it is spelled out
//! verbatim rather than factored into one shared sequence.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::Codec;
use crate::error::Result;
use crate::parser::Token;
use crate::store::{IdSet, UserStore};

use super::{Outcome, Phase, Selection, Session};

const PERMANENT_FLAGS_RW: &str = "\\Answered \\Flagged \\Deleted \\Seen \\Draft \\*";

async fn first_unseen_seq<S: UserStore>(session: &Session<S>, mailbox_id: i64, max_seq: u32) -> Option<u32> {
    if max_seq == 0 {
        return None;
    }
    let set = IdSet::Seq(vec![crate::store::IdRange { start: 1, end: max_seq }]);
    let views = session.store.iterate_messages(mailbox_id, &set).await.ok()?;
    views
        .into_iter()
        .find(|v| !v.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen")))
        .map(|v| v.seq)
}

/// Resolves `path` to `(mailbox_id, effective_owner_id, is_role, role_mailbox_id)`.
/// `Roles/<email>/<leaf>` is authorized against the caller's role assignments
/// and resolved against the role mailbox's store; everything else resolves
/// against the caller's own store (§4.6 resolution path).
async fn resolve_mailbox<S: UserStore>(
    session: &Session<S>,
    path: &str,
) -> std::result::Result<(i64, bool, i64), Outcome> {
    if let Some(rest) = path.strip_prefix("Roles/") {
        let mut parts = rest.splitn(2, '/');
        let email = parts.next().unwrap_or("");
        let leaf = parts.next().unwrap_or("");
        if email.is_empty() || leaf.is_empty() {
            return Err(Outcome::no("invalid role mailbox path"));
        }
        let leaf = super::canonicalize_path(leaf);
        let (role_mailbox_id, _owner_domain_id) = match session.store.get_role_mailbox_by_email(email).await {
            Ok(v) => v,
            Err(e) => return Err(Outcome::no(e.to_string())),
        };
        let authorized = session
            .store
            .is_user_assigned_to_role(session.user_id, role_mailbox_id)
            .await
            .unwrap_or(false);
        if !authorized {
            return Err(Outcome::no_code("AUTHORIZATIONFAILED", "not assigned to this role mailbox"));
        }
        let mailbox_id = match session.store.get_mailbox(role_mailbox_id, &leaf).await {
            Ok(id) => id,
            Err(_) => return Err(Outcome::no_code("TRYCREATE", "no such mailbox")),
        };
        Ok((mailbox_id, true, role_mailbox_id))
    } else {
        let mailbox_id = match session.store.get_mailbox(session.user_id, path).await {
            Ok(id) => id,
            Err(_) => return Err(Outcome::no_code("TRYCREATE", "no such mailbox")),
        };
        Ok((mailbox_id, false, 0))
    }
}

pub async fn handle_select<S, C>(
    session: &mut Session<S>,
    codec: &mut Codec<C>,
    args: &[Token],
    read_only: bool,
) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let verb = if read_only { "EXAMINE" } else { "SELECT" };
    let Some(path) = args.first().and_then(Token::as_str_value) else {
        return Ok(Outcome::bad(format!("{verb} requires a mailbox name")));
    };
    let path = super::canonicalize_path(&path);

    session.clear_selection();

    let (mailbox_id, is_role, role_mailbox_id) = match resolve_mailbox(session, &path).await {
        Ok(v) => v,
        Err(outcome) => return Ok(outcome),
    };

    let info = match session.store.mailbox_info(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let exists = match session.store.message_count(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let unseen = match session.store.unseen_count(mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Outcome::no(e.to_string())),
    };
    let first_unseen = first_unseen_seq(session, mailbox_id, exists).await;

    let flags_body = "FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)";
    let permanent_flags_rw = format!("OK [PERMANENTFLAGS ({PERMANENT_FLAGS_RW})] Limited");
    let permanent_flags_ro = "OK [PERMANENTFLAGS ()] No permanent flags permitted";

    if read_only {
        codec.write_untagged(&format!("{exists} EXISTS")).await?;
        codec.write_untagged(&format!("{unseen} RECENT")).await?;
        if let Some(n) = first_unseen {
            codec.write_untagged(&format!("OK [UNSEEN {n}]")).await?;
        }
        codec.write_untagged(&format!("OK [UIDVALIDITY {}]", info.uid_validity)).await?;
        codec.write_untagged(&format!("OK [UIDNEXT {}]", info.uid_next)).await?;
        codec.write_untagged(flags_body).await?;
        codec.write_untagged(permanent_flags_ro).await?;
    } else {
        codec.write_untagged(flags_body).await?;
        codec.write_untagged(&format!("{exists} EXISTS")).await?;
        codec.write_untagged(&format!("{unseen} RECENT")).await?;
        if let Some(n) = first_unseen {
            codec.write_untagged(&format!("OK [UNSEEN {n}]")).await?;
        }
        codec.write_untagged(&format!("OK [UIDVALIDITY {}]", info.uid_validity)).await?;
        codec.write_untagged(&format!("OK [UIDNEXT {}]", info.uid_next)).await?;
        codec.write_untagged(&permanent_flags_rw).await?;
    }

    session.selection = Some(Selection {
        mailbox_id,
        mailbox_path: path,
        read_only,
        uid_validity: info.uid_validity,
        uid_next: info.uid_next,
        last_exists: exists,
        last_unseen: unseen,
        is_role,
        role_mailbox_id,
    });
    session.phase = Phase::Selected;

    let mode = if read_only { "READ-ONLY" } else { "READ-WRITE" };
    Ok(Outcome::ok(format!("[{mode}] {verb} completed")))
}

/// CLOSE (`is_close = true`) expunges `\Deleted` messages (unless the
/// selection was read-only) without emitting untagged EXPUNGE; UNSELECT
/// (`is_close = false`) never removes anything. Both always return OK and
/// leave the session back in Authenticated.
pub async fn handle_close<S: UserStore>(session: &mut Session<S>, is_close: bool) -> Result<Outcome> {
    let Some(selection) = session.selection.clone() else {
        return Ok(Outcome::bad("no mailbox selected"));
    };
    if is_close && !selection.read_only {
        let _ = session.store.expunge_deleted(selection.mailbox_id).await;
    }
    session.clear_selection();
    let verb = if is_close { "CLOSE" } else { "UNSELECT" };
    Ok(Outcome::ok(format!("{verb} completed")))
}
