/*
 * idle.rs
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

//! NOOP and IDLE (§4.9): both drive the same mailbox poll, reporting
//! EXISTS/RECENT growth or descending EXPUNGE on shrink since the selection
//! was last examined. IDLE additionally holds the connection open, polling
//! every 500ms, until the client sends a `DONE` continuation line.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::codec::Codec;
use crate::error::Result;
use crate::store::UserStore;

use super::{Outcome, Session};

const POLL_TICK: Duration = Duration::from_millis(50);
const POLL_TICKS_PER_CYCLE: u32 = 10; // 50ms * 10 = 500ms

/// Re-reads mailbox counters against the last-known selection state and
/// emits whatever untagged responses the delta requires. Returns
/// `Some(outcome)` when polling must end the command immediately (a
/// UIDVALIDITY change, or a store failure) instead of continuing; the
/// caller must not write anything further of its own in that case, since
/// the returned `Outcome` is handled exactly like any other by the normal
/// tagged-response path.
async fn poll_once<S, C>(session: &mut Session<S>, codec: &mut Codec<C>) -> Result<Option<Outcome>>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(selection) = session.selection.clone() else {
        return Ok(None);
    };
    let info = match session.store.mailbox_info(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Some(Outcome::no(e.to_string()))),
    };
    if info.uid_validity != selection.uid_validity {
        session.clear_selection();
        return Ok(Some(Outcome::Bye("UIDVALIDITY changed, mailbox closed".to_string())));
    }
    let exists = match session.store.message_count(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Some(Outcome::no(e.to_string()))),
    };
    let unseen = match session.store.unseen_count(selection.mailbox_id).await {
        Ok(v) => v,
        Err(e) => return Ok(Some(Outcome::no(e.to_string()))),
    };

    if exists > selection.last_exists {
        codec.write_untagged(&format!("{exists} EXISTS")).await?;
        if unseen > selection.last_unseen {
            codec.write_untagged(&format!("{} RECENT", unseen - selection.last_unseen)).await?;
        }
    } else if exists < selection.last_exists {
        let mut seq = selection.last_exists;
        while seq > exists {
            codec.write_untagged(&format!("{seq} EXPUNGE")).await?;
            seq -= 1;
        }
    }

    if let Some(sel) = session.selection.as_mut() {
        sel.last_exists = exists;
        sel.last_unseen = unseen;
    }
    Ok(None)
}

pub async fn handle_noop<S, C>(session: &mut Session<S>, codec: &mut Codec<C>) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(outcome) = poll_once(session, codec).await? {
        return Ok(outcome);
    }
    Ok(Outcome::ok("NOOP completed"))
}

pub async fn handle_idle<S, C>(session: &mut Session<S>, codec: &mut Codec<C>) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    codec.write_continuation("idling").await?;
    let mut ticks = 0u32;
    loop {
        match timeout(POLL_TICK, codec.read_line_raw()).await {
            Ok(Ok(Some(line))) => {
                let text = String::from_utf8_lossy(&line);
                if text.trim().eq_ignore_ascii_case("DONE") {
                    return Ok(Outcome::ok("IDLE terminated"));
                }
                // Anything else while idling is ignored per RFC 2177; only
                // DONE ends the command.
            }
            Ok(Ok(None)) => {
                // Client went away; let the connection loop observe the EOF
                // on its next read rather than writing to a dead socket.
                return Ok(Outcome::Bye("autologout".to_string()));
            }
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                ticks += 1;
                if ticks >= POLL_TICKS_PER_CYCLE {
                    ticks = 0;
                    if let Some(outcome) = poll_once(session, codec).await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }
}
