/*
 * auth.rs
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

//! STARTTLS / LOGIN / AUTHENTICATE PLAIN (§4.4). Verification itself is
//! delegated to [`crate::auth::verify_credentials`]; this module only owns
//! the IMAP-facing state transition.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::auth::{verify_credentials, AuthOutcome};
use crate::codec::Codec;
use crate::error::Result;
use crate::parser::Token;
use crate::sasl::{base64_decode, parse_plain_credentials};
use crate::store::UserStore;

use super::{capability, store_err, Outcome, Phase, Session};

const SASL_CONTINUATION_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn handle_starttls<S: UserStore>(session: &Session<S>, args: &[Token]) -> Result<Outcome> {
    if !args.is_empty() {
        return Ok(Outcome::bad("STARTTLS takes no arguments"));
    }
    if session.tls_active {
        return Ok(Outcome::no("TLS already active"));
    }
    Ok(Outcome::ok("Begin TLS negotiation now"))
}

pub async fn handle_login<S: UserStore>(session: &mut Session<S>, args: &[Token]) -> Result<Outcome> {
    if !session.tls_active {
        return Ok(Outcome::no_code(
            "PRIVACYREQUIRED",
            "LOGIN is disabled on insecure connection. Use STARTTLS first.",
        ));
    }
    let [user, pass] = args else {
        return Ok(Outcome::bad("LOGIN requires exactly two arguments"));
    };
    let (Some(user), Some(pass)) = (user.as_str_value(), pass.as_str_value()) else {
        return Ok(Outcome::bad("LOGIN arguments must be strings"));
    };
    authenticate(session, &user, &pass).await
}

pub async fn handle_authenticate<S, C>(
    session: &mut Session<S>,
    codec: &mut Codec<C>,
    args: &[Token],
) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(mechanism) = args.first().and_then(Token::as_str_value) else {
        return Ok(Outcome::bad("AUTHENTICATE requires a mechanism"));
    };
    if !mechanism.eq_ignore_ascii_case("PLAIN") {
        return Ok(Outcome::no("Unsupported authentication mechanism"));
    }
    if !session.tls_active {
        return Ok(Outcome::no("Authentication requires a secure connection"));
    }

    codec.write_continuation("").await?;
    let line = match timeout(SASL_CONTINUATION_TIMEOUT, codec.read_line_raw()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Ok(Outcome::no("Connection closed during authentication")),
        Ok(Err(e)) => return Err(e),
        Err(_) => return Ok(Outcome::no("Authentication timed out")),
    };

    let trimmed: &[u8] = {
        let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
        let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
        &line[start..end]
    };
    if trimmed == b"*" {
        return Ok(Outcome::bad("Authentication exchange cancelled"));
    }

    let Ok(decoded) = base64_decode(trimmed) else {
        return Ok(Outcome::bad("Invalid SASL response"));
    };
    let Some((authcid, password)) = parse_sasl_plain(&decoded) else {
        return Ok(Outcome::bad("Invalid SASL response"));
    };

    authenticate(session, &authcid, &password).await
}

/// PLAIN decodes as `authzid\0authcid\0password`; a bare `user\0password`
/// (two parts, no authzid) is also accepted per §4.4.
fn parse_sasl_plain(bytes: &[u8]) -> Option<(String, String)> {
    if let Ok((_, authcid, password)) = parse_plain_credentials(bytes) {
        return Some((authcid, password));
    }
    let mut parts = bytes.splitn(2, |&b| b == 0);
    let user = parts.next()?;
    let rest = parts.next()?;
    if user.is_empty() || rest.contains(&0) {
        return None;
    }
    Some((
        String::from_utf8(user.to_vec()).ok()?,
        String::from_utf8(rest.to_vec()).ok()?,
    ))
}

async fn authenticate<S: UserStore>(session: &mut Session<S>, username: &str, password: &str) -> Result<Outcome> {
    let email = session.config.normalize_email(username);
    let (local, domain) = match email.split_once('@') {
        Some((l, d)) => (l.to_string(), d.to_string()),
        None => (email.clone(), session.config.domain.clone()),
    };

    match verify_credentials(&session.config, &email, password).await {
        AuthOutcome::Accepted => {}
        AuthOutcome::Rejected => {
            return Ok(Outcome::no_code("AUTHENTICATIONFAILED", "Authentication failed"))
        }
        AuthOutcome::Unavailable => {
            return Ok(Outcome::no_code("UNAVAILABLE", "Identity service unavailable"))
        }
        AuthOutcome::ServerBug => return Ok(Outcome::no_code("SERVERBUG", "Server misconfigured")),
    }

    let (user_id, domain_id) = session.store.open_user(&local, &domain).await.map_err(store_err)?;
    let roles = session.store.get_user_role_assignments(user_id).await.map_err(store_err)?;

    session.user_id = user_id;
    session.domain_id = domain_id;
    session.username = email;
    session.role_mailbox_ids = roles.into_iter().map(|r| r.role_mailbox_id).collect();
    session.phase = Phase::Authenticated;

    Ok(Outcome::ok(format!(
        "[CAPABILITY {}] Authenticated",
        capability::capability_string(true)
    )))
}
