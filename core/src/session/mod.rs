/*
 * mod.rs
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

//! Session state machine (C3): owns per-connection state, dispatches parsed
//! commands to handlers by phase, and drives the top-level connection loop
//! including the STARTTLS restart (a fresh `Session` begins on the upgraded
//! socket, per §4.3).

mod auth;
pub mod capability;
mod copy;
mod fetch;
mod flags;
mod idle;
mod mailbox;
pub mod pattern;
mod search;
mod selection;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tracing::{info, info_span, Instrument};

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Result;
use crate::net::server::Connection;
use crate::parser::{parse_command, ParsedCommand, Token};
use crate::store::UserStore;

/// Connection-lifetime phase (§3/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Authenticated,
    Selected,
    Logout,
}

/// The mailbox currently bound by SELECT/EXAMINE (§3).
#[derive(Debug, Clone)]
pub struct Selection {
    pub mailbox_id: i64,
    pub mailbox_path: String,
    pub read_only: bool,
    pub uid_validity: u32,
    pub uid_next: u32,
    pub last_exists: u32,
    pub last_unseen: u32,
    pub is_role: bool,
    pub role_mailbox_id: i64,
}

/// Per-connection session state (§3). Not shared across connections; no
/// locking is needed since each lives entirely inside its own task.
pub struct Session<S: UserStore> {
    pub phase: Phase,
    pub tls_active: bool,
    pub user_id: i64,
    pub domain_id: i64,
    pub username: String,
    pub role_mailbox_ids: Vec<i64>,
    pub selection: Option<Selection>,
    pub store: Arc<S>,
    pub config: Arc<Config>,
}

impl<S: UserStore> Session<S> {
    fn new(store: Arc<S>, config: Arc<Config>, tls_active: bool) -> Self {
        Self {
            phase: Phase::Unauthenticated,
            tls_active,
            user_id: 0,
            domain_id: 0,
            username: String::new(),
            role_mailbox_ids: Vec::new(),
            selection: None,
            store,
            config,
        }
    }

    /// Drop any bound Selection, e.g. on SELECT-replace, CLOSE, UNSELECT, or
    /// when the store reports a UIDVALIDITY change invalidating it.
    fn clear_selection(&mut self) {
        self.selection = None;
        if self.phase == Phase::Selected {
            self.phase = Phase::Authenticated;
        }
    }
}

/// What a command handler decided, prior to being serialized onto the wire.
/// Centralizing this (rather than every handler formatting its own tagged
/// line) keeps response-code formatting consistent.
pub enum Outcome {
    Ok(String),
    /// `response_code` becomes `[CODE]` when present.
    No { response_code: Option<&'static str>, text: String },
    Bad(String),
    /// Emits `* BYE <text>` then closes the connection; no tagged response.
    Bye(String),
}

impl Outcome {
    fn ok(text: impl Into<String>) -> Self {
        Outcome::Ok(text.into())
    }

    fn no(text: impl Into<String>) -> Self {
        Outcome::No { response_code: None, text: text.into() }
    }

    fn no_code(code: &'static str, text: impl Into<String>) -> Self {
        Outcome::No { response_code: Some(code), text: text.into() }
    }

    fn bad(text: impl Into<String>) -> Self {
        Outcome::Bad(text.into())
    }
}

enum Dispatched {
    Continue,
    StartTls,
    Logout,
}

/// Canonicalize `INBOX` case-insensitively; every other path segment passes
/// through unchanged. Shared by the mailbox manager and selection resolution
/// since both accept mailbox paths from client input.
pub(super) fn canonicalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| if seg.eq_ignore_ascii_case("INBOX") { "INBOX" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lifts a store failure into the crate's connection-fatal error type.
/// Handlers use this for failures that indicate a broken backend rather than
/// a normal semantic refusal (those are mapped to `Outcome::no` instead).
pub(super) fn store_err(e: crate::store::StoreError) -> crate::error::RavenError {
    crate::error::RavenError::Store(e.to_string())
}

/// Accept loop entry point: owns one connection end-to-end, including any
/// number of STARTTLS restarts.
pub async fn run_connection<S>(
    connection: Connection,
    store: Arc<S>,
    config: Arc<Config>,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
    peer: std::net::SocketAddr,
) -> Result<()>
where
    S: UserStore + 'static,
{
    let span = info_span!("connection", %peer);
    async move {
        let mut codec = Codec::new(connection);
        loop {
            let tls_active = codec.get_mut().is_tls();
            let mut session = Session::new(store.clone(), config.clone(), tls_active);
            match run_session(&mut session, &mut codec).await? {
                Dispatched::StartTls => {
                    let acceptor = tls_acceptor
                        .as_ref()
                        .expect("STARTTLS accepted without a configured TLS acceptor");
                    let inner = codec.into_inner();
                    let upgraded = inner.upgrade(acceptor).await?;
                    codec = Codec::new(upgraded);
                    info!("STARTTLS upgrade complete, session restarted");
                    continue;
                }
                Dispatched::Logout | Dispatched::Continue => return Ok(()),
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_session<S, C>(session: &mut Session<S>, codec: &mut Codec<C>) -> Result<Dispatched>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let raw = match codec.read_command().await? {
            Some(r) => r,
            None => return Ok(Dispatched::Continue),
        };
        let parsed = match parse_command(&raw) {
            Ok(p) => p,
            Err(e) => {
                match &e.tag {
                    Some(tag) => codec.write_tagged(tag, "BAD", &e.message).await?,
                    None => codec.write_untagged(&format!("BAD {}", e.message)).await?,
                }
                continue;
            }
        };
        match dispatch(session, codec, &parsed).await? {
            Dispatched::Continue => {}
            exit @ (Dispatched::StartTls | Dispatched::Logout) => return Ok(exit),
        }
    }
}

async fn dispatch<S, C>(
    session: &mut Session<S>,
    codec: &mut Codec<C>,
    cmd: &ParsedCommand,
) -> Result<Dispatched>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let span = info_span!("command", tag = %cmd.tag, command = %cmd.command);
    async move {
        let outcome = run_command(session, codec, cmd).await?;
        let exit = matches!(
            (&cmd.command[..], &outcome),
            ("LOGOUT", _) | (_, Outcome::Bye(_))
        );
        let starttls_accepted = cmd.command == "STARTTLS" && matches!(outcome, Outcome::Ok(_));
        write_outcome(codec, &cmd.tag, &cmd.command, outcome).await?;
        if exit {
            return Ok(Dispatched::Logout);
        }
        if starttls_accepted {
            return Ok(Dispatched::StartTls);
        }
        Ok(Dispatched::Continue)
    }
    .instrument(span)
    .await
}

async fn write_outcome<C>(codec: &mut Codec<C>, tag: &str, command: &str, outcome: Outcome) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    match outcome {
        Outcome::Ok(text) => codec.write_tagged(tag, "OK", &text).await,
        Outcome::No { response_code, text } => {
            let text = match response_code {
                Some(code) => format!("[{code}] {text}"),
                None => text,
            };
            codec.write_tagged(tag, "NO", &text).await
        }
        Outcome::Bad(text) => codec.write_tagged(tag, "BAD", &text).await,
        Outcome::Bye(text) => {
            codec.write_untagged(&format!("BYE {text}")).await?;
            if command != "LOGOUT" {
                return Ok(());
            }
            codec.write_tagged(tag, "OK", "LOGOUT completed").await
        }
    }
}

/// Per-command phase validity (§4.3) plus delegation to the handler.
async fn run_command<S, C>(
    session: &mut Session<S>,
    codec: &mut Codec<C>,
    cmd: &ParsedCommand,
) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let command = cmd.command.as_str();
    let args = &cmd.args;

    // Commands valid in every phase.
    match command {
        "CAPABILITY" => {
            codec
                .write_untagged(&format!("CAPABILITY {}", capability::capability_string(session.tls_active)))
                .await?;
            return Ok(Outcome::ok("CAPABILITY completed"));
        }
        "LOGOUT" => {
            session.phase = Phase::Logout;
            codec.write_untagged("BYE Raven logging out").await?;
            return Ok(Outcome::ok("LOGOUT completed"));
        }
        "NOOP" => return idle::handle_noop(session, codec).await,
        _ => {}
    }

    match (session.phase, command) {
        (Phase::Unauthenticated, "STARTTLS") => auth::handle_starttls(session, args).await,
        (Phase::Unauthenticated, "LOGIN") => auth::handle_login(session, args).await,
        (Phase::Unauthenticated, "AUTHENTICATE") => auth::handle_authenticate(session, codec, args).await,
        (Phase::Authenticated | Phase::Selected, "LIST") => mailbox::handle_list(session, codec, args, false).await,
        (Phase::Authenticated | Phase::Selected, "LSUB") => mailbox::handle_list(session, codec, args, true).await,
        (Phase::Authenticated | Phase::Selected, "CREATE") => mailbox::handle_create(session, args).await,
        (Phase::Authenticated | Phase::Selected, "DELETE") => mailbox::handle_delete(session, args).await,
        (Phase::Authenticated | Phase::Selected, "RENAME") => mailbox::handle_rename(session, args).await,
        (Phase::Authenticated | Phase::Selected, "SUBSCRIBE") => mailbox::handle_subscribe(session, args, true).await,
        (Phase::Authenticated | Phase::Selected, "UNSUBSCRIBE") => mailbox::handle_subscribe(session, args, false).await,
        (Phase::Authenticated | Phase::Selected, "STATUS") => mailbox::handle_status(session, codec, args).await,
        (Phase::Authenticated | Phase::Selected, "NAMESPACE") => Ok(mailbox::handle_namespace(codec).await?),
        (Phase::Authenticated | Phase::Selected, "APPEND") => copy::handle_append(session, codec, args).await,
        (Phase::Authenticated | Phase::Selected, "SELECT") => selection::handle_select(session, codec, args, false).await,
        (Phase::Authenticated | Phase::Selected, "EXAMINE") => selection::handle_select(session, codec, args, true).await,
        (Phase::Selected, "CHECK") => Ok(Outcome::ok("CHECK completed")),
        (Phase::Selected, "CLOSE") => selection::handle_close(session, true).await,
        (Phase::Selected, "UNSELECT") => selection::handle_close(session, false).await,
        (Phase::Selected, "EXPUNGE") => flags::handle_expunge(session, codec).await,
        (Phase::Selected, "SEARCH") => search::handle_search(session, codec, args, false).await,
        (Phase::Selected, "FETCH") => fetch::handle_fetch(session, codec, args, false).await,
        (Phase::Selected, "STORE") => flags::handle_store(session, codec, args, false).await,
        (Phase::Selected, "COPY") => copy::handle_copy(session, args, false).await,
        (Phase::Selected, "UID") => handle_uid(session, codec, args).await,
        (Phase::Authenticated | Phase::Selected, "IDLE") => idle::handle_idle(session, codec).await,
        (_, "STARTTLS" | "LOGIN" | "AUTHENTICATE") => Ok(Outcome::no("Command not permitted in this state")),
        _ => Ok(Outcome::bad(format!("{command} unknown or not permitted in this state"))),
    }
}

/// `UID FETCH|SEARCH|STORE|COPY ...` (§4.8): re-dispatches to the same
/// handlers with `uid = true`, per the sequence-set/response differences
/// documented on each handler.
async fn handle_uid<S, C>(session: &mut Session<S>, codec: &mut Codec<C>, args: &[Token]) -> Result<Outcome>
where
    S: UserStore,
    C: AsyncRead + AsyncWrite + Unpin,
{
    let Some(sub) = args.first().and_then(Token::as_str_value) else {
        return Ok(Outcome::bad("UID requires a subcommand"));
    };
    let rest = &args[1..];
    match sub.to_ascii_uppercase().as_str() {
        "FETCH" => fetch::handle_fetch(session, codec, rest, true).await,
        "SEARCH" => search::handle_search(session, codec, rest, true).await,
        "STORE" => flags::handle_store(session, codec, rest, true).await,
        "COPY" => copy::handle_copy(session, rest, true).await,
        other => Ok(Outcome::bad(format!("unknown UID subcommand {other}"))),
    }
}

