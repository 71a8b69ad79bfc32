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

//! Network helpers, split by which end of the connection they serve:
//! `client` dials outbound TLS (used by the identity-service HTTP call),
//! `server` accepts inbound IMAP connections, plain or TLS.

pub mod client;
pub mod server;

pub use client::{
    connect_implicit_tls, connect_plain, connect_starttls, http_client_config, PlainStream,
    TlsStream, TlsStreamWrapper,
};
pub use server::{install_crypto_provider, load_server_config, Connection};
