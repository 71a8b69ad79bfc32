/*
 * lib.rs
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

//! Raven: a multi-tenant IMAP4rev1 mail-access server engine.
//!
//! This crate is transport- and storage-agnostic: [`net`] tags accepted
//! sockets (plain/TLS/mock) behind one `AsyncRead + AsyncWrite` type,
//! [`store`] defines the backend contract, and [`session`] drives the
//! protocol state machine over both. The `raven-server` binary wires a real
//! listener and store implementation to [`session::run_connection`].

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod mime;
pub mod net;
pub mod parser;
pub mod protocol;
pub mod response;
pub mod sasl;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{RavenError, Result};
pub use net::{install_crypto_provider, load_server_config, Connection};
pub use session::run_connection;
pub use store::{mem::MemStore, UserStore};
