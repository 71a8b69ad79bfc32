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

//! HTTP client: used only to speak to Raven's external identity service
//! (one JSON POST per LOGIN/AUTHENTICATE, §6 of the engine spec).
//!
//! - Callback-based response API (Gumdrop-shaped): `ResponseHandler` with `ok`/`error`, `header`, `start_body`, `body_chunk`, `end_body`, `complete`, `failed`.
//! - Buffers: `bytes` crate (BytesMut for parse buffer, Bytes for payload slices).
//! - HTTP/1.1 only: a state-machine response parser. The original client also
//!   carried an HTTP/2 + HPACK stack for its Graph API backend; the identity
//!   service is plain JSON-over-HTTP/1.1, so that stack isn't carried here.

mod handler;
mod request;
mod response;

pub mod h1;

pub use handler::ResponseHandler;
pub use h1::H1ResponseHandler;
pub use request::{Method, RequestBuilder};
pub use response::Response;

pub mod client;
pub mod connection;

pub use client::HttpClient;
pub use connection::HttpConnection;
