/*
 * error.rs
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

//! Errors returned by the User Store. The engine classifies these into
//! IMAP-level NO/BAD responses; nothing here is fatal to the connection.

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// No mailbox at that path.
    NotFound,
    /// CREATE of a path that already exists.
    AlreadyExists,
    /// DELETE of a mailbox with inferior hierarchical children.
    HasChildren,
    /// Opaque backend failure (SQL error, blob I/O, etc).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "mailbox not found"),
            StoreError::AlreadyExists => write!(f, "mailbox already exists"),
            StoreError::HasChildren => write!(f, "mailbox has inferior children"),
            StoreError::Backend(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for StoreError {}
