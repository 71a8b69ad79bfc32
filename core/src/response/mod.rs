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

//! Response builders (C10): ENVELOPE and BODYSTRUCTURE construction from a
//! MIME tree, plus the header-field extraction FETCH needs for
//! `BODY[HEADER.FIELDS (...)]`.

pub mod bodystructure;
pub mod envelope;
pub mod header;

pub use bodystructure::{build_body, build_bodystructure};
pub use envelope::build_envelope;
pub use header::{extract_header_fields, folded_headers};

/// Quote a string for IMAP output, escaping `\` and `"`.
pub fn imap_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// `NIL` if absent, else a quoted string.
pub fn nil_or_quote(s: Option<&str>) -> String {
    match s {
        Some(v) => imap_quote(v),
        None => "NIL".to_string(),
    }
}

/// Format a byte string as an IMAP literal: `{N}\r\n<bytes>`.
pub fn literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 16);
    out.extend_from_slice(format!("{{{}}}\r\n", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out
}
