/*
 * plain.rs
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

//! PLAIN SASL (RFC 4616), server side. Requires TLS to be active before use.

use super::SaslError;

/// Decode base64 to bytes, as sent after the "+" continuation prompt.
pub fn base64_decode(encoded: &[u8]) -> Result<Vec<u8>, SaslError> {
    let mut out = Vec::with_capacity(encoded.len() * 3 / 4);
    let mut n = 0u32;
    let mut bits = 0u8;
    for &b in encoded {
        let v = match b {
            b'A'..=b'Z' => (b - b'A') as u32,
            b'a'..=b'z' => (b - b'a' + 26) as u32,
            b'0'..=b'9' => (b - b'0' + 52) as u32,
            b'+' => 62,
            b'/' => 63,
            b'=' => continue,
            _ => return Err(SaslError::invalid("invalid base64")),
        };
        n = (n << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((n >> bits) as u8);
        }
    }
    Ok(out)
}

/// Encode bytes to base64, for the server's own SASL responses (unused in PLAIN's
/// one-shot case today, kept because the codec's continuation writer expects it
/// for other mechanisms we may add later).
pub fn base64_encode(b: &[u8]) -> Vec<u8> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = Vec::with_capacity((b.len() + 2) / 3 * 4);
    for chunk in b.chunks(3) {
        let n = (chunk[0] as usize) << 16
            | (chunk.get(1).copied().unwrap_or(0) as usize) << 8
            | chunk.get(2).copied().unwrap_or(0) as usize;
        out.push(ALPHABET[n >> 18]);
        out.push(ALPHABET[(n >> 12) & 63]);
        out.push(if chunk.len() > 1 { ALPHABET[(n >> 6) & 63] } else { b'=' });
        out.push(if chunk.len() > 2 { ALPHABET[n & 63] } else { b'=' });
    }
    out
}

/// Parse PLAIN credentials (authzid NUL authcid NUL password).
pub fn parse_plain_credentials(credentials: &[u8]) -> Result<(String, String, String), SaslError> {
    let mut first = None;
    let mut second = None;
    for (i, &b) in credentials.iter().enumerate() {
        if b == 0 {
            if first.is_none() {
                first = Some(i);
            } else {
                second = Some(i);
                break;
            }
        }
    }
    let (f, s) = first.and_then(|f| second.map(|s| (f, s))).ok_or_else(SaslError::plain_invalid)?;
    let authzid = String::from_utf8(credentials[..f].to_vec()).map_err(|_| SaslError::plain_invalid())?;
    let authcid = String::from_utf8(credentials[f + 1..s].to_vec()).map_err(|_| SaslError::plain_invalid())?;
    let password = String::from_utf8(credentials[s + 1..].to_vec()).map_err(|_| SaslError::plain_invalid())?;
    Ok((authzid, authcid, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_authzid_authcid_password() {
        let creds = b"\0alice\0hunter2";
        let (authzid, authcid, password) = parse_plain_credentials(creds).unwrap();
        assert_eq!(authzid, "");
        assert_eq!(authcid, "alice");
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn rejects_missing_separators() {
        assert!(parse_plain_credentials(b"nosnulls").is_err());
    }

    #[test]
    fn base64_round_trips() {
        let raw = b"\0bob@example.com\0s3cret";
        let encoded = base64_encode(raw);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, raw);
    }
}
