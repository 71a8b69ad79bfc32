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

//! The identity-service contract (§6): `POST` a JSON `{"email","password"}`
//! body, classify the response into the three outcomes LOGIN/AUTHENTICATE
//! care about. No response body is ever consumed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::config::Config;
use crate::protocol::http::{HttpClient, Method, Response, ResponseHandler};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// 2xx: credentials accepted.
    Accepted,
    /// 4xx: credentials rejected.
    Rejected,
    /// 5xx or transport failure: identity service unreachable.
    Unavailable,
    /// `auth_server_url` missing or unparsable.
    ServerBug,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// POST credentials to `config.auth_server_url` and classify the result.
pub async fn verify_credentials(config: &Config, email: &str, password: &str) -> AuthOutcome {
    let Some(target) = parse_url(&config.auth_server_url) else {
        return AuthOutcome::ServerBug;
    };

    let body = match serde_json::to_vec(&Credentials { email, password }) {
        Ok(b) => b,
        Err(_) => return AuthOutcome::ServerBug,
    };

    match timeout(REQUEST_TIMEOUT, post(&target, body)).await {
        Ok(Ok(status)) => classify(status),
        Ok(Err(_)) => AuthOutcome::Unavailable,
        Err(_) => AuthOutcome::Unavailable,
    }
}

fn classify(status: u16) -> AuthOutcome {
    match status {
        200..=299 => AuthOutcome::Accepted,
        400..=499 => AuthOutcome::Rejected,
        _ => AuthOutcome::Unavailable,
    }
}

struct StatusOnly {
    code: Arc<Mutex<Option<u16>>>,
}

impl ResponseHandler for StatusOnly {
    fn ok(&mut self, response: Response) {
        *self.code.lock().unwrap() = Some(response.code);
    }
    fn error(&mut self, response: Response) {
        *self.code.lock().unwrap() = Some(response.code);
    }
    fn header(&mut self, _name: &str, _value: &str) {}
    fn start_body(&mut self) {}
    fn body_chunk(&mut self, _data: &[u8]) {}
    fn end_body(&mut self) {}
    fn complete(&mut self) {}
    fn failed(&mut self, _error: &std::io::Error) {}
}

async fn post(target: &ParsedUrl, body: Vec<u8>) -> std::io::Result<u16> {
    let mut conn = HttpClient::connect(&target.host, target.port, target.tls).await?;
    let mut req = conn.request(Method::Post, target.path.clone());
    req.header("Content-Type", "application/json");
    req.header("Content-Length", body.len().to_string());
    req.body(body);
    let code = Arc::new(Mutex::new(None));
    let handler = StatusOnly { code: code.clone() };
    conn.send(req, handler).await?;
    code.lock()
        .unwrap()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no status line"))
}

struct ParsedUrl {
    tls: bool,
    host: String,
    port: u16,
    path: String,
}

/// Minimal `scheme://host[:port][/path]` split; this is the only URL the
/// engine ever dials, so a full `url` crate is more than this needs.
fn parse_url(raw: &str) -> Option<ParsedUrl> {
    let (scheme, rest) = raw.split_once("://")?;
    let tls = match scheme {
        "https" => true,
        "http" => false,
        _ => return None,
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return None;
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse().ok()?),
        None => (authority, if tls { 443 } else { 80 }),
    };
    Some(ParsedUrl {
        tls,
        host: host.to_string(),
        port,
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_url_with_path() {
        let u = parse_url("https://auth.example.com/verify").unwrap();
        assert!(u.tls);
        assert_eq!(u.host, "auth.example.com");
        assert_eq!(u.port, 443);
        assert_eq!(u.path, "/verify");
    }

    #[test]
    fn parses_explicit_port() {
        let u = parse_url("http://127.0.0.1:8080/login").unwrap();
        assert!(!u.tls);
        assert_eq!(u.port, 8080);
        assert_eq!(u.path, "/login");
    }

    #[test]
    fn defaults_path_to_root() {
        let u = parse_url("https://auth.example.com").unwrap();
        assert_eq!(u.path, "/");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_url("ftp://example.com").is_none());
    }

    #[test]
    fn classifies_status_codes() {
        assert_eq!(classify(200), AuthOutcome::Accepted);
        assert_eq!(classify(401), AuthOutcome::Rejected);
        assert_eq!(classify(403), AuthOutcome::Rejected);
        assert_eq!(classify(500), AuthOutcome::Unavailable);
        assert_eq!(classify(503), AuthOutcome::Unavailable);
    }
}
