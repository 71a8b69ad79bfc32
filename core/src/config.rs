/*
 * config.rs
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

//! Server configuration: discovery, parse, and the TLS/listener settings the
//! engine needs to bind ports. Per spec §6, discovery tries the first
//! readable of a fixed path list; parsing is plain `serde_yaml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RavenError, Result};

const DISCOVERY_PATHS: &[&str] = &[
    "/etc/raven/raven.yaml",
    "./config/raven.yaml",
    "./raven.yaml",
    "config/raven.yaml",
];

/// Server configuration as loaded from `raven.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Default e-mail domain appended to bare usernames on LOGIN/AUTHENTICATE.
    pub domain: String,
    /// Identity service URL; POSTed to for credential verification.
    pub auth_server_url: String,
    /// Opaque blob storage configuration, handed to the store unexamined.
    #[serde(default)]
    pub blob_storage: serde_json::Value,
    /// Listener configuration (not mandated by spec.md, but the engine needs
    /// somewhere to get bind addresses and certificate paths from).
    #[serde(default)]
    pub listen: ListenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Plaintext, STARTTLS-capable IMAP port (e.g. "0.0.0.0:143").
    #[serde(default = "default_plain_addr")]
    pub plain_addr: String,
    /// Implicit-TLS IMAPS port (e.g. "0.0.0.0:993").
    #[serde(default = "default_tls_addr")]
    pub tls_addr: String,
    /// PEM certificate chain path for the TLS listener.
    pub tls_cert_path: Option<PathBuf>,
    /// PEM private key path for the TLS listener.
    pub tls_key_path: Option<PathBuf>,
}

fn default_plain_addr() -> String {
    "0.0.0.0:143".to_string()
}

fn default_tls_addr() -> String {
    "0.0.0.0:993".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            plain_addr: default_plain_addr(),
            tls_addr: default_tls_addr(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    /// Discover and load configuration from the first readable well-known path.
    pub fn discover() -> Result<Self> {
        for candidate in DISCOVERY_PATHS {
            let path = Path::new(candidate);
            if path.is_file() {
                return Self::load(path);
            }
        }
        Err(RavenError::Config(format!(
            "no configuration file found in {:?}",
            DISCOVERY_PATHS
        )))
    }

    /// Load configuration from an explicit path (used by `--config` overrides and tests).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RavenError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| RavenError::Config(format!("invalid config: {e}")))
    }

    /// Normalize a bare username to an e-mail address using the configured domain.
    /// `user` -> `user@<domain>`; `user@x` is kept as-is.
    pub fn normalize_email(&self, username: &str) -> String {
        if username.contains('@') {
            username.to_string()
        } else {
            format!("{username}@{}", self.domain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg = Config::parse(
            "domain: example.com\nauth_server_url: https://auth.example.com/verify\n",
        )
        .unwrap();
        assert_eq!(cfg.domain, "example.com");
        assert_eq!(cfg.listen.plain_addr, "0.0.0.0:143");
        assert_eq!(cfg.listen.tls_addr, "0.0.0.0:993");
    }

    #[test]
    fn normalizes_bare_username() {
        let cfg = Config::parse("domain: example.com\nauth_server_url: x\n").unwrap();
        assert_eq!(cfg.normalize_email("alice"), "alice@example.com");
        assert_eq!(cfg.normalize_email("alice@other.org"), "alice@other.org");
    }

    #[test]
    fn discover_fails_with_no_candidates() {
        // Relies on test cwd not containing any of the discovery files.
        let result = Config::discover();
        if result.is_ok() {
            // If a real raven.yaml happens to exist in the test environment,
            // this test degrades to a no-op rather than a false failure.
            return;
        }
        assert!(matches!(result, Err(RavenError::Config(_))));
    }
}
