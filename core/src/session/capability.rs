/*
 * capability.rs
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

//! CAPABILITY string (§4.4): TLS-conditional auth advertisement plus the
//! fixed set of extensions the engine supports.

/// Space-joined capability list, without the leading `* CAPABILITY ` or the
/// trailing response text.
pub fn capability_string(tls_active: bool) -> String {
    let mut caps = vec!["IMAP4rev1"];
    if tls_active {
        caps.push("AUTH=PLAIN");
        caps.push("LOGIN");
    } else {
        caps.push("STARTTLS");
        caps.push("LOGINDISABLED");
    }
    caps.push("UIDPLUS");
    caps.push("IDLE");
    caps.push("NAMESPACE");
    caps.push("UNSELECT");
    caps.push("LITERAL+");
    caps.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_advertises_starttls_and_logindisabled() {
        let caps = capability_string(false);
        assert!(caps.contains("STARTTLS"));
        assert!(caps.contains("LOGINDISABLED"));
        assert!(!caps.contains("AUTH=PLAIN"));
    }

    #[test]
    fn secure_advertises_auth_plain_and_login() {
        let caps = capability_string(true);
        assert!(caps.contains("AUTH=PLAIN"));
        assert!(caps.contains("LOGIN"));
        assert!(!caps.contains("STARTTLS"));
        assert!(!caps.contains("LOGINDISABLED"));
    }

    #[test]
    fn always_advertises_fixed_extensions() {
        for tls in [false, true] {
            let caps = capability_string(tls);
            for ext in ["UIDPLUS", "IDLE", "NAMESPACE", "UNSELECT", "LITERAL+", "IMAP4rev1"] {
                assert!(caps.contains(ext), "{caps} missing {ext}");
            }
        }
    }
}
