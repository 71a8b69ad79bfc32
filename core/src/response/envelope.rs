/*
 * envelope.rs
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

//! ENVELOPE construction (RFC 3501 §7.4.2): `(date subject from sender
//! reply-to to cc bcc in-reply-to message-id)`. Only the outermost
//! message's headers populate the envelope; headers on nested MIME parts
//! (which RFC 5322 does not expect to carry Date/From/etc, but malformed
//! input might) are ignored.

use chrono::{DateTime, FixedOffset};

use crate::mime::{
    EmailAddress, MessageHandler, MessageParser, MimeHandler, MimeParseError, ObsoleteStructureType,
};

use super::{imap_quote, nil_or_quote};

#[derive(Default)]
struct Collector {
    entities_started: u32,
    date: Option<String>,
    subject: Option<String>,
    from: Vec<EmailAddress>,
    sender: Vec<EmailAddress>,
    reply_to: Vec<EmailAddress>,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    in_reply_to: Option<String>,
    message_id: Option<String>,
}

impl Collector {
    fn is_root(&self) -> bool {
        self.entities_started <= 1
    }
}

impl MimeHandler for Collector {
    fn start_entity(&mut self, _boundary: Option<&str>) -> Result<(), MimeParseError> {
        self.entities_started += 1;
        Ok(())
    }

    fn header(&mut self, name: &str, value: &str) -> Result<(), MimeParseError> {
        if self.is_root() && name.eq_ignore_ascii_case("subject") {
            self.subject = Some(value.to_string());
        }
        Ok(())
    }
}

impl MessageHandler for Collector {
    fn date_header(&mut self, name: &str, date: DateTime<FixedOffset>) -> Result<(), MimeParseError> {
        if self.is_root() && name.eq_ignore_ascii_case("date") {
            self.date = Some(date.to_rfc2822());
        }
        Ok(())
    }

    fn address_header(&mut self, name: &str, addresses: &[EmailAddress]) -> Result<(), MimeParseError> {
        if !self.is_root() {
            return Ok(());
        }
        let addrs = addresses.to_vec();
        match name.to_ascii_lowercase().as_str() {
            "from" => self.from = addrs,
            "sender" => self.sender = addrs,
            "reply-to" => self.reply_to = addrs,
            "to" => self.to = addrs,
            "cc" => self.cc = addrs,
            "bcc" => self.bcc = addrs,
            _ => {}
        }
        Ok(())
    }

    fn message_id_header(&mut self, name: &str, ids: &[crate::mime::ContentID]) -> Result<(), MimeParseError> {
        if !self.is_root() {
            return Ok(());
        }
        if let Some(id) = ids.first() {
            let formatted = format!("<{}@{}>", id.get_local_part(), id.get_domain());
            if name.eq_ignore_ascii_case("message-id") {
                self.message_id = Some(formatted);
            } else if name.eq_ignore_ascii_case("in-reply-to") {
                self.in_reply_to = Some(formatted);
            }
        }
        Ok(())
    }

    fn obsolete_structure(&mut self, _kind: ObsoleteStructureType) -> Result<(), MimeParseError> {
        Ok(())
    }
}

fn address_list(addrs: &[EmailAddress]) -> String {
    if addrs.is_empty() {
        return "NIL".to_string();
    }
    let mut out = String::from("(");
    for (i, a) in addrs.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push('(');
        out.push_str(&nil_or_quote(a.display_name()));
        out.push_str(" NIL ");
        out.push_str(&imap_quote(a.local_part()));
        out.push(' ');
        out.push_str(&imap_quote(a.domain()));
        out.push(')');
    }
    out.push(')');
    out
}

/// Build the ENVELOPE parenthesized list for one message's raw RFC-822 form.
pub fn build_envelope(raw: &[u8]) -> String {
    let mut parser = MessageParser::new(Collector::default());
    let _ = parser.receive(raw);
    let _ = parser.close();
    let c = parser.into_inner();

    let sender = if c.sender.is_empty() { &c.from } else { &c.sender };
    let reply_to = if c.reply_to.is_empty() { &c.from } else { &c.reply_to };

    format!(
        "({} {} {} {} {} {} {} {} {} {})",
        nil_or_quote(c.date.as_deref()),
        nil_or_quote(c.subject.as_deref()),
        address_list(&c.from),
        address_list(sender),
        address_list(reply_to),
        address_list(&c.to),
        address_list(&c.cc),
        address_list(&c.bcc),
        nil_or_quote(c.in_reply_to.as_deref()),
        nil_or_quote(c.message_id.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_envelope_with_from_and_subject() {
        let raw = b"From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: Hi\r\nDate: Fri, 21 Nov 1997 09:55:06 -0600\r\nMessage-ID: <abc@example.com>\r\n\r\nBody\r\n";
        let env = build_envelope(raw);
        assert!(env.contains("\"Hi\""));
        assert!(env.contains("\"Alice\" NIL \"alice\" \"example.com\""));
        assert!(env.contains("<abc@example.com>"));
    }

    #[test]
    fn sender_and_reply_to_default_to_from() {
        let raw = b"From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        let env = build_envelope(raw);
        // from, sender, reply-to should all carry the same single address.
        let occurrences = env.matches("\"alice\" \"example.com\"").count();
        assert_eq!(occurrences, 3);
    }

    #[test]
    fn missing_headers_are_nil() {
        let raw = b"Subject: only subject\r\n\r\nBody\r\n";
        let env = build_envelope(raw);
        assert!(env.starts_with("(NIL \"only subject\" NIL NIL NIL NIL NIL NIL NIL NIL)"));
    }
}
