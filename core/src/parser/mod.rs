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

//! Command parser (C2): tokenizes an assembled command line into
//! `(tag, command, args)`. Sequence sets, fetch-item lists, search keys and
//! flag lists are parsed on demand by the handler that consumes them, from
//! the generic [`Token`] tree this module produces.

pub mod sequence_set;

use crate::codec::RawLine;

/// One parsed token. Literals carry raw bytes regardless of content;
/// everything else is parsed as UTF-8 (the wire protocol is otherwise ASCII
/// outside of literals and mailbox names).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Atom(String),
    QuotedString(String),
    Literal(Vec<u8>),
    List(Vec<Token>),
}

impl Token {
    /// An "astring" value regardless of how it was quoted: atom, quoted
    /// string, or literal all collapse to their string content. Literals
    /// that aren't valid UTF-8 lossily convert (mailbox/message content
    /// itself is handled separately; this is for command arguments).
    pub fn as_str_value(&self) -> Option<String> {
        match self {
            Token::Atom(s) | Token::QuotedString(s) => Some(s.clone()),
            Token::Literal(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Token::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Token]> {
        match self {
            Token::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Token::Atom(s) if s.eq_ignore_ascii_case("NIL"))
    }
}

#[derive(Debug)]
pub struct ParsedCommand {
    pub tag: String,
    pub command: String,
    pub args: Vec<Token>,
}

#[derive(Debug)]
pub struct ParseError {
    /// The command's tag, when it was itself parseable (§4.2: a grammar
    /// error elsewhere in the line still gets a tagged `BAD`; only a
    /// malformed tag falls back to untagged).
    pub tag: Option<String>,
    pub message: String,
}

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        Self { tag: None, message: msg.into() }
    }
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    literals: &'a [(usize, usize)],
    pos: usize,
    next_literal: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(raw: &'a RawLine) -> Self {
        Self {
            bytes: &raw.bytes,
            literals: &raw.literals,
            pos: 0,
            next_literal: 0,
        }
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn pending_literal_at(&self, pos: usize) -> Option<(usize, usize)> {
        self.literals.get(self.next_literal).copied().filter(|&(start, _)| start == pos)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_spaces();
        if self.at_end() {
            return Ok(None);
        }
        if let Some((start, len)) = self.pending_literal_at(self.pos) {
            self.next_literal += 1;
            let bytes = self.bytes[start..start + len].to_vec();
            self.pos = start + len;
            return Ok(Some(Token::Literal(bytes)));
        }
        match self.bytes[self.pos] {
            b'(' => self.parse_list().map(Some),
            b'"' => self.parse_quoted().map(Some),
            b'{' => Err(ParseError::new("unresolved literal marker")),
            _ => self.parse_atom().map(Some),
        }
    }

    fn parse_list(&mut self) -> Result<Token, ParseError> {
        self.pos += 1; // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            if self.at_end() {
                return Err(ParseError::new("unterminated list"));
            }
            if self.bytes[self.pos] == b')' {
                self.pos += 1;
                return Ok(Token::List(items));
            }
            match self.next_token()? {
                Some(tok) => items.push(tok),
                None => return Err(ParseError::new("unterminated list")),
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<Token, ParseError> {
        self.pos += 1; // consume opening quote
        let mut out = Vec::new();
        loop {
            if self.at_end() {
                return Err(ParseError::new("unterminated quoted string"));
            }
            let b = self.bytes[self.pos];
            match b {
                b'"' => {
                    self.pos += 1;
                    let s = String::from_utf8(out).map_err(|_| ParseError::new("invalid UTF-8 in quoted string"))?;
                    return Ok(Token::QuotedString(s));
                }
                b'\\' => {
                    self.pos += 1;
                    if self.at_end() {
                        return Err(ParseError::new("unterminated escape in quoted string"));
                    }
                    out.push(self.bytes[self.pos]);
                    self.pos += 1;
                }
                b'\r' | b'\n' => return Err(ParseError::new("CR/LF not allowed in quoted string")),
                _ => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        while !self.at_end() {
            let b = self.bytes[self.pos];
            if b == b' ' || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            if let Some((lit_start, _)) = self.pending_literal_at(self.pos) {
                if lit_start == self.pos {
                    break;
                }
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(ParseError::new("empty atom"));
        }
        let s = String::from_utf8(self.bytes[start..self.pos].to_vec())
            .map_err(|_| ParseError::new("invalid UTF-8 in atom"))?;
        Ok(Token::Atom(s))
    }
}

/// Parse an assembled command line into tag, command name, and arguments.
/// Grammar errors (not semantic ones) yield `Err`; the caller responds BAD
/// without mutating session state.
pub fn parse_command(raw: &RawLine) -> Result<ParsedCommand, ParseError> {
    let mut tok = Tokenizer::new(raw);
    let tag = match tok.next_token()? {
        Some(Token::Atom(s)) => s,
        Some(_) => return Err(ParseError::new("tag must be an atom")),
        None => return Err(ParseError::new("empty command line")),
    };
    let command = match tok.next_token() {
        Ok(Some(Token::Atom(s))) => s.to_ascii_uppercase(),
        Ok(Some(_)) => return Err(ParseError { tag: Some(tag), message: "command name must be an atom".into() }),
        Ok(None) => return Err(ParseError { tag: Some(tag), message: "missing command".into() }),
        Err(mut e) => {
            e.tag = Some(tag);
            return Err(e);
        }
    };
    let mut args = Vec::new();
    loop {
        match tok.next_token() {
            Ok(Some(t)) => args.push(t),
            Ok(None) => break,
            Err(mut e) => {
                e.tag = Some(tag);
                return Err(e);
            }
        }
    }
    Ok(ParsedCommand { tag, command, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(bytes: &[u8], literals: Vec<(usize, usize)>) -> RawLine {
        RawLine { bytes: bytes.to_vec(), literals }
    }

    #[test]
    fn parses_simple_command() {
        let raw = line(b"a1 NOOP", vec![]);
        let parsed = parse_command(&raw).unwrap();
        assert_eq!(parsed.tag, "a1");
        assert_eq!(parsed.command, "NOOP");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn command_name_is_uppercased() {
        let raw = line(b"a1 noop", vec![]);
        let parsed = parse_command(&raw).unwrap();
        assert_eq!(parsed.command, "NOOP");
    }

    #[test]
    fn parses_quoted_string_with_escapes() {
        let raw = line(br#"a1 LOGIN "al\"ice" "pwd""#, vec![]);
        let parsed = parse_command(&raw).unwrap();
        assert_eq!(parsed.args[0].as_str_value().unwrap(), "al\"ice");
        assert_eq!(parsed.args[1].as_str_value().unwrap(), "pwd");
    }

    #[test]
    fn parses_parenthesized_list() {
        let raw = line(b"a1 STORE 1 +FLAGS (\\Deleted \\Seen)", vec![]);
        let parsed = parse_command(&raw).unwrap();
        let list = parsed.args[2].as_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].as_str_value().unwrap(), "\\Deleted");
    }

    #[test]
    fn literal_token_is_opaque_to_grammar() {
        let bytes = b"a1 LOGIN alice pwd with spaces";
        let raw = line(bytes, vec![(15, 15)]);
        let parsed = parse_command(&raw).unwrap();
        assert_eq!(parsed.args[0].as_str_value().unwrap(), "alice");
        match &parsed.args[1] {
            Token::Literal(b) => assert_eq!(b, b"pwd with spaces"),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn malformed_list_is_bad() {
        let raw = line(b"a1 STORE 1 +FLAGS (\\Deleted", vec![]);
        assert!(parse_command(&raw).is_err());
    }

    #[test]
    fn malformed_list_still_carries_the_parsed_tag() {
        let raw = line(b"a1 STORE 1 +FLAGS (\\Deleted", vec![]);
        let err = parse_command(&raw).unwrap_err();
        assert_eq!(err.tag.as_deref(), Some("a1"));
    }

    #[test]
    fn unparseable_tag_has_no_tag_to_carry() {
        let raw = line(b"", vec![]);
        let err = parse_command(&raw).unwrap_err();
        assert_eq!(err.tag, None);
    }

    #[test]
    fn recognizes_nil() {
        let raw = line(b"a1 APPEND INBOX NIL", vec![]);
        let parsed = parse_command(&raw).unwrap();
        assert!(parsed.args[1].is_nil());
    }
}
