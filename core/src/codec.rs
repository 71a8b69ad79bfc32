/*
 * codec.rs
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

//! Wire framing: CRLF-terminated lines, IMAP literal `{N}`/`{N+}` continuation.
//! The codec never interprets content beyond lines and literals; it only frames.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Result;

/// A fully-assembled command line: literal bodies are spliced back in place
/// of their `{N}` marker, so the parser never has to think about framing.
/// `literals` records the byte range of each spliced-in literal so the
/// parser can treat that span as one opaque token even if it contains
/// bytes (spaces, parens, CR) that would otherwise be grammar-significant.
pub struct RawLine {
    pub bytes: Vec<u8>,
    pub literals: Vec<(usize, usize)>,
}

pub struct Codec<S> {
    reader: BufReader<S>,
}

/// One piece of an untagged response: either literal response text, or raw
/// bytes to be framed as an IMAP literal `{N}\r\n<bytes>` on the wire.
pub enum WireSegment<'a> {
    Text(String),
    Raw(&'a [u8]),
}

impl<S: AsyncRead + AsyncWrite + Unpin> Codec<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Read one full command line, resolving any literal continuations.
    /// Returns `Ok(None)` on clean EOF before any bytes were read.
    pub async fn read_command(&mut self) -> Result<Option<RawLine>> {
        let mut out = Vec::new();
        let mut literals = Vec::new();
        loop {
            let segment = match self.read_raw_line().await? {
                Some(s) => s,
                None => {
                    if out.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(RawLine { bytes: out, literals }));
                }
            };
            match trailing_literal_len(&segment) {
                Some((without_marker, len, needs_continuation)) => {
                    out.extend_from_slice(without_marker);
                    if needs_continuation {
                        self.write_continuation("Ready for literal data").await?;
                    }
                    let mut literal = vec![0u8; len];
                    if len > 0 {
                        self.reader.read_exact(&mut literal).await?;
                    }
                    let start = out.len();
                    out.extend_from_slice(&literal);
                    literals.push((start, len));
                }
                None => {
                    out.extend_from_slice(&segment);
                    return Ok(Some(RawLine { bytes: out, literals }));
                }
            }
        }
    }

    /// Read one CRLF- or LF-terminated line verbatim, with no literal-marker
    /// resolution. Used for SASL continuation data, which is its own line of
    /// base64 rather than an IMAP command.
    pub async fn read_line_raw(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_raw_line().await
    }

    /// Read one CRLF- or LF-terminated line, stripping the terminator.
    /// Returns `None` on EOF with nothing read.
    async fn read_raw_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = self.reader.read(&mut byte).await?;
            if n == 0 {
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line));
            }
            if byte[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }
            line.push(byte[0]);
        }
    }

    pub async fn write_tagged(&mut self, tag: &str, status: &str, text: &str) -> Result<()> {
        self.write_line(&format!("{tag} {status} {text}")).await
    }

    pub async fn write_untagged(&mut self, text: &str) -> Result<()> {
        self.write_line(&format!("* {text}")).await
    }

    pub async fn write_continuation(&mut self, text: &str) -> Result<()> {
        self.write_line(&format!("+ {text}")).await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.reader.get_mut().write_all(bytes).await?;
        self.reader.get_mut().flush().await?;
        Ok(())
    }

    /// Write `* <prefix><segments…>\r\n` without ever round-tripping literal
    /// octets through a `String`. FETCH responses mix quoted/NIL text with
    /// IMAP literals carrying arbitrary message bytes; a lossy UTF-8
    /// conversion of those bytes would desync the announced `{N}` length from
    /// what actually goes out on the wire.
    pub async fn write_untagged_segments(&mut self, prefix: &str, segments: &[WireSegment<'_>]) -> Result<()> {
        self.reader.get_mut().write_all(b"* ").await?;
        self.reader.get_mut().write_all(prefix.as_bytes()).await?;
        for segment in segments {
            match segment {
                WireSegment::Text(s) => self.reader.get_mut().write_all(s.as_bytes()).await?,
                WireSegment::Raw(bytes) => {
                    self.reader.get_mut().write_all(format!("{{{}}}\r\n", bytes.len()).as_bytes()).await?;
                    self.reader.get_mut().write_all(bytes).await?;
                }
            }
        }
        self.reader.get_mut().write_all(b"\r\n").await?;
        self.reader.get_mut().flush().await?;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.reader.get_mut().write_all(line.as_bytes()).await?;
        self.reader.get_mut().write_all(b"\r\n").await?;
        self.reader.get_mut().flush().await?;
        Ok(())
    }
}

/// If `line` ends with a literal marker `{N}` or `{N+}`, returns the line
/// with the marker stripped, the literal length, and whether a `+ ` reply
/// is required (false for LITERAL+ non-synchronizing literals).
fn trailing_literal_len(line: &[u8]) -> Option<(&[u8], usize, bool)> {
    if line.last() != Some(&b'}') {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;
    let mut digits = &line[open + 1..line.len() - 1];
    let mut synchronizing = true;
    if digits.last() == Some(&b'+') {
        synchronizing = false;
        digits = &digits[..digits.len() - 1];
    }
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((&line[..open], len, synchronizing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::DuplexStream;

    fn pair() -> (DuplexStream, DuplexStream) {
        tokio::io::duplex(4096)
    }

    #[tokio::test]
    async fn reads_simple_line() {
        let (mut client, server) = pair();
        client.write_all(b"a1 NOOP\r\n").await.unwrap();
        let mut codec = Codec::new(server);
        let line = codec.read_command().await.unwrap().unwrap();
        assert_eq!(line.bytes, b"a1 NOOP");
    }

    #[tokio::test]
    async fn reads_synchronizing_literal() {
        let (mut client, server) = pair();
        client
            .write_all(b"a1 LOGIN {5}\r\nalice {3}\r\npwd\r\n")
            .await
            .unwrap();
        let mut codec = Codec::new(server);
        let line = codec.read_command().await.unwrap().unwrap();
        assert_eq!(line.bytes, b"a1 LOGIN alice pwd");
        assert_eq!(line.literals, vec![(9, 5), (15, 3)]);
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+ Ready for literal data\r\n");
    }

    #[tokio::test]
    async fn reads_non_synchronizing_literal_without_continuation() {
        let (mut client, server) = pair();
        client.write_all(b"a1 APPEND INBOX {4+}\r\nabcd\r\n").await.unwrap();
        let mut codec = Codec::new(server);
        let line = codec.read_command().await.unwrap().unwrap();
        assert_eq!(line.bytes, b"a1 APPEND INBOX abcd");
        assert_eq!(line.literals, vec![(16, 4)]);
    }

    #[test]
    fn zero_length_literal_parses() {
        let (rest, len, sync) = trailing_literal_len(b"a1 APPEND INBOX {0}").unwrap();
        assert_eq!(rest, b"a1 APPEND INBOX ");
        assert_eq!(len, 0);
        assert!(sync);
    }

    #[tokio::test]
    async fn write_untagged_segments_frames_raw_bytes_exactly() {
        let (mut client, server) = pair();
        let mut codec = Codec::new(server);
        let binary = vec![0xffu8, 0xfe, b'h', b'i'];
        codec
            .write_untagged_segments(
                "1 FETCH (UID 9 BODY[] ",
                &[WireSegment::Raw(&binary), WireSegment::Text(")".to_string())],
            )
            .await
            .unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];
        let n = client.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        let mut expected = b"* 1 FETCH (UID 9 BODY[] {4}\r\n".to_vec();
        expected.extend_from_slice(&binary);
        expected.extend_from_slice(b")\r\n");
        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn returns_none_on_clean_eof() {
        let empty = Cursor::new(Vec::<u8>::new());
        let mut codec = Codec::new(empty);
        assert!(codec.read_command().await.unwrap().is_none());
    }
}
