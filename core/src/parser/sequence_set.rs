/*
 * sequence_set.rs
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

//! Sequence-set grammar (RFC 3501 §9, `sequence-set`): `N`, `N:M`, `*`,
//! `N:*`, comma-separated. Parsing happens independently of the value of
//! `*`; [`SeqSet::resolve`] substitutes the mailbox's highest sequence
//! number or UID once the caller knows it.

use super::ParseError;
use crate::store::IdRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Number(u32),
    Star,
}

#[derive(Debug, Clone)]
pub struct SeqSet(Vec<(Endpoint, Endpoint)>);

impl SeqSet {
    pub fn parse(s: &str) -> Result<SeqSet, ParseError> {
        if s.is_empty() {
            return Err(ParseError::new("empty sequence set"));
        }
        let mut ranges = Vec::new();
        for part in s.split(',') {
            if part.is_empty() {
                return Err(ParseError::new("empty sequence set member"));
            }
            match part.split_once(':') {
                Some((a, b)) => {
                    let start = parse_endpoint(a)?;
                    let end = parse_endpoint(b)?;
                    ranges.push((start, end));
                }
                None => {
                    let n = parse_endpoint(part)?;
                    ranges.push((n, n));
                }
            }
        }
        Ok(SeqSet(ranges))
    }

    /// Resolves every `*` to `max` and normalizes `start > end` (RFC 3501
    /// allows either order in a range). `max` is the mailbox's current
    /// highest sequence number or UID; for an empty mailbox pass 0, which
    /// collapses every range to a no-op.
    pub fn resolve(&self, max: u32) -> Vec<IdRange> {
        self.0
            .iter()
            .filter_map(|&(a, b)| {
                let a = resolve_endpoint(a, max);
                let b = resolve_endpoint(b, max);
                if max == 0 {
                    return None;
                }
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Some(IdRange { start, end })
            })
            .collect()
    }
}

fn parse_endpoint(s: &str) -> Result<Endpoint, ParseError> {
    if s == "*" {
        return Ok(Endpoint::Star);
    }
    let n: u32 = s.parse().map_err(|_| ParseError::new("invalid sequence number"))?;
    if n == 0 {
        return Err(ParseError::new("sequence numbers are 1-based"));
    }
    Ok(Endpoint::Number(n))
}

fn resolve_endpoint(e: Endpoint, max: u32) -> u32 {
    match e {
        Endpoint::Number(n) => n,
        Endpoint::Star => max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_number() {
        let set = SeqSet::parse("5").unwrap();
        assert_eq!(set.resolve(10).len(), 1);
        let r = set.resolve(10)[0];
        assert_eq!((r.start, r.end), (5, 5));
    }

    #[test]
    fn parses_range() {
        let set = SeqSet::parse("2:4").unwrap();
        let r = set.resolve(10)[0];
        assert_eq!((r.start, r.end), (2, 4));
    }

    #[test]
    fn parses_star_as_max() {
        let set = SeqSet::parse("5:*").unwrap();
        let r = set.resolve(10)[0];
        assert_eq!((r.start, r.end), (5, 10));
    }

    #[test]
    fn parses_comma_separated_list() {
        let set = SeqSet::parse("1,3:5,9").unwrap();
        let ranges = set.resolve(10);
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (1, 1));
        assert_eq!((ranges[1].start, ranges[1].end), (3, 5));
        assert_eq!((ranges[2].start, ranges[2].end), (9, 9));
    }

    #[test]
    fn normalizes_reversed_range() {
        let set = SeqSet::parse("5:2").unwrap();
        let r = set.resolve(10)[0];
        assert_eq!((r.start, r.end), (2, 5));
    }

    #[test]
    fn empty_mailbox_resolves_to_nothing() {
        let set = SeqSet::parse("1:*").unwrap();
        assert!(set.resolve(0).is_empty());
    }

    #[test]
    fn rejects_zero() {
        assert!(SeqSet::parse("0").is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SeqSet::parse("1,,3").is_err());
        assert!(SeqSet::parse("abc").is_err());
    }
}
