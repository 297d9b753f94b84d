//! HTTP byte-range parsing.

use crate::error::{Error, Result};

/// A resolved byte range within an object of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Number of bytes, always > 0.
    pub length: u64,
}

impl ByteRange {
    /// Last byte offset (inclusive).
    pub fn end(&self) -> u64 {
        self.start + self.length - 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), total)
    }
}

/// Parse a `Range` header value against an object of `size` bytes.
///
/// An empty header yields no ranges. Supported forms are
/// `start-end`, `start-` and `-suffix`, optionally comma separated.
/// Ranges that start past the end are skipped; if every range was skipped
/// the request is unsatisfiable. If the ranges add up to more than the
/// object itself the header is ignored and an empty list is returned.
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>> {
    let header = header.trim();
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let spec = header
        .strip_prefix("bytes=")
        .ok_or_else(|| Error::InvalidRange(format!("unsupported unit: {header}")))?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let (start, end) = part
            .split_once('-')
            .ok_or_else(|| Error::InvalidRange(format!("missing '-': {part}")))?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // Suffix form: the last `end` bytes.
            let suffix = parse_offset(end, part)?;
            if suffix == 0 || size == 0 {
                no_overlap = true;
                continue;
            }
            let suffix = suffix.min(size);
            ranges.push(ByteRange {
                start: size - suffix,
                length: suffix,
            });
            continue;
        }

        let first = parse_offset(start, part)?;
        if first >= size {
            no_overlap = true;
            continue;
        }

        let length = if end.is_empty() {
            size - first
        } else {
            let last = parse_offset(end, part)?;
            if first > last {
                return Err(Error::InvalidRange(format!("start after end: {part}")));
            }
            last.min(size - 1) - first + 1
        };

        ranges.push(ByteRange {
            start: first,
            length,
        });
    }

    if no_overlap && ranges.is_empty() {
        return Err(Error::RangeNotSatisfiable { size });
    }

    let total: u64 = ranges.iter().map(|r| r.length).sum();
    if total > size {
        return Ok(Vec::new());
    }

    Ok(ranges)
}

fn parse_offset(value: &str, part: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidRange(format!("bad offset in {part}")));
    }
    value
        .parse()
        .map_err(|_| Error::InvalidRange(format!("offset overflow in {part}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(header: &str, size: u64) -> ByteRange {
        let ranges = parse_range(header, size).unwrap();
        assert_eq!(ranges.len(), 1, "expected one range for {header}");
        ranges[0]
    }

    #[test]
    fn closed_range() {
        let r = single("bytes=0-99", 1000);
        assert_eq!((r.start, r.end(), r.length), (0, 99, 100));
        assert_eq!(r.content_range(1000), "bytes 0-99/1000");
    }

    #[test]
    fn open_ended_range() {
        let r = single("bytes=900-", 1000);
        assert_eq!((r.start, r.end(), r.length), (900, 999, 100));
    }

    #[test]
    fn suffix_range() {
        let r = single("bytes=-100", 1000);
        assert_eq!((r.start, r.end(), r.length), (900, 999, 100));
    }

    #[test]
    fn suffix_longer_than_object_is_clamped() {
        let r = single("bytes=-5000", 1000);
        assert_eq!((r.start, r.length), (0, 1000));
    }

    #[test]
    fn end_past_size_is_clamped() {
        let r = single("bytes=990-5000", 1000);
        assert_eq!((r.start, r.end(), r.length), (990, 999, 10));
    }

    #[test]
    fn start_past_size_is_unsatisfiable() {
        match parse_range("bytes=2000-3000", 1000) {
            Err(Error::RangeNotSatisfiable { size }) => assert_eq!(size, 1000),
            other => panic!("expected unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn any_range_on_empty_object_is_unsatisfiable() {
        assert!(matches!(
            parse_range("bytes=0-", 0),
            Err(Error::RangeNotSatisfiable { .. })
        ));
    }

    #[test]
    fn empty_header_means_full_read() {
        assert!(parse_range("", 1000).unwrap().is_empty());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["items=0-1", "bytes=abc-", "bytes=5-1", "bytes=10", "bytes=--5"] {
            assert!(
                matches!(parse_range(header, 1000), Err(Error::InvalidRange(_))),
                "{header} should be invalid"
            );
        }
    }

    #[test]
    fn multiple_ranges_parse() {
        let ranges = parse_range("bytes=0-9, 20-29", 1000).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1], ByteRange { start: 20, length: 10 });
    }

    #[test]
    fn oversized_range_set_is_ignored() {
        assert!(parse_range("bytes=0-999,0-999", 1000).unwrap().is_empty());
    }

    #[test]
    fn skipped_ranges_do_not_fail_when_one_fits() {
        let ranges = parse_range("bytes=5000-,0-9", 1000).unwrap();
        assert_eq!(ranges, vec![ByteRange { start: 0, length: 10 }]);
    }
}
