//! HTTP Range request parsing
//!
//! Handles the single-range `bytes=` forms of RFC 7233. Anything else is
//! treated as a request for the whole resource.

/// Byte range selected by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range header; serve everything.
    Full,
    /// Inclusive byte range within the resource.
    Partial {
        /// First byte offset
        start: u64,
        /// Last byte offset, inclusive
        end: u64,
    },
    /// The range lies outside the resource.
    Unsatisfiable,
}

impl ByteRange {
    /// Number of bytes the range covers in a resource of `total` bytes.
    pub fn len(&self, total: u64) -> u64 {
        match self {
            ByteRange::Full => total,
            ByteRange::Partial { start, end } => end - start + 1,
            ByteRange::Unsatisfiable => 0,
        }
    }
}

/// Parse a Range header value against a resource of `total` bytes.
///
/// # Examples
/// ```
/// use undertow_sim::range::{ByteRange, parse_range};
///
/// assert_eq!(
///     parse_range(Some("bytes=100-199"), 1000),
///     ByteRange::Partial { start: 100, end: 199 }
/// );
/// assert_eq!(parse_range(None, 1000), ByteRange::Full);
/// ```
pub fn parse_range(header: Option<&str>, total: u64) -> ByteRange {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };

    // Multi-range requests are answered with the full body
    if ranges.contains(',') {
        return ByteRange::Full;
    }

    let Some((start_str, end_str)) = ranges.split_once('-') else {
        return ByteRange::Full;
    };

    if total == 0 {
        return ByteRange::Unsatisfiable;
    }
    let last = total - 1;

    if start_str.is_empty() {
        return match end_str.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial {
                start: total.saturating_sub(suffix),
                end: last,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return ByteRange::Full;
    };

    let end = if end_str.is_empty() {
        last
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => end.min(last),
            Err(_) => return ByteRange::Full,
        }
    };

    if start > last || start > end {
        return ByteRange::Unsatisfiable;
    }

    ByteRange::Partial { start, end }
}
