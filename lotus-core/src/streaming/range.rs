//! HTTP Range header parsing and validation
//!
//! Implements the single-range subset of RFC 7233 byte ranges used by video
//! players: `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. Parsing is
//! purely syntactic; bounds are applied by [`resolve_range`] once the total
//! length of the byte source is known.

/// Range unit accepted by the parser.
const BYTES_UNIT: &str = "bytes";

/// Syntactic form of a single byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRangeSpec {
    /// `bytes=start-end`, end inclusive
    FromTo { start: u64, end: u64 },
    /// `bytes=start-`
    From { start: u64 },
    /// `bytes=-length`, the last `length` bytes
    Suffix { length: u64 },
}

/// Parsed `Range` header for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    raw_header: String,
    spec: ByteRangeSpec,
}

impl RangeRequest {
    /// Header value exactly as received.
    pub fn raw_header(&self) -> &str {
        &self.raw_header
    }

    /// Syntactic form of the range.
    pub fn spec(&self) -> ByteRangeSpec {
        self.spec
    }

    /// Explicit first byte, unset for suffix ranges.
    pub fn start(&self) -> Option<u64> {
        match self.spec {
            ByteRangeSpec::FromTo { start, .. } | ByteRangeSpec::From { start } => Some(start),
            ByteRangeSpec::Suffix { .. } => None,
        }
    }

    /// Explicit last byte (inclusive), unset for open-ended and suffix ranges.
    pub fn end(&self) -> Option<u64> {
        match self.spec {
            ByteRangeSpec::FromTo { end, .. } => Some(end),
            _ => None,
        }
    }

    /// Whether this is a "last N bytes" request.
    pub fn is_suffix_range(&self) -> bool {
        matches!(self.spec, ByteRangeSpec::Suffix { .. })
    }

    /// Whether this is an open-ended `bytes=start-` request.
    pub fn is_open_ended(&self) -> bool {
        matches!(self.spec, ByteRangeSpec::From { .. })
    }
}

/// Reasons a `Range` header is rejected by the parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeParseError {
    #[error("Malformed range header {header:?}: unsupported unit")]
    UnsupportedUnit { header: String },

    #[error("Malformed range header {header:?}: multiple ranges are not supported")]
    MultipleRanges { header: String },

    #[error("Malformed range header {header:?}: {reason}")]
    InvalidSpec { header: String, reason: &'static str },
}

/// A syntactically valid range that does not overlap the byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Range not satisfiable for content of {total_length} bytes")]
pub struct RangeNotSatisfiable {
    pub total_length: u64,
}

/// Parse a `Range` header value.
///
/// Returns `Ok(None)` when no header was sent. The unit is matched
/// case-insensitively and whitespace around the range spec is tolerated.
///
/// # Errors
/// - `RangeParseError::UnsupportedUnit` - Unit other than `bytes`
/// - `RangeParseError::MultipleRanges` - More than one range in the set
/// - `RangeParseError::InvalidSpec` - Missing, signed or non-numeric positions
///
/// # Examples
/// ```
/// use lotus_core::streaming::range::{ByteRangeSpec, parse_range_header};
///
/// let request = parse_range_header(Some("bytes=100-199")).unwrap().unwrap();
/// assert_eq!(request.spec(), ByteRangeSpec::FromTo { start: 100, end: 199 });
/// assert!(parse_range_header(None).unwrap().is_none());
/// ```
pub fn parse_range_header(header: Option<&str>) -> Result<Option<RangeRequest>, RangeParseError> {
    let Some(raw) = header else {
        return Ok(None);
    };

    let invalid = |reason| RangeParseError::InvalidSpec {
        header: raw.to_string(),
        reason,
    };

    let Some((unit, set)) = raw.trim().split_once('=') else {
        return Err(RangeParseError::UnsupportedUnit {
            header: raw.to_string(),
        });
    };
    if !unit.trim().eq_ignore_ascii_case(BYTES_UNIT) {
        return Err(RangeParseError::UnsupportedUnit {
            header: raw.to_string(),
        });
    }
    if set.contains(',') {
        return Err(RangeParseError::MultipleRanges {
            header: raw.to_string(),
        });
    }

    let Some((first, last)) = set.trim().split_once('-') else {
        return Err(invalid("missing '-' separator"));
    };
    let (first, last) = (first.trim(), last.trim());

    let spec = match (first.is_empty(), last.is_empty()) {
        (true, true) => return Err(invalid("empty range")),
        (true, false) => ByteRangeSpec::Suffix {
            length: parse_position(last).ok_or_else(|| invalid("invalid suffix length"))?,
        },
        (false, true) => ByteRangeSpec::From {
            start: parse_position(first).ok_or_else(|| invalid("invalid start position"))?,
        },
        (false, false) => ByteRangeSpec::FromTo {
            start: parse_position(first).ok_or_else(|| invalid("invalid start position"))?,
            end: parse_position(last).ok_or_else(|| invalid("invalid end position"))?,
        },
    };

    Ok(Some(RangeRequest {
        raw_header: raw.to_string(),
        spec,
    }))
}

/// Parse an unsigned decimal byte position. Signs are not digits and are rejected.
fn parse_position(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u64>().ok()
}

/// A validated, non-empty, in-bounds byte window.
///
/// Only [`resolve_range`] and [`ResolvedRange::capped`] construct values, so
/// `start <= end < total_length` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    start: u64,
    end: u64,
    total_length: u64,
}

impl ResolvedRange {
    fn new(start: u64, end: u64, total_length: u64) -> Result<Self, RangeNotSatisfiable> {
        if total_length == 0 || start > end || start >= total_length {
            return Err(RangeNotSatisfiable { total_length });
        }
        Ok(Self {
            start,
            end: end.min(total_length - 1),
            total_length,
        })
    }

    /// First byte of the window.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte of the window, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Length of the byte source the window was validated against.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of bytes in the window.
    pub fn chunk_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether the window covers every byte of the source.
    pub fn covers_whole(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total_length
    }

    /// Shortens the window to at most `max_width` bytes, keeping its start.
    pub fn capped(self, max_width: u64) -> Self {
        if max_width == 0 || self.chunk_length() <= max_width {
            return self;
        }
        Self {
            end: self.start + max_width - 1,
            ..self
        }
    }
}

/// Validator output: what the response will carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeWindow {
    /// No range requested. `range` is `None` only for an empty source.
    Full {
        total_length: u64,
        range: Option<ResolvedRange>,
    },
    /// A range was requested and resolved; served as 206.
    Partial(ResolvedRange),
}

impl ServeWindow {
    /// Window of bytes to transfer, if any.
    pub fn range(&self) -> Option<ResolvedRange> {
        match self {
            ServeWindow::Full { range, .. } => *range,
            ServeWindow::Partial(range) => Some(*range),
        }
    }

    /// Length of the byte source.
    pub fn total_length(&self) -> u64 {
        match self {
            ServeWindow::Full { total_length, .. } => *total_length,
            ServeWindow::Partial(range) => range.total_length(),
        }
    }

    /// Value of the `Content-Length` header.
    pub fn content_length(&self) -> u64 {
        self.range().map_or(0, |range| range.chunk_length())
    }

    /// Whether the response is partial content.
    pub fn is_partial(&self) -> bool {
        matches!(self, ServeWindow::Partial(_))
    }
}

/// Validate a parsed request against the length of a byte source.
///
/// # Errors
/// - `RangeNotSatisfiable` - The range starts at or beyond the end of the
///   source, is inverted, asks for zero suffix bytes, or targets an empty source
///
/// # Examples
/// ```
/// use lotus_core::streaming::range::{parse_range_header, resolve_range};
///
/// let request = parse_range_header(Some("bytes=0-999999")).unwrap();
/// let window = resolve_range(request.as_ref(), 100).unwrap();
/// let range = window.range().unwrap();
/// assert_eq!((range.start(), range.end()), (0, 99));
/// ```
pub fn resolve_range(
    request: Option<&RangeRequest>,
    total_length: u64,
) -> Result<ServeWindow, RangeNotSatisfiable> {
    let Some(request) = request else {
        let range = ResolvedRange::new(0, total_length.saturating_sub(1), total_length).ok();
        return Ok(ServeWindow::Full {
            total_length,
            range,
        });
    };

    let last_byte = total_length.saturating_sub(1);
    let range = match request.spec() {
        ByteRangeSpec::FromTo { start, end } => {
            ResolvedRange::new(start, end.min(last_byte), total_length)?
        }
        ByteRangeSpec::From { start } => ResolvedRange::new(start, last_byte, total_length)?,
        ByteRangeSpec::Suffix { length } => {
            if length == 0 {
                return Err(RangeNotSatisfiable { total_length });
            }
            ResolvedRange::new(total_length.saturating_sub(length), last_byte, total_length)?
        }
    };

    Ok(ServeWindow::Partial(range))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn parse(header: &str) -> Result<Option<RangeRequest>, RangeParseError> {
        parse_range_header(Some(header))
    }

    fn resolve(header: &str, total: u64) -> Result<ServeWindow, RangeNotSatisfiable> {
        let request = parse(header).unwrap();
        resolve_range(request.as_ref(), total)
    }

    #[test]
    fn test_parse_closed_range() {
        let request = parse("bytes=100-199").unwrap().unwrap();
        assert_eq!(request.start(), Some(100));
        assert_eq!(request.end(), Some(199));
        assert!(!request.is_suffix_range());
        assert_eq!(request.raw_header(), "bytes=100-199");
    }

    #[test]
    fn test_parse_open_end() {
        let request = parse("bytes=500-").unwrap().unwrap();
        assert_eq!(request.spec(), ByteRangeSpec::From { start: 500 });
        assert!(request.is_open_ended());
        assert_eq!(request.end(), None);
    }

    #[test]
    fn test_parse_suffix() {
        let request = parse("bytes=-500").unwrap().unwrap();
        assert_eq!(request.spec(), ByteRangeSpec::Suffix { length: 500 });
        assert!(request.is_suffix_range());
        assert_eq!(request.start(), None);
    }

    #[test]
    fn test_parse_tolerates_case_and_whitespace() {
        let request = parse(" Bytes= 10 - 20 ").unwrap().unwrap();
        assert_eq!(request.spec(), ByteRangeSpec::FromTo { start: 10, end: 20 });
    }

    #[test]
    fn test_parse_absent_header() {
        assert_eq!(parse_range_header(None), Ok(None));
    }

    #[test]
    fn test_parse_rejects_multi_range() {
        assert!(matches!(
            parse("bytes=0-10,20-30"),
            Err(RangeParseError::MultipleRanges { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_other_units() {
        assert!(matches!(
            parse("items=0-10"),
            Err(RangeParseError::UnsupportedUnit { .. })
        ));
        assert!(matches!(
            parse("invalid"),
            Err(RangeParseError::UnsupportedUnit { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_positions() {
        for header in [
            "bytes=",
            "bytes=-",
            "bytes=abc-10",
            "bytes=10-xyz",
            "bytes=+5-10",
            "bytes=-5-10",
            "bytes=5",
            "bytes=1.5-2",
            "bytes=99999999999999999999999-",
        ] {
            assert!(
                matches!(parse(header), Err(RangeParseError::InvalidSpec { .. })),
                "expected {header:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_without_range_is_full() {
        let window = resolve_range(None, 1000).unwrap();
        assert!(!window.is_partial());
        assert_eq!(window.content_length(), 1000);
        let range = window.range().unwrap();
        assert_eq!((range.start(), range.end()), (0, 999));
    }

    #[test]
    fn test_resolve_empty_source() {
        let window = resolve_range(None, 0).unwrap();
        assert_eq!(
            window,
            ServeWindow::Full {
                total_length: 0,
                range: None
            }
        );
        assert_eq!(window.content_length(), 0);

        for header in ["bytes=0-0", "bytes=0-", "bytes=-1"] {
            assert_eq!(
                resolve(header, 0),
                Err(RangeNotSatisfiable { total_length: 0 })
            );
        }
    }

    #[test]
    fn test_resolve_closed_range() {
        let range = resolve("bytes=200-299", 1000).unwrap().range().unwrap();
        assert_eq!((range.start(), range.end(), range.chunk_length()), (200, 299, 100));
    }

    #[test]
    fn test_resolve_open_range() {
        let range = resolve("bytes=900-", 1000).unwrap().range().unwrap();
        assert_eq!((range.start(), range.end(), range.chunk_length()), (900, 999, 100));
    }

    #[test]
    fn test_resolve_clamps_end() {
        let range = resolve("bytes=0-999999", 100).unwrap().range().unwrap();
        assert_eq!((range.start(), range.end()), (0, 99));
    }

    #[test]
    fn test_resolve_start_beyond_end_of_file() {
        assert_eq!(
            resolve("bytes=1000-1010", 1000),
            Err(RangeNotSatisfiable { total_length: 1000 })
        );
        assert!(resolve("bytes=1000-", 1000).is_err());
    }

    #[test]
    fn test_resolve_inverted_range() {
        assert!(resolve("bytes=50-10", 1000).is_err());
    }

    #[test]
    fn test_resolve_suffix() {
        let range = resolve("bytes=-100", 1000).unwrap().range().unwrap();
        assert_eq!((range.start(), range.end()), (900, 999));

        let whole = resolve("bytes=-5000", 1000).unwrap();
        assert!(whole.is_partial());
        assert!(whole.range().unwrap().covers_whole());

        assert!(resolve("bytes=-0", 1000).is_err());
    }

    #[test]
    fn test_full_range_request_stays_partial() {
        let window = resolve("bytes=0-", 10).unwrap();
        assert!(window.is_partial());
        assert!(window.range().unwrap().covers_whole());
    }

    #[test]
    fn test_capped_window() {
        let range = resolve("bytes=100-", 1000).unwrap().range().unwrap();
        let capped = range.capped(50);
        assert_eq!((capped.start(), capped.end(), capped.chunk_length()), (100, 149, 50));
        assert_eq!(range.capped(10_000), range);
    }

    proptest! {
        #[test]
        fn prop_in_bounds_range_is_exact(total in 1u64..1_000_000, a in any::<u64>(), b in any::<u64>()) {
            let start = a % total;
            let end = start + b % (total - start);
            let header = format!("bytes={start}-{end}");
            let range = resolve(&header, total).unwrap().range().unwrap();
            prop_assert_eq!(range.start(), start);
            prop_assert_eq!(range.end(), end);
            prop_assert_eq!(range.chunk_length(), end - start + 1);
        }

        #[test]
        fn prop_end_is_clamped(total in 1u64..1_000_000, extra in 0u64..1_000_000) {
            let header = format!("bytes=0-{}", total + extra);
            let range = resolve(&header, total).unwrap().range().unwrap();
            prop_assert_eq!(range.end(), total - 1);
        }

        #[test]
        fn prop_start_past_end_is_unsatisfiable(total in 0u64..1_000_000, past in 0u64..1_000_000) {
            let header = format!("bytes={}-", total + past);
            prop_assert_eq!(resolve(&header, total), Err(RangeNotSatisfiable { total_length: total }));
        }

        #[test]
        fn prop_suffix_window(total in 1u64..1_000_000, suffix in 1u64..2_000_000) {
            let header = format!("bytes=-{suffix}");
            let range = resolve(&header, total).unwrap().range().unwrap();
            prop_assert_eq!(range.start(), total.saturating_sub(suffix));
            prop_assert_eq!(range.end(), total - 1);
        }

        #[test]
        fn prop_no_range_is_whole_file(total in 0u64..u64::MAX) {
            let window = resolve_range(None, total).unwrap();
            prop_assert!(!window.is_partial());
            prop_assert_eq!(window.content_length(), total);
        }
    }
}
