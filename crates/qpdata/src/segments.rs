//! Splits a container buffer into version header, JSON metadata and object
//! stream.
//!
//! There is no length-prefixed framing; every boundary is found by content.
//! Locating never fails outright: segments that cannot be found are recorded
//! as [`FormatError`] issues and left absent.

use std::ops::Range;

use qpdata_object_stream::constants::STREAM_PREAMBLE;
use regex::bytes::Regex;
use tracing::{debug, warn};

use crate::error::FormatError;

/// Byte patterns that delimit container segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Literal that starts the version header.
    pub version_prefix: Vec<u8>,
    /// Byte that terminates the version text.
    pub version_sentinel: u8,
    /// The version header must start within this many leading bytes.
    pub header_window: usize,
    /// Longest version text accepted.
    pub max_version_len: usize,
    /// Leading key that starts the JSON block.
    pub json_key: Vec<u8>,
    /// Bytes that follow the JSON block's closing brace.
    pub json_end_marker: Vec<u8>,
    pub stream_magic: Vec<u8>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            version_prefix: b"Data file version".to_vec(),
            version_sentinel: 0x74,
            header_window: 256,
            max_version_len: 64,
            json_key: b"{\"dataVersion\"".to_vec(),
            json_end_marker: b"sr".to_vec(),
            stream_magic: STREAM_PREAMBLE.to_vec(),
        }
    }
}

/// Location of the object stream inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSegment {
    pub range: Range<usize>,
    /// `false` when the stream magic was missing and the segment starts at
    /// the first object after the JSON block.
    pub has_preamble: bool,
}

impl StreamSegment {
    pub fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.range.clone()]
    }
}

/// The three segments of one container file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSegments {
    pub version_text: Option<String>,
    pub json_text: Option<String>,
    pub json_range: Option<Range<usize>>,
    pub stream: Option<StreamSegment>,
    /// Why absent segments are absent.
    pub issues: Vec<FormatError>,
}

impl RawSegments {
    pub fn require_stream(&self) -> Result<&StreamSegment, FormatError> {
        self.stream.as_ref().ok_or(FormatError::MissingStreamMarker)
    }

    /// Parsed JSON metadata, when present.
    pub fn metadata(&self) -> Option<serde_json::Value> {
        self.json_text
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SegmentLocator {
    config: LocatorConfig,
}

impl SegmentLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn locate(&self, buf: &[u8]) -> RawSegments {
        let mut segments = RawSegments::default();

        match self.version_text(buf) {
            Some(v) => segments.version_text = Some(v),
            None => segments.issues.push(FormatError::MissingVersionHeader),
        }

        match self.json_block(buf) {
            Ok(range) => {
                segments.json_text = Some(String::from_utf8_lossy(&buf[range.clone()]).into_owned());
                segments.json_range = Some(range);
            }
            Err(issue) => segments.issues.push(issue),
        }

        segments.stream = self.stream(buf, segments.json_range.as_ref());
        if segments.stream.is_none() {
            segments.issues.push(FormatError::MissingStreamMarker);
        }

        debug!(
            len = buf.len(),
            version = ?segments.version_text,
            json = ?segments.json_range,
            stream = ?segments.stream,
            issues = segments.issues.len(),
            "located container segments"
        );
        segments
    }

    fn version_text(&self, buf: &[u8]) -> Option<String> {
        let window = &buf[..buf.len().min(self.config.header_window)];
        let start = find(window, &self.config.version_prefix, 0)? + self.config.version_prefix.len();
        let limit = buf.len().min(start + self.config.max_version_len);
        let end = buf[start..limit]
            .iter()
            .position(|&b| b == self.config.version_sentinel || !is_printable(b))
            .map_or(limit, |i| start + i);
        let text = String::from_utf8_lossy(&buf[start..end]);
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == ':');
        (!text.is_empty()).then(|| text.to_owned())
    }

    fn json_block(&self, buf: &[u8]) -> Result<Range<usize>, FormatError> {
        let start = find(buf, &self.config.json_key, 0).ok_or(FormatError::MissingJsonBlock)?;

        let mut closing = vec![b'}'];
        closing.extend_from_slice(&self.config.json_end_marker);
        let heuristic = find(buf, &closing, start).map(|i| start..i + 1);
        let mut first_error = None;
        if let Some(range) = heuristic {
            match serde_json::from_slice::<serde_json::Value>(&buf[range.clone()]) {
                Ok(_) => return Ok(range),
                Err(err) => first_error = Some(err.to_string()),
            }
        }

        if let Some(end) = balanced_end(buf, start) {
            let range = start..end;
            match serde_json::from_slice::<serde_json::Value>(&buf[range.clone()]) {
                Ok(_) => {
                    debug!(start, end, "JSON block found by brace matching");
                    return Ok(range);
                }
                Err(err) => {
                    first_error.get_or_insert_with(|| err.to_string());
                }
            }
        }

        let reason = first_error.unwrap_or_else(|| "unterminated JSON object".to_owned());
        warn!(offset = start, %reason, "skipping unreadable JSON metadata");
        Err(FormatError::InvalidJson {
            offset: start,
            reason,
        })
    }

    fn stream(&self, buf: &[u8], json: Option<&Range<usize>>) -> Option<StreamSegment> {
        if let Some(start) = find(buf, &self.config.stream_magic, 0) {
            return Some(StreamSegment {
                range: start..buf.len(),
                has_preamble: true,
            });
        }
        let end = json?.end;
        buf[end..]
            .starts_with(&self.config.json_end_marker)
            .then(|| StreamSegment {
                range: end..buf.len(),
                has_preamble: false,
            })
    }
}

/// Runs of at least `min_len` printable ASCII characters, up to `limit` of them.
pub fn printable_strings(buf: &[u8], min_len: usize, limit: usize) -> Vec<String> {
    let pattern = format!("[\\x20-\\x7e]{{{},}}", min_len.max(1));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            warn!(%err, min_len, "printable string pattern rejected");
            return Vec::new();
        }
    };
    re.find_iter(buf)
        .take(limit)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .collect()
}

fn is_printable(b: u8) -> bool {
    (0x20..0x7f).contains(&b)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

/// End (exclusive) of the JSON object starting at `start`, by brace depth,
/// skipping braces inside strings.
fn balanced_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_end_skips_braces_in_strings() {
        let buf = br#"xx{"a":"}sr{","b":[1,{"c":2}]}tail"#;
        let end = balanced_end(buf, 2).unwrap();
        assert_eq!(&buf[2..end], br#"{"a":"}sr{","b":[1,{"c":2}]}"#);
        assert_eq!(balanced_end(br#"{"open":"#, 0), None);
    }

    #[test]
    fn find_respects_start() {
        assert_eq!(find(b"abcabc", b"bc", 0), Some(1));
        assert_eq!(find(b"abcabc", b"bc", 2), Some(4));
        assert_eq!(find(b"abc", b"", 0), None);
        assert_eq!(find(b"abc", b"c", 9), None);
    }

    #[test]
    fn version_stops_at_sentinel() {
        let locator = SegmentLocator::new();
        let mut buf = b"\xac\xed\x00\x05\x77\x15\x00\x13Data file version 3".to_vec();
        buf.push(0x74);
        assert_eq!(locator.version_text(&buf).as_deref(), Some("3"));
        assert_eq!(locator.version_text(b"Data file version: 0.5.0\x00"), Some("0.5.0".into()));
        assert_eq!(locator.version_text(b"Data file version\x74"), None);
    }
}
