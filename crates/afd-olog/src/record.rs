//! Output-log line grammar.
//!
//! ```text
//! <time:hex> <host         > <type>|local|remote|size:hex|secs|[retries:hex|]job:hex|unique[|mail_id][|archive_dir]\n
//! ```
//!
//! The time field is `log_date_length` wide and the host field
//! `max_hostname_length` wide. The width of the type field (the "type
//! offset", 1, 3 or 5) is recovered from where the first separator sits.
//! A retries field only exists when the type offset is larger than one.

use std::fmt::Write as _;

use afd_config::LogConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MAX_FILENAME_LENGTH, MAX_LINE_LENGTH, MAX_PATH_LENGTH};

pub const SEPARATOR_CHAR: u8 = b'|';

/// Replaces the tail of a field that does not fit its bound.
pub const OVERSIZED_SENTINEL: &str = "... ";

/// Fixed-width part of the line grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    pub log_date_length: usize,
    pub max_hostname_length: usize,
    /// Multi-byte type fields are always five bytes wide
    pub wide_type_field: bool,
}

impl Default for LineLayout {
    fn default() -> Self {
        Self::from(&LogConfig::default())
    }
}

impl From<&LogConfig> for LineLayout {
    fn from(cfg: &LogConfig) -> Self {
        Self {
            log_date_length: cfg.log_date_length,
            max_hostname_length: cfg.max_hostname_length,
            wide_type_field: cfg.wide_type_field,
        }
    }
}

impl LineLayout {
    /// Index of the space that ends the host-name field.
    pub fn host_name_end(&self) -> usize {
        self.log_date_length + 1 + self.max_hostname_length
    }

    /// Shortest line that still carries a type field and its separator.
    fn min_line_length(&self) -> usize {
        self.host_name_end() + 3
    }

    fn type_offset(&self, line: &[u8]) -> usize {
        let hne = self.host_name_end();
        if line.get(hne + 2) == Some(&SEPARATOR_CHAR) {
            1
        } else if self.wide_type_field || line.get(hne + 4) != Some(&SEPARATOR_CHAR) {
            5
        } else {
            3
        }
    }

    /// Type-field width the formatter writes for `type_offset`.
    fn written_type_offset(&self, type_offset: u8) -> usize {
        match type_offset {
            0 | 1 => 1,
            _ if self.wide_type_field => 5,
            3 => 3,
            _ => 5,
        }
    }
}

/// Why a line could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line of {len} bytes is shorter than the fixed prefix of {needed}")]
    Short { len: usize, needed: usize },

    #[error("line exceeds {max} bytes")]
    TooLong { max: usize },

    #[error("type field is not followed by a separator")]
    BadTypeField,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is not a valid number")]
    BadNumber(&'static str),
}

/// One parsed output-log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub send_time: u64,
    pub host_name: String,
    /// Width of the type field: 1, 3 or 5
    pub type_offset: u8,
    pub type_tag: u32,
    pub local_name: String,
    /// Empty when the file kept its local name
    pub remote_name: String,
    pub file_size: u64,
    pub transfer_seconds: f64,
    pub retries: Option<u32>,
    pub job_id: u32,
    pub unique_string: String,
    pub mail_id: Option<String>,
    pub archive_dir: Option<String>,
    /// A field was cut to its bound; the record cannot be resent
    #[serde(default)]
    pub oversized: bool,
}

impl LogRecord {
    /// Parse one line, with or without its trailing newline.
    pub fn parse(layout: &LineLayout, line: &[u8]) -> Result<Self, LineError> {
        parse_line(layout, line).map(|(record, _)| record)
    }

    pub fn archived(&self) -> bool {
        self.archive_dir.is_some()
    }

    pub fn resendable(&self) -> bool {
        self.archived() && !self.oversized
    }

    /// Render the record as the daemon writes it, newline included.
    pub fn format(&self, layout: &LineLayout) -> String {
        let type_width = layout.written_type_offset(self.type_offset);
        let mut line = String::with_capacity(128);
        let _ = write!(
            line,
            "{:0dw$x} {:<hw$.hw$} {:0tw$x}|{}|{}|{:x}|{}|",
            self.send_time,
            self.host_name,
            self.type_tag,
            self.local_name,
            self.remote_name,
            self.file_size,
            seconds_field(self.transfer_seconds),
            dw = layout.log_date_length,
            hw = layout.max_hostname_length,
            tw = type_width,
        );
        if type_width > 1 {
            let _ = write!(line, "{:x}|", self.retries.unwrap_or(0));
        }
        let _ = write!(line, "{:x}|{}", self.job_id, self.unique_string);
        if self.mail_id.is_some() || self.archive_dir.is_some() {
            line.push('|');
            line.push_str(self.mail_id.as_deref().unwrap_or(""));
        }
        if let Some(dir) = &self.archive_dir {
            line.push('|');
            line.push_str(dir);
        }
        line.push('\n');
        line
    }

    /// One row of the operator's result list.
    pub fn display_line(&self) -> String {
        let date = chrono::DateTime::from_timestamp(self.send_time as i64, 0)
            .map(|utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%m.%d. %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| format!("{:x}", self.send_time));
        let remote = if self.remote_name.is_empty() {
            "-"
        } else {
            self.remote_name.as_str()
        };
        format!(
            "{} {:<8} {:<32} {:<24} {:>12} {:>8.2} {}",
            date,
            self.host_name,
            self.local_name,
            remote,
            self.file_size,
            self.transfer_seconds,
            if self.archived() { "Y" } else { "N" },
        )
    }
}

/// Parse a line and report the byte offset of its job-id field.
pub(crate) fn parse_line(layout: &LineLayout, line: &[u8]) -> Result<(LogRecord, usize), LineError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    if line.len() > MAX_LINE_LENGTH {
        return Err(LineError::TooLong {
            max: MAX_LINE_LENGTH,
        });
    }
    if line.len() < layout.min_line_length() {
        return Err(LineError::Short {
            len: line.len(),
            needed: layout.min_line_length(),
        });
    }

    let hne = layout.host_name_end();
    let send_time = hex_u64(&line[..layout.log_date_length]).ok_or(LineError::BadNumber("send_time"))?;
    let host_name = lossy(trim_end(&line[layout.log_date_length + 1..hne]));

    let type_offset = layout.type_offset(line);
    let type_end = hne + 1 + type_offset;
    if line.get(type_end) != Some(&SEPARATOR_CHAR) {
        return Err(LineError::BadTypeField);
    }
    let type_tag = hex_u64(&line[hne + 1..type_end])
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(LineError::BadNumber("type"))?;

    let mut oversized = false;
    let mut fields = Fields::new(line, type_end + 1);
    let local_name = bounded(fields.required("local_name")?, MAX_FILENAME_LENGTH, &mut oversized);
    let remote_name = bounded(fields.required("remote_name")?, MAX_FILENAME_LENGTH, &mut oversized);
    let file_size = hex_u64(fields.required("file_size")?).ok_or(LineError::BadNumber("file_size"))?;
    let transfer_seconds = seconds(fields.required("transfer_seconds")?)
        .ok_or(LineError::BadNumber("transfer_seconds"))?;
    let retries = if type_offset > 1 {
        let raw = fields.required("retries")?;
        Some(hex_u32(raw).ok_or(LineError::BadNumber("retries"))?)
    } else {
        None
    };

    let job_offset = fields.position();
    let job_id = hex_u32(fields.required("job_id")?).ok_or(LineError::BadNumber("job_id"))?;

    let unique = fields.required("unique_string")?;
    let unique = unique
        .iter()
        .position(|&b| b == b' ')
        .map_or(unique, |end| &unique[..end]);
    let unique_string = bounded(unique, MAX_FILENAME_LENGTH, &mut oversized);

    let (mail_id, archive_dir) = match fields.remainder() {
        None => (None, None),
        Some(rest) => match rest.iter().position(|&b| b == SEPARATOR_CHAR) {
            None => (non_empty(rest, MAX_FILENAME_LENGTH, &mut oversized), None),
            Some(p) => (
                non_empty(&rest[..p], MAX_FILENAME_LENGTH, &mut oversized),
                non_empty(&rest[p + 1..], MAX_PATH_LENGTH, &mut oversized),
            ),
        },
    };

    let record = LogRecord {
        send_time,
        host_name,
        type_offset: type_offset as u8,
        type_tag,
        local_name,
        remote_name,
        file_size,
        transfer_seconds,
        retries,
        job_id,
        unique_string,
        mail_id,
        archive_dir,
        oversized,
    };
    Ok((record, job_offset))
}

/// Separator-delimited fields of a line, starting at a byte position.
struct Fields<'a> {
    line: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Fields<'a> {
    fn new(line: &'a [u8], pos: usize) -> Self {
        Self {
            line,
            pos: pos.min(line.len()),
            done: false,
        }
    }

    /// Offset of the field `next` would return.
    fn position(&self) -> usize {
        self.pos
    }

    fn required(&mut self, name: &'static str) -> Result<&'a [u8], LineError> {
        self.next().ok_or(LineError::MissingField(name))
    }

    /// Everything after the current position, if any field remains.
    fn remainder(&mut self) -> Option<&'a [u8]> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(&self.line[self.pos..])
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.done {
            return None;
        }
        let rest = &self.line[self.pos..];
        match rest.iter().position(|&b| b == SEPARATOR_CHAR) {
            Some(p) => {
                self.pos += p + 1;
                Some(&rest[..p])
            }
            None => {
                self.done = true;
                self.pos = self.line.len();
                Some(rest)
            }
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn trim_end(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
    &bytes[..end]
}

fn as_trimmed_str(bytes: &[u8]) -> Option<&str> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    (!s.is_empty()).then_some(s)
}

fn hex_u64(bytes: &[u8]) -> Option<u64> {
    u64::from_str_radix(as_trimmed_str(bytes)?, 16).ok()
}

fn hex_u32(bytes: &[u8]) -> Option<u32> {
    u32::from_str_radix(as_trimmed_str(bytes)?, 16).ok()
}

/// Hundredths as the daemon writes them, or the shortest exact form when
/// two decimals would lose precision.
fn seconds_field(v: f64) -> String {
    let fixed = format!("{:.2}", v);
    if fixed.parse::<f64>().ok() == Some(v) {
        fixed
    } else {
        v.to_string()
    }
}

fn seconds(bytes: &[u8]) -> Option<f64> {
    let v: f64 = as_trimmed_str(bytes)?.parse().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

/// Cut a field that reaches `max` bytes and mark the record oversized.
fn bounded(bytes: &[u8], max: usize, oversized: &mut bool) -> String {
    if bytes.len() < max {
        return lossy(bytes);
    }
    *oversized = true;
    let keep = max - 1 - OVERSIZED_SENTINEL.len();
    let mut cut = lossy(&bytes[..keep]);
    cut.push_str(OVERSIZED_SENTINEL);
    cut
}

fn non_empty(bytes: &[u8], max: usize, oversized: &mut bool) -> Option<String> {
    (!bytes.is_empty()).then(|| bounded(bytes, max, oversized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LineLayout {
        LineLayout::default()
    }

    fn sample(type_offset: u8) -> LogRecord {
        LogRecord {
            send_time: 0x6523_1a00,
            host_name: "ducktown".to_string(),
            type_offset,
            type_tag: 1,
            local_name: "report.csv".to_string(),
            remote_name: String::new(),
            file_size: 1000,
            transfer_seconds: 2.0,
            retries: (type_offset > 1).then_some(0),
            job_id: 0x2a,
            unique_string: "6523_1a00_0_1f".to_string(),
            mail_id: None,
            archive_dir: Some("ducktown/0/2a".to_string()),
            oversized: false,
        }
    }

    #[test]
    fn test_format_bit_exact() {
        let line = sample(1).format(&layout());
        assert_eq!(
            line,
            "0065231a00 ducktown 1|report.csv||3e8|2.00|2a|6523_1a00_0_1f||ducktown/0/2a\n"
        );
    }

    #[test]
    fn test_roundtrip_each_type_offset() {
        for offset in [1u8, 3, 5] {
            let mut record = sample(offset);
            record.retries = (offset > 1).then_some(3);
            record.remote_name = "report.csv.tmp".to_string();
            for transfer_seconds in [2.0, 0.125, 1.005, 3.14159] {
                record.transfer_seconds = transfer_seconds;
                let line = record.format(&layout());
                assert_eq!(LogRecord::parse(&layout(), line.as_bytes()).unwrap(), record, "{line}");
            }
        }
    }

    #[test]
    fn test_transfer_time_keeps_hundredths_when_exact() {
        let mut record = sample(1);
        record.transfer_seconds = 0.5;
        assert!(record.format(&layout()).contains("|0.50|"));
        record.transfer_seconds = 0.125;
        assert!(record.format(&layout()).contains("|0.125|"));
    }

    #[test]
    fn test_roundtrip_trailing_field_shapes() {
        let mut record = sample(1);
        record.archive_dir = None;
        record.mail_id = Some("4711".to_string());
        let line = record.format(&layout());
        assert!(line.ends_with("|4711\n"));
        assert_eq!(LogRecord::parse(&layout(), line.as_bytes()).unwrap(), record);

        record.mail_id = None;
        let line = record.format(&layout());
        assert!(line.ends_with("|6523_1a00_0_1f\n"));
        let parsed = LogRecord::parse(&layout(), line.as_bytes()).unwrap();
        assert!(!parsed.archived());
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_short_host_is_padded() {
        let mut record = sample(1);
        record.host_name = "dt".to_string();
        let line = record.format(&layout());
        assert!(line.starts_with("0065231a00 dt       1|"));
        assert_eq!(LogRecord::parse(&layout(), line.as_bytes()).unwrap().host_name, "dt");
    }

    #[test]
    fn test_legacy_type_offset_detection() {
        let three = b"0065231a00 ducktown 001|a||a|0.50|2|2a|u";
        let r = LogRecord::parse(&layout(), three).unwrap();
        assert_eq!(r.type_offset, 3);
        assert_eq!(r.retries, Some(2));

        let five = b"0065231a00 ducktown 00001|a||a|0.50|2|2a|u";
        assert_eq!(LogRecord::parse(&layout(), five).unwrap().type_offset, 5);
    }

    #[test]
    fn test_wide_type_field_forces_five() {
        let wide = LineLayout {
            wide_type_field: true,
            ..layout()
        };
        let three = b"0065231a00 ducktown 001|a||a|0.50|2|2a|u";
        assert!(LogRecord::parse(&wide, three).is_err());

        let one = b"0065231a00 ducktown 1|a||a|0.50|2a|u";
        assert_eq!(LogRecord::parse(&wide, one).unwrap().type_offset, 1);
    }

    #[test]
    fn test_missing_newline_tolerated() {
        let line = sample(1).format(&layout());
        let trimmed = line.trim_end_matches('\n');
        assert_eq!(LogRecord::parse(&layout(), trimmed.as_bytes()).unwrap(), sample(1));
    }

    #[test]
    fn test_short_line_rejected() {
        let err = LogRecord::parse(&layout(), b"0065231a00 duck").unwrap_err();
        assert_eq!(err, LineError::Short { len: 15, needed: 22 });
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let bad_size = b"0065231a00 ducktown 1|a||zz|0.50|2a|u";
        assert_eq!(
            LogRecord::parse(&layout(), bad_size).unwrap_err(),
            LineError::BadNumber("file_size")
        );
        let no_job = b"0065231a00 ducktown 1|a||10|0.50";
        assert_eq!(
            LogRecord::parse(&layout(), no_job).unwrap_err(),
            LineError::MissingField("job_id")
        );
    }

    #[test]
    fn test_oversized_name_truncated() {
        let mut record = sample(1);
        record.local_name = "x".repeat(300);
        let line = record.format(&layout());
        let parsed = LogRecord::parse(&layout(), line.as_bytes()).unwrap();
        assert!(parsed.oversized);
        assert!(!parsed.resendable());
        assert!(parsed.local_name.ends_with(OVERSIZED_SENTINEL));
        assert_eq!(parsed.local_name.len(), MAX_FILENAME_LENGTH - 1);
    }

    #[test]
    fn test_unique_string_stops_at_space() {
        let line = b"0065231a00 ducktown 1|a||a|0.50|2a|abc def|m|dir";
        let r = LogRecord::parse(&layout(), line).unwrap();
        assert_eq!(r.unique_string, "abc");
        assert_eq!(r.mail_id.as_deref(), Some("m"));
        assert_eq!(r.archive_dir.as_deref(), Some("dir"));
    }

    #[test]
    fn test_job_offset_points_at_job_field() {
        let line = sample(3).format(&layout());
        let (_, offset) = parse_line(&layout(), line.as_bytes()).unwrap();
        assert!(line[offset..].starts_with("2a|"));
    }
}
