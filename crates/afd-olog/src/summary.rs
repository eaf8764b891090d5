//! Selection summary.
//!
//! Sums are kept as integers (bytes, nanoseconds) and the time bounds in a
//! multiset, so adding and removing entries in any order lands on exactly
//! the value a fresh computation would produce.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::reader::IndexEntry;

const BYTE_UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];

/// Rate units with their length in seconds, smallest first.
const RATE_UNITS: [(&str, f64); 5] = [
    ("s", 1.0),
    ("min", 60.0),
    ("h", 3_600.0),
    ("d", 86_400.0),
    ("y", 31_536_000.0),
];

/// Running aggregate over a set of index entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryAccumulator {
    count: u64,
    total_bytes: u64,
    total_nanos: u64,
    /// send_time -> multiplicity
    times: BTreeMap<u64, u32>,
}

impl SummaryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a IndexEntry>) -> Self {
        let mut acc = Self::new();
        for entry in entries {
            acc.add(entry);
        }
        acc
    }

    pub fn add(&mut self, entry: &IndexEntry) {
        self.count += 1;
        self.total_bytes = self.total_bytes.saturating_add(entry.file_size);
        self.total_nanos = self.total_nanos.saturating_add(entry.transfer_nanos);
        *self.times.entry(entry.send_time).or_insert(0) += 1;
    }

    /// Undo a previous `add` of the same entry.
    pub fn remove(&mut self, entry: &IndexEntry) {
        let Some(n) = self.times.get_mut(&entry.send_time) else {
            return;
        };
        *n -= 1;
        if *n == 0 {
            self.times.remove(&entry.send_time);
        }
        self.count -= 1;
        self.total_bytes = self.total_bytes.saturating_sub(entry.file_size);
        self.total_nanos = self.total_nanos.saturating_sub(entry.transfer_nanos);
    }

    pub fn summary(&self) -> Summary {
        Summary {
            count: self.count,
            total_bytes: self.total_bytes,
            total_nanos: self.total_nanos,
            first_time: self.times.keys().next().copied(),
            last_time: self.times.keys().next_back().copied(),
        }
    }
}

/// Aggregate of a selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub total_bytes: u64,
    pub total_nanos: u64,
    pub first_time: Option<u64>,
    pub last_time: Option<u64>,
}

impl Summary {
    pub fn total_seconds(&self) -> f64 {
        self.total_nanos as f64 / 1e9
    }

    /// `last_time - first_time`, zero for an empty selection.
    pub fn span_seconds(&self) -> u64 {
        match (self.first_time, self.last_time) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// Files per unit, in the smallest unit whose value reaches one.
    pub fn file_rate(&self) -> (f64, &'static str) {
        let span = self.span_seconds();
        if span == 0 {
            return (0.0, RATE_UNITS[0].0);
        }
        let per_second = self.count as f64 / span as f64;
        for (unit, secs) in RATE_UNITS {
            let value = per_second * secs;
            if value >= 1.0 {
                return (value, unit);
            }
        }
        let (unit, secs) = RATE_UNITS[RATE_UNITS.len() - 1];
        (per_second * secs, unit)
    }

    pub fn byte_rate(&self) -> String {
        if self.total_nanos == 0 {
            return "0 Bytes/s".to_string();
        }
        let rate = self.total_bytes as f64 / self.total_seconds();
        format!("{}/s", scale_bytes(rate))
    }

    /// Span as `ddd HH:MM:SS`.
    pub fn format_span(&self) -> String {
        let span = self.span_seconds();
        format!(
            "{:03} {:02}:{:02}:{:02}",
            span / 86_400,
            (span % 86_400) / 3_600,
            (span % 3_600) / 60,
            span % 60
        )
    }

    /// Transfer time in the largest unit that keeps a two-digit remainder.
    pub fn format_elapsed(&self) -> String {
        let secs = self.total_seconds();
        if secs < 60.0 {
            return format!("{:.2}s", secs);
        }
        let whole = secs as u64;
        if whole < 3_600 {
            format!("{}:{:02}m", whole / 60, whole % 60)
        } else if whole < 86_400 {
            format!("{}:{:02}h", whole / 3_600, (whole % 3_600) / 60)
        } else {
            format!("{}:{:02}d", whole / 86_400, (whole % 86_400) / 3_600)
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rate, unit) = self.file_rate();
        write!(
            f,
            "{} {:>7} {} {:>8.2} files/{:<3} {:>12} {:>14} {:>9}",
            self.format_span(),
            self.count,
            if self.count == 1 { "file " } else { "files" },
            rate,
            unit,
            scale_bytes(self.total_bytes as f64),
            self.byte_rate(),
            self.format_elapsed(),
        )
    }
}

/// `N Bytes` below 1 KB, otherwise two decimals in 1024-based units.
fn scale_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        return format!("{:.0} Bytes", bytes);
    }
    let mut value = bytes / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, BYTE_UNITS[unit])
}
