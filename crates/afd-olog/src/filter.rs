//! Search criteria over parsed log records.

use serde::{Deserialize, Serialize};

use crate::record::LogRecord;

/// Outcome of matching one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMatch {
    Match,
    NoMatch,
    /// A `!pattern` matched: the text is explicitly excluded
    Excluded,
}

/// AFD wildcard match: `*` any run, `?` any single byte, a leading `!`
/// negates the pattern.
pub fn pmatch(pattern: &str, text: &str) -> PatternMatch {
    match pattern.strip_prefix('!') {
        Some(negated) if wildcard(negated.as_bytes(), text.as_bytes()) => PatternMatch::Excluded,
        Some(_) => PatternMatch::NoMatch,
        None if wildcard(pattern.as_bytes(), text.as_bytes()) => PatternMatch::Match,
        None => PatternMatch::NoMatch,
    }
}

fn wildcard(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Last `*` seen and the text position it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}

/// Match `text` against a pattern list; the first pattern that matches
/// or excludes decides.
///
/// An empty list matches everything, and so does a list made only of
/// negations none of which fired.
pub fn match_any(patterns: &[String], text: &str) -> bool {
    let mut has_positive = false;
    for pattern in patterns {
        match pmatch(pattern, text) {
            PatternMatch::Match => return true,
            PatternMatch::Excluded => return false,
            PatternMatch::NoMatch => has_positive |= !pattern.starts_with('!'),
        }
    }
    !has_positive
}

/// Criteria a record must meet to enter the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    /// Inclusive lower bound on `send_time`
    pub start_time: Option<u64>,
    /// Inclusive upper bound on `send_time`
    pub end_time: Option<u64>,
    pub hosts: Vec<String>,
    pub local_names: Vec<String>,
    /// Matched against the local name when the file kept it
    pub remote_names: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub job_ids: Vec<u32>,
    pub archived_only: bool,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if self.start_time.is_some_and(|t| record.send_time < t)
            || self.end_time.is_some_and(|t| record.send_time > t)
            || self.min_size.is_some_and(|s| record.file_size < s)
            || self.max_size.is_some_and(|s| record.file_size > s)
        {
            return false;
        }
        if self.archived_only && !record.archived() {
            return false;
        }
        if !self.job_ids.is_empty() && !self.job_ids.contains(&record.job_id) {
            return false;
        }
        let remote = if record.remote_name.is_empty() {
            &record.local_name
        } else {
            &record.remote_name
        };
        match_any(&self.hosts, &record.host_name)
            && match_any(&self.local_names, &record.local_name)
            && match_any(&self.remote_names, remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: &str, local: &str, size: u64, time: u64) -> LogRecord {
        LogRecord {
            send_time: time,
            host_name: host.to_string(),
            type_offset: 1,
            type_tag: 0,
            local_name: local.to_string(),
            remote_name: String::new(),
            file_size: size,
            transfer_seconds: 0.5,
            retries: None,
            job_id: 7,
            unique_string: "u".to_string(),
            mail_id: None,
            archive_dir: None,
            oversized: false,
        }
    }

    #[test]
    fn test_pmatch_wildcards() {
        assert_eq!(pmatch("*.csv", "report.csv"), PatternMatch::Match);
        assert_eq!(pmatch("rep?rt.*", "report.csv"), PatternMatch::Match);
        assert_eq!(pmatch("*a*b*c", "xxaybzzc"), PatternMatch::Match);
        assert_eq!(pmatch("*.csv", "report.csv.tmp"), PatternMatch::NoMatch);
        assert_eq!(pmatch("!*.tmp", "report.tmp"), PatternMatch::Excluded);
        assert_eq!(pmatch("!*.tmp", "report.csv"), PatternMatch::NoMatch);
        assert_eq!(pmatch("*", ""), PatternMatch::Match);
        assert_eq!(pmatch("?", ""), PatternMatch::NoMatch);
    }

    #[test]
    fn test_pattern_list_order() {
        let list = vec!["!secret*".to_string(), "*".to_string()];
        assert!(match_any(&list, "report"));
        assert!(!match_any(&list, "secret.txt"));

        let only_negations = vec!["!*.tmp".to_string()];
        assert!(match_any(&only_negations, "a.csv"));
        assert!(!match_any(&only_negations, "a.tmp"));

        let positive = vec!["*.csv".to_string()];
        assert!(!match_any(&positive, "a.txt"));
        assert!(match_any(&[], "anything"));
    }

    #[test]
    fn test_filter_bounds() {
        let filter = SearchFilter {
            start_time: Some(100),
            end_time: Some(200),
            min_size: Some(10),
            hosts: vec!["duck*".to_string()],
            ..SearchFilter::default()
        };
        assert!(filter.matches(&record("ducktown", "a", 10, 100)));
        assert!(filter.matches(&record("ducktown", "a", 10, 200)));
        assert!(!filter.matches(&record("ducktown", "a", 9, 150)));
        assert!(!filter.matches(&record("ducktown", "a", 10, 201)));
        assert!(!filter.matches(&record("mouseton", "a", 10, 150)));
    }

    #[test]
    fn test_filter_remote_falls_back_to_local() {
        let filter = SearchFilter {
            remote_names: vec!["*.csv".to_string()],
            ..SearchFilter::default()
        };
        assert!(filter.matches(&record("h", "a.csv", 1, 1)));
        let mut renamed = record("h", "a.csv", 1, 1);
        renamed.remote_name = "a.tmp".to_string();
        assert!(!filter.matches(&renamed));
    }

    #[test]
    fn test_archived_only_and_job_ids() {
        let filter = SearchFilter {
            archived_only: true,
            job_ids: vec![7],
            ..SearchFilter::default()
        };
        let mut r = record("h", "a", 1, 1);
        assert!(!filter.matches(&r));
        r.archive_dir = Some("h/0/7".to_string());
        assert!(filter.matches(&r));
        r.job_id = 8;
        assert!(!filter.matches(&r));
        assert!(SearchFilter::default().is_empty());
    }
}
