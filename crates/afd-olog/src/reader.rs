//! Position-addressed index over the rolling output logs.
//!
//! `OUTPUT_LOG.0` is the newest file. The index lists entries oldest
//! first, so selection position 0 is the oldest matching line. Files are
//! scanned in parallel; every entry keeps the numbers the summary needs,
//! and `fetch` re-reads the full line on demand.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use afd_config::{log_olog_debug, log_olog_warn, LogConfig, WorkDir};
use rayon::prelude::*;
use serde::Serialize;

use crate::filter::SearchFilter;
use crate::record::{parse_line, LineLayout, LogRecord};
use crate::{OlogError, Result, MAX_LINE_LENGTH};

/// Where one selectable line lives, plus its summary numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub file_no: usize,
    /// Byte offset of the line start
    pub line_offset: u64,
    /// Byte offset of the job-id field inside the line
    pub offset: u32,
    pub archived: bool,
    pub send_time: u64,
    pub file_size: u64,
    /// Transfer duration in whole nanoseconds
    pub transfer_nanos: u64,
    pub job_id: u32,
}

impl IndexEntry {
    fn new(file_no: usize, line_offset: u64, offset: usize, record: &LogRecord) -> Self {
        Self {
            file_no,
            line_offset,
            offset: offset as u32,
            archived: record.archived(),
            send_time: record.send_time,
            file_size: record.file_size,
            transfer_nanos: seconds_to_nanos(record.transfer_seconds),
            job_id: record.job_id,
        }
    }
}

pub(crate) fn seconds_to_nanos(seconds: f64) -> u64 {
    (seconds * 1e9).round() as u64
}

struct LogFile {
    file_no: usize,
    path: PathBuf,
    file: File,
}

struct ScannedFile {
    log: LogFile,
    entries: Vec<IndexEntry>,
    parse_errors: usize,
}

/// Read-only index over all rolling log files
pub struct LogIndex {
    layout: LineLayout,
    files: Vec<LogFile>,
    entries: Vec<IndexEntry>,
    parse_errors: usize,
}

impl LogIndex {
    /// Index every line of every rolling log.
    pub fn open_logs(work: &WorkDir, cfg: &LogConfig) -> Result<Self> {
        Self::open_filtered(work, cfg, &SearchFilter::default())
    }

    /// Index the lines matching `filter`.
    pub fn open_filtered(work: &WorkDir, cfg: &LogConfig, filter: &SearchFilter) -> Result<Self> {
        let paths = (0..cfg.log_files)
            .map(|file_no| (file_no, work.output_log(&cfg.log_name, file_no)))
            .collect();
        Self::from_paths(LineLayout::from(cfg), paths, filter)
    }

    /// Index explicit `(file_no, path)` pairs. Missing files are skipped.
    pub fn from_paths(
        layout: LineLayout,
        paths: Vec<(usize, PathBuf)>,
        filter: &SearchFilter,
    ) -> Result<Self> {
        let scanned: Vec<Option<ScannedFile>> = paths
            .into_par_iter()
            .map(|(file_no, path)| scan_file(&layout, file_no, path, filter))
            .collect::<Result<_>>()?;

        let mut scanned: Vec<ScannedFile> = scanned.into_iter().flatten().collect();
        // Higher file numbers are older.
        scanned.sort_by(|a, b| b.log.file_no.cmp(&a.log.file_no));

        let mut index = Self {
            layout,
            files: Vec::with_capacity(scanned.len()),
            entries: Vec::new(),
            parse_errors: 0,
        };
        for file in scanned {
            index.entries.extend(file.entries);
            index.parse_errors += file.parse_errors;
            index.files.push(file.log);
        }
        log_olog_debug!(
            "Output log indexed",
            files = index.files.len(),
            entries = index.entries.len(),
            parse_errors = index.parse_errors,
        );
        Ok(index)
    }

    pub fn layout(&self) -> &LineLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, pos: usize) -> Option<&IndexEntry> {
        self.entries.get(pos)
    }

    /// Malformed lines skipped while indexing.
    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    /// Entry at `pos`, or `NotFound`.
    pub fn entry(&self, pos: usize) -> Result<&IndexEntry> {
        self.entries.get(pos).ok_or(OlogError::NotFound {
            pos,
            len: self.entries.len(),
        })
    }

    /// Re-read and parse the line behind selection position `pos`.
    pub fn fetch(&self, pos: usize) -> Result<LogRecord> {
        let entry = self.entry(pos)?;
        let log = self
            .files
            .iter()
            .find(|f| f.file_no == entry.file_no)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("output log {} no longer indexed", entry.file_no),
                )
            })?;

        let line = read_line_at(&log.file, entry.line_offset)?;
        parse_line(&self.layout, &line)
            .map(|(record, _)| record)
            .map_err(|source| OlogError::Parse {
                file_no: entry.file_no,
                line_offset: entry.line_offset,
                source,
            })
    }

    /// Positions of indexed entries that also satisfy `filter`.
    ///
    /// Lines that no longer parse are skipped with a warning.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<usize>> {
        let mut hits = Vec::new();
        for pos in 0..self.entries.len() {
            match self.fetch(pos) {
                Ok(record) if filter.matches(&record) => hits.push(pos),
                Ok(_) => {}
                Err(OlogError::Parse { file_no, line_offset, source }) => {
                    log_olog_warn!(
                        "Skipping malformed log line",
                        file_no = file_no,
                        line_offset = line_offset,
                        reason = source.to_string().as_str(),
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(hits)
    }

    /// Path of rolling file `file_no`, if it was indexed.
    pub fn path(&self, file_no: usize) -> Option<&std::path::Path> {
        self.files
            .iter()
            .find(|f| f.file_no == file_no)
            .map(|f| f.path.as_path())
    }
}

fn scan_file(
    layout: &LineLayout,
    file_no: usize,
    path: PathBuf,
    filter: &SearchFilter,
) -> Result<Option<ScannedFile>> {
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut entries = Vec::new();
    let mut parse_errors = 0;
    let mut start = 0usize;
    while start < data.len() {
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |p| start + p);
        let line = &data[start..end];
        if !line.is_empty() {
            match parse_line(layout, line) {
                Ok((record, offset)) => {
                    if filter.matches(&record) {
                        entries.push(IndexEntry::new(file_no, start as u64, offset, &record));
                    }
                }
                Err(e) => {
                    parse_errors += 1;
                    log_olog_warn!(
                        "Skipping malformed log line",
                        file_no = file_no,
                        line_offset = start as u64,
                        reason = e.to_string().as_str(),
                    );
                }
            }
        }
        start = end + 1;
    }

    Ok(Some(ScannedFile {
        log: LogFile { file_no, path, file },
        entries,
        parse_errors,
    }))
}

/// Read at most `MAX_LINE_LENGTH + 1` bytes from `offset`, cut at the
/// first newline.
fn read_line_at(file: &File, offset: u64) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_LINE_LENGTH + 1];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if buf[filled - n..filled].contains(&b'\n') {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    if let Some(nl) = buf.iter().position(|&b| b == b'\n') {
        buf.truncate(nl);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const LINE_A: &str = "0065231a00 ducktown 1|a.csv||64|1.00|2a|u1||ducktown/0/2a\n";
    const LINE_B: &str = "0065231a10 ducktown 1|b.csv||c8|0.50|2a|u2\n";

    #[test]
    fn test_index_orders_oldest_file_first() {
        let dir = tempdir().unwrap();
        let newest = dir.path().join("OUTPUT_LOG.0");
        let older = dir.path().join("OUTPUT_LOG.1");
        fs::write(&newest, LINE_B).unwrap();
        fs::write(&older, LINE_A).unwrap();

        let index = LogIndex::from_paths(
            LineLayout::default(),
            vec![(0, newest), (1, older), (2, dir.path().join("OUTPUT_LOG.2"))],
            &SearchFilter::default(),
        )
        .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0).unwrap().file_no, 1);
        assert!(index.get(0).unwrap().archived);
        assert!(!index.get(1).unwrap().archived);
        assert_eq!(index.fetch(1).unwrap().local_name, "b.csv");
    }

    #[test]
    fn test_malformed_lines_excluded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("OUTPUT_LOG.0");
        fs::write(&path, format!("{LINE_A}garbage\n\n{LINE_B}")).unwrap();

        let index =
            LogIndex::from_paths(LineLayout::default(), vec![(0, path)], &SearchFilter::default()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.parse_errors(), 1);
        let second = index.get(1).unwrap();
        assert_eq!(second.line_offset as usize, LINE_A.len() + "garbage\n\n".len());
    }

    #[test]
    fn test_fetch_beyond_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("OUTPUT_LOG.0");
        fs::write(&path, LINE_A.trim_end()).unwrap();

        let index =
            LogIndex::from_paths(LineLayout::default(), vec![(0, path)], &SearchFilter::default()).unwrap();
        assert_eq!(index.fetch(0).unwrap().file_size, 100);
        assert!(matches!(index.fetch(1), Err(OlogError::NotFound { pos: 1, len: 1 })));
    }

    #[test]
    fn test_entry_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("OUTPUT_LOG.0");
        fs::write(&path, LINE_A).unwrap();

        let index =
            LogIndex::from_paths(LineLayout::default(), vec![(0, path)], &SearchFilter::default()).unwrap();
        let entry = index.get(0).unwrap();
        assert!(LINE_A[entry.offset as usize..].starts_with("2a|"));
        assert_eq!(entry.transfer_nanos, 1_000_000_000);
        assert_eq!(entry.job_id, 0x2a);
    }

    #[test]
    fn test_search_refines_positions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("OUTPUT_LOG.0");
        fs::write(&path, format!("{LINE_A}{LINE_B}")).unwrap();

        let index =
            LogIndex::from_paths(LineLayout::default(), vec![(0, path)], &SearchFilter::default()).unwrap();
        let filter = SearchFilter {
            local_names: vec!["b*".to_string()],
            ..SearchFilter::default()
        };
        assert_eq!(index.search(&filter).unwrap(), vec![1]);
    }
}
