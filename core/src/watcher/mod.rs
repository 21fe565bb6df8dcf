//! Log file tailing, history preload, and character discovery.
//!
//! A watcher task owns the file handle exclusively and streams entries
//! over a bounded channel. History preload takes the mmap + rayon path
//! instead, since a multi-hour log can run to hundreds of megabytes.

mod directory;

pub use directory::{DirectoryEvent, DirectoryWatcher};

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{NaiveDateTime, TimeDelta};
use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::prelude::*;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::parser::{self, LogEntry};

/// Gap length that counts as a logout rather than quiet play.
pub const LOGOUT_GAP_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// What the tail task sends downstream.
#[derive(Debug)]
pub enum WatchEvent {
    Entry(LogEntry),
    /// The file shrank under us; tailing restarted from the top.
    Rotated,
    /// Terminal read failure; the task has stopped.
    Failed(WatchError),
}

/// Owns the spawned tail task; dropping or aborting stops it.
pub struct WatcherHandle {
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a tail task starting at `start_byte`.
pub fn spawn_tail(
    path: PathBuf,
    start_byte: u64,
    tx: mpsc::Sender<WatchEvent>,
) -> WatcherHandle {
    let task = tokio::spawn(async move {
        if let Err(e) = tail_log_file(&path, start_byte, &tx).await {
            tx.send(WatchEvent::Failed(e)).await.ok();
        }
    });
    WatcherHandle { task }
}

async fn tail_log_file(
    path: &Path,
    start_byte: u64,
    tx: &mpsc::Sender<WatchEvent>,
) -> Result<(), WatchError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut offset = start_byte;

    reader.seek(SeekFrom::Start(start_byte)).await?;

    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                // At EOF check for truncation before waiting.
                let len = tokio::fs::metadata(path).await?.len();
                if len < offset {
                    info!(path = %path.display(), "log file shrank, reopening from start");
                    let file = File::open(path).await?;
                    reader = BufReader::new(file);
                    offset = 0;
                    if tx.send(WatchEvent::Rotated).await.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                sleep(Duration::from_millis(100)).await;
            }
            Ok(n) => {
                offset += n as u64;
                // A malformed line never halts the stream.
                if let Some(entry) = decode_line(&buf)
                    && tx.send(WatchEvent::Entry(entry)).await.is_err()
                {
                    return Ok(());
                }
                buf.clear();
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Decode one raw latin-1 line and parse it.
fn decode_line(bytes: &[u8]) -> Option<LogEntry> {
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    parser::parse_line(&text)
}

/// Bulk-parse a log file, keeping entries at or after `cutoff`.
///
/// Returns the entries and the byte offset tailing should resume from.
pub fn read_history(path: &Path, cutoff: NaiveDateTime) -> Result<(Vec<LogEntry>, u64), WatchError> {
    let file = std::fs::File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let bytes = mmap.as_ref();
    let end_pos = bytes.len() as u64;

    let mut line_ranges: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', bytes) {
        if end > start {
            line_ranges.push((start, end));
        }
        start = end + 1;
    }
    if start < bytes.len() {
        line_ranges.push((start, bytes.len()));
    }

    let mut entries: Vec<LogEntry> = line_ranges
        .par_iter()
        .filter_map(|&(start, end)| decode_line(&bytes[start..end]))
        .filter(|entry| entry.timestamp >= cutoff)
        .collect();
    // Parallel collect preserves order, but guard against clock steps in
    // the log itself.
    entries.sort_by_key(|e| e.timestamp);

    info!(
        path = %path.display(),
        entries = entries.len(),
        "history preloaded"
    );
    Ok((entries, end_pos))
}

/// A span during which effect clocks were paused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimePeriod {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Gaps longer than [`LOGOUT_GAP_SECS`] between consecutive entries.
pub fn find_logout_periods(entries: &[LogEntry]) -> Vec<TimePeriod> {
    entries
        .windows(2)
        .filter_map(|pair| {
            let gap = pair[1].timestamp - pair[0].timestamp;
            (gap.num_seconds() > LOGOUT_GAP_SECS).then_some(TimePeriod {
                start: pair[0].timestamp,
                end: pair[1].timestamp,
            })
        })
        .collect()
}

/// Loading-screen spans: from each loading line to the next entry after it.
pub fn find_zone_periods(entries: &[LogEntry]) -> Vec<TimePeriod> {
    entries
        .windows(2)
        .filter_map(|pair| {
            parser::is_loading(&pair[0]).then_some(TimePeriod {
                start: pair[0].timestamp,
                end: pair[1].timestamp,
            })
        })
        .collect()
}

/// One discovered character log file.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterLog {
    pub character: String,
    pub server: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Parse `eqlog_<name>_<server>.txt` into (name, server).
pub fn parse_log_filename(filename: &str) -> Option<(String, String)> {
    let rest = filename.strip_prefix("eqlog_")?.strip_suffix(".txt")?;
    let (name, server) = rest.split_once('_')?;
    if name.is_empty() || server.is_empty() {
        return None;
    }
    Some((name.to_string(), server.to_string()))
}

/// Scan a directory for character logs, most recently written first.
/// `server` restricts the scan to one server's logs.
pub fn discover_characters(dir: &Path, server: Option<&str>) -> Result<Vec<CharacterLog>, WatchError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let filename = entry.file_name();
        let Some(filename) = filename.to_str() else {
            continue;
        };
        let Some((character, file_server)) = parse_log_filename(filename) else {
            continue;
        };
        if let Some(server) = server
            && file_server != server
        {
            continue;
        }
        let metadata = entry.metadata()?;
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(file = filename, error = %e, "skipping log without mtime");
                continue;
            }
        };
        found.push(CharacterLog {
            character,
            server: file_server,
            path: entry.path(),
            modified,
        });
    }
    found.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(found)
}
