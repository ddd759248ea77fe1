//! Incremental readers over append-only agent artifacts.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;
use tracing::trace;

/// Follows a file of JSON records (JSON Lines or concatenated objects),
/// returning only records appended since the previous read.
#[derive(Debug)]
pub struct JsonTail {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
    last_growth: Option<Instant>,
}

impl JsonTail {
    /// Create a tail positioned at the start of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
            last_growth: None,
        }
    }

    /// The followed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read records appended since the last call.
    ///
    /// A file that shrank is treated as replaced and re-read from the start.
    /// A record still being written stays buffered until it is complete.
    pub async fn read_new(&mut self, now: Instant) -> std::io::Result<Vec<Value>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if len < self.offset {
            trace!(path = %self.path.display(), "Artifact truncated, rereading");
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        let read = file.read_to_end(&mut chunk).await?;
        self.offset += read as u64;
        if read > 0 {
            self.last_growth = Some(now);
        }
        self.pending.extend_from_slice(&chunk);

        Ok(drain_values(&mut self.pending))
    }

    /// Time since the file last grew, if it has been seen at all.
    pub fn quiet_for(&self, now: Instant) -> Option<Duration> {
        self.last_growth
            .map(|at| now.saturating_duration_since(at))
    }
}

/// Parse every complete JSON value at the front of `buf`, leaving a trailing
/// incomplete value in place. Malformed lines are skipped.
fn drain_values(buf: &mut Vec<u8>) -> Vec<Value> {
    let mut values = Vec::new();
    let mut consumed = 0;

    loop {
        let rest = &buf[consumed..];
        let mut stream = serde_json::Deserializer::from_slice(rest).into_iter::<Value>();
        match stream.next() {
            None => {
                consumed = buf.len();
                break;
            }
            Some(Ok(value)) => {
                consumed += stream.byte_offset();
                values.push(value);
            }
            Some(Err(e)) if e.is_eof() => break,
            Some(Err(_)) => match rest.iter().position(|b| *b == b'\n') {
                Some(newline) => consumed += newline + 1,
                None => break,
            },
        }
    }

    buf.drain(..consumed);
    values
}

/// The most recently modified `*.jsonl` file directly inside `dir`.
pub async fn newest_jsonl(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(at, _)| modified > *at) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Look up a string field by dotted path segments.
pub fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
}
