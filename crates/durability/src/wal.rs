//! Event Log / WAL: append-only segment files recording [`Event`]s.
//!
//! On-disk format: a sequence of `wal-{seq:010}-{epoch}.seg` files, each
//! beginning with an 8-byte header (4-byte magic, 4-byte version) followed
//! by length-prefixed, CRC-checked records. Segments rotate on size or time
//! threshold; writers fsync before acknowledging a durable append.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, info};

use nexus_core::{Error, Result};

use crate::event::Event;

const MAGIC: u32 = 0x4e58_574c; // "NXWL"
const FORMAT_VERSION: u32 = 1;
const DEFAULT_ROTATE_SIZE: u64 = 64 * 1024 * 1024;
const DEFAULT_ROTATE_INTERVAL_MS: i64 = 60 * 60 * 1000;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Appends [`Event`]s durably; a broadly useful boundary for anything that
/// needs to record events without caring whether they land in the native
/// segment log or the relational fallback.
pub trait EventSink: Send + Sync {
    /// Append one event. Returns only once the append is durable.
    fn append(&self, event: &Event) -> Result<()>;
}

struct OpenSegment {
    file: File,
    path: PathBuf,
    opened_at_ms: i64,
    bytes_written: u64,
}

/// Append-only segment-file WAL writer, with size/time-based rotation.
pub struct WalWriter {
    dir: PathBuf,
    current: Mutex<OpenSegment>,
    next_seq: AtomicU64,
    rotate_size: u64,
    rotate_interval_ms: i64,
}

impl WalWriter {
    /// Open (or create) the WAL directory and begin a fresh segment.
    ///
    /// Existing segment files are inspected only to determine the next
    /// sequence number; replay is a separate call ([`replay_dir`]).
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_rotation(dir, DEFAULT_ROTATE_SIZE, DEFAULT_ROTATE_INTERVAL_MS)
    }

    /// Like [`WalWriter::open`] with explicit rotation thresholds.
    pub fn with_rotation(dir: impl Into<PathBuf>, rotate_size: u64, rotate_interval_ms: i64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| Error::Internal(e.to_string()))?;
        let next_seq = existing_max_seq(&dir).map_err(|e| Error::Internal(e.to_string()))? + 1;
        let segment = open_new_segment(&dir, next_seq).map_err(|e| Error::Internal(e.to_string()))?;
        info!(dir = %dir.display(), seq = next_seq, "opened WAL for writing");
        Ok(WalWriter {
            dir,
            current: Mutex::new(segment),
            next_seq: AtomicU64::new(next_seq + 1),
            rotate_size,
            rotate_interval_ms,
        })
    }

    fn rotate_if_needed(&self, segment: &mut OpenSegment) -> io::Result<()> {
        let age = now_ms() - segment.opened_at_ms;
        if segment.bytes_written < self.rotate_size && age < self.rotate_interval_ms {
            return Ok(());
        }
        segment.file.sync_all()?;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        debug!(old_path = %segment.path.display(), bytes_written = segment.bytes_written, age_ms = age, "rotating WAL segment");
        *segment = open_new_segment(&self.dir, seq)?;
        Ok(())
    }

    /// The directory segments are written under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the segment currently accepting writes.
    pub fn current_segment_path(&self) -> PathBuf {
        self.current.lock().path.clone()
    }
}

impl EventSink for WalWriter {
    fn append(&self, event: &Event) -> Result<()> {
        let payload = rmp_serde::to_vec(event).map_err(|e| Error::Internal(e.to_string()))?;
        let crc = crc32fast::hash(&payload);

        let mut segment = self.current.lock();
        self.rotate_if_needed(&mut segment).map_err(|e| Error::Internal(e.to_string()))?;

        segment.file.write_u32::<LittleEndian>(payload.len() as u32).map_err(|e| Error::Internal(e.to_string()))?;
        segment.file.write_all(&payload).map_err(|e| Error::Internal(e.to_string()))?;
        segment.file.write_u32::<LittleEndian>(crc).map_err(|e| Error::Internal(e.to_string()))?;
        segment.file.sync_data().map_err(|e| Error::Internal(e.to_string()))?;
        segment.bytes_written += 8 + payload.len() as u64;
        Ok(())
    }
}

fn segment_file_name(seq: u64, epoch_ms: i64) -> String {
    format!("wal-{seq:010}-{epoch_ms}.seg")
}

fn open_new_segment(dir: &Path, seq: u64) -> io::Result<OpenSegment> {
    let opened_at_ms = now_ms();
    let path = dir.join(segment_file_name(seq, opened_at_ms));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_u32::<LittleEndian>(MAGIC)?;
    file.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    file.sync_all()?;
    Ok(OpenSegment {
        file,
        path,
        opened_at_ms,
        bytes_written: 8,
    })
}

fn existing_max_seq(dir: &Path) -> io::Result<u64> {
    let mut max = 0u64;
    if !dir.exists() {
        return Ok(max);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(seq) = parse_seq(name) {
            max = max.max(seq);
        }
    }
    Ok(max)
}

fn parse_seq(name: &str) -> Option<u64> {
    let rest = name.strip_prefix("wal-")?;
    let (seq_str, _) = rest.split_once('-')?;
    seq_str.parse().ok()
}

/// Replay every segment in `dir`, oldest first, returning every event whose
/// record was fully written and whose CRC checks out. A truncated or
/// corrupt trailing record stops replay of that segment without error —
/// consistent with a torn write at the tail from an unclean shutdown.
pub fn replay_dir(dir: impl AsRef<Path>) -> Result<Vec<Event>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments: Vec<(u64, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| Error::Internal(e.to_string()))?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let name = name.to_str()?.to_string();
            parse_seq(&name).map(|seq| (seq, e.path()))
        })
        .collect();
    segments.sort_by_key(|(seq, _)| *seq);

    let mut events = Vec::new();
    for (_, path) in segments {
        events.extend(replay_segment(&path).map_err(|e| Error::Internal(e.to_string()))?);
    }
    Ok(events)
}

fn replay_segment(path: &Path) -> io::Result<Vec<Event>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let mut cursor = io::Cursor::new(buf);

    let magic = cursor.read_u32::<LittleEndian>().unwrap_or(0);
    let _version = cursor.read_u32::<LittleEndian>().unwrap_or(0);
    if magic != MAGIC {
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    loop {
        let len = match cursor.read_u32::<LittleEndian>() {
            Ok(l) => l,
            Err(_) => break,
        };
        let mut payload = vec![0u8; len as usize];
        if cursor.read_exact(&mut payload).is_err() {
            break;
        }
        let crc = match cursor.read_u32::<LittleEndian>() {
            Ok(c) => c,
            Err(_) => break,
        };
        if crc32fast::hash(&payload) != crc {
            break;
        }
        match rmp_serde::from_slice::<Event>(&payload) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    Ok(events)
}

/// Relational-store fallback sink: identical append semantics at reduced
/// throughput, used when the native segment log is unavailable. The
/// relational store itself is out of scope for this workspace; this keeps
/// an in-memory log standing in for it.
#[derive(Default)]
pub struct RelationalFallbackSink {
    log: Mutex<Vec<Event>>,
}

impl RelationalFallbackSink {
    /// An empty fallback sink.
    pub fn new() -> Self {
        RelationalFallbackSink::default()
    }

    /// Every event appended so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.log.lock().clone()
    }
}

impl EventSink for RelationalFallbackSink {
    fn append(&self, event: &Event) -> Result<()> {
        self.log.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn event(revision: i64) -> Event {
        Event::filesystem("write", "/a/b.txt", "z1", revision, 0)
    }

    #[test]
    fn append_then_replay_roundtrips() {
        let dir = tempdir().unwrap();
        let wal = WalWriter::open(dir.path()).unwrap();
        wal.append(&event(1)).unwrap();
        wal.append(&event(2)).unwrap();

        let replayed = replay_dir(dir.path()).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].revision, 1);
        assert_eq!(replayed[1].revision, 2);
    }

    #[test]
    fn rotation_creates_additional_segment() {
        let dir = tempdir().unwrap();
        let wal = WalWriter::with_rotation(dir.path(), 16, 60_000).unwrap();
        for i in 0..20 {
            wal.append(&event(i)).unwrap();
        }
        let segment_count = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(segment_count > 1, "expected rotation to produce multiple segments, got {segment_count}");

        let replayed = replay_dir(dir.path()).unwrap();
        assert_eq!(replayed.len(), 20);
    }

    #[test]
    fn truncated_tail_record_is_dropped_not_fatal() {
        let dir = tempdir().unwrap();
        {
            let wal = WalWriter::open(dir.path()).unwrap();
            wal.append(&event(1)).unwrap();
        }
        let seg_path = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let mut bytes = std::fs::read(&seg_path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&seg_path, bytes).unwrap();

        let replayed = replay_dir(dir.path()).unwrap();
        assert!(replayed.is_empty());
    }

    #[test]
    fn relational_fallback_matches_sink_semantics() {
        let sink = RelationalFallbackSink::new();
        sink.append(&event(1)).unwrap();
        sink.append(&event(2)).unwrap();
        assert_eq!(sink.events().len(), 2);
    }
}
