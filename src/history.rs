//! Last read position per document, keyed by content hash.
//!
//! Writes are debounced on a background thread: every [`HistoryStore::mark_visited`]
//! replaces the pending write and restarts its timer, so scrolling through a
//! hundred lines costs one disk write.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const WRITE_DELAY: Duration = Duration::from_millis(200);

const READ_ATTEMPTS: usize = 4;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

type HistoryMap = HashMap<String, usize>;

enum Message {
    Visit { hash: String, index: usize },
    Flush(Sender<()>),
}

pub struct HistoryStore {
    path: PathBuf,
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl HistoryStore {
    pub fn open(path: PathBuf) -> Self {
        Self::with_delay(path, WRITE_DELAY)
    }

    pub fn with_delay(path: PathBuf, delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Message>();
        let worker_path = path.clone();
        let worker = thread::spawn(move || {
            let mut pending: Option<(String, usize)> = None;
            loop {
                let received = if pending.is_some() {
                    rx.recv_timeout(delay)
                } else {
                    rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                };
                match received {
                    Ok(Message::Visit { hash, index }) => pending = Some((hash, index)),
                    Ok(Message::Flush(done)) => {
                        if let Some((hash, index)) = pending.take() {
                            write_entry(&worker_path, &hash, index);
                        }
                        let _ = done.send(());
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some((hash, index)) = pending.take() {
                            write_entry(&worker_path, &hash, index);
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if let Some((hash, index)) = pending.take() {
                            write_entry(&worker_path, &hash, index);
                        }
                        break;
                    }
                }
            }
        });

        Self {
            path,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Last visited line for `hash`, or 0 if the document is new.
    pub fn get(&self, hash: &str) -> usize {
        load_map(&self.path).get(hash).copied().unwrap_or(0)
    }

    /// Schedules `index` to be recorded for `hash`, superseding any write
    /// still waiting for its delay to pass.
    pub fn mark_visited(&self, hash: &str, index: usize) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Message::Visit {
                hash: hash.to_string(),
                index,
            });
        }
    }

    /// Writes any pending entry now and waits for it to land.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (done_tx, done_rx) = mpsc::channel();
        if tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn write_entry(path: &Path, hash: &str, index: usize) {
    let mut map = load_map(path);
    map.insert(hash.to_string(), index);
    match save_map(path, &map) {
        Ok(()) => debug!(index, "history saved"),
        Err(err) => warn!("failed to save history: {err:#}"),
    }
}

/// Reads the mapping, retrying a few times when the file is caught half
/// written by another instance. Gives up with an empty mapping.
fn load_map(path: &Path) -> HistoryMap {
    for attempt in 0..READ_ATTEMPTS {
        match try_load(path) {
            Ok(map) => return map,
            Err(LoadError::Missing) => return HistoryMap::new(),
            Err(LoadError::Invalid(err)) => {
                debug!(attempt, "history unreadable: {err:#}");
                if attempt + 1 < READ_ATTEMPTS {
                    thread::sleep(READ_RETRY_DELAY);
                }
            }
        }
    }
    warn!("history at {} is unreadable, starting fresh", path.display());
    HistoryMap::new()
}

enum LoadError {
    Missing,
    Invalid(anyhow::Error),
}

fn try_load(path: &Path) -> Result<HistoryMap, LoadError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(LoadError::Missing),
        Err(err) => return Err(LoadError::Invalid(err.into())),
    };
    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map(|(map, _)| map)
        .map_err(|err| LoadError::Invalid(anyhow!("decode failed: {err}")))
}

fn save_map(path: &Path, map: &HistoryMap) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(map, bincode::config::standard())
        .map_err(|err| anyhow!("encode failed: {err}"))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(&bytes)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn store_in(dir: &Path) -> HistoryStore {
        HistoryStore::with_delay(dir.join("history.bin"), Duration::from_millis(30))
    }

    #[test]
    fn unknown_document_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.get("abc"), 0);
    }

    #[test]
    fn settled_mark_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.mark_visited("abc", 42);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(store.get("abc"), 42);
    }

    #[test]
    fn rapid_marks_coalesce_to_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.bin");
        let store = HistoryStore::with_delay(path.clone(), Duration::from_millis(100));
        for index in 1..=20 {
            store.mark_visited("abc", index);
        }
        assert!(!path.exists(), "nothing should be written before the delay");

        thread::sleep(Duration::from_millis(400));
        assert_eq!(store.get("abc"), 20);
    }

    #[test]
    fn new_mark_restarts_the_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.bin");
        let store = HistoryStore::with_delay(path.clone(), Duration::from_millis(150));
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(300) {
            store.mark_visited("abc", 1);
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!path.exists());
        store.flush();
        assert_eq!(store.get("abc"), 1);
    }

    #[test]
    fn entries_for_other_documents_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.mark_visited("first", 3);
        store.flush();
        store.mark_visited("second", 7);
        store.flush();
        assert_eq!(store.get("first"), 3);
        assert_eq!(store.get("second"), 7);
    }

    #[test]
    fn drop_writes_pending_entry() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HistoryStore::with_delay(dir.path().join("history.bin"), WRITE_DELAY);
            store.mark_visited("abc", 9);
        }
        assert_eq!(store_in(dir.path()).get("abc"), 9);
    }

    #[test]
    fn read_retries_until_concurrent_writer_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.bin");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(70));
            let map = HistoryMap::from([("h".to_string(), 11)]);
            save_map(&writer_path, &map).unwrap();
        });

        let map = load_map(&path);
        writer.join().unwrap();
        assert_eq!(map.get("h"), Some(&11));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.bin");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        assert_eq!(load_map(&path), HistoryMap::new());

        let store = store_in(dir.path());
        store.mark_visited("abc", 5);
        store.flush();
        assert_eq!(store.get("abc"), 5);
    }
}
