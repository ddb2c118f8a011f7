use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{LogError, LogResult};
use crate::record::{LogRecord, FIXED_OVERHEAD, TOMBSTONE_LEN};

/// Flush strategy applied after every `put`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (faster; a power loss can drop the
    /// last few records but never corrupts earlier ones).
    #[default]
    OsDefault,
}

/// Configuration for an [`AppendLog`] instance.
///
/// A construction-time field rather than process-wide state, so differently
/// configured logs can coexist in one process.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConfig {
    /// Flush strategy.
    pub sync_mode: SyncMode,
}

/// Key directory entry: where a key's most recent record lives in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyDirEntry {
    /// Byte offset of the record in the log file.
    pub offset: u64,
    /// Total encoded length of the record.
    pub length: u32,
    /// Write timestamp recorded in the record header.
    pub timestamp: u64,
}

/// Writer state: the append handle and the tracked end-of-log offset.
struct Writer {
    file: File,
    offset: u64,
}

/// Durable, crash-recoverable, single-writer key/value store backed by a
/// sequential append-only log file.
///
/// Every `put` appends one record at the end of the file (it never seeks)
/// and points the in-memory key directory at it; later records for the same
/// key supersede earlier ones. On open the key directory is rebuilt by
/// replaying the log from offset 0, applying records in log order.
///
/// The key directory is updated only after the append succeeds, so a failed
/// write never leaves a dangling index entry pointing at a partial record.
pub struct AppendLog {
    path: PathBuf,
    config: LogConfig,
    writer: Mutex<Writer>,
    reader: Mutex<File>,
    keydir: RwLock<HashMap<Vec<u8>, KeyDirEntry>>,
}

impl AppendLog {
    /// Open (or create) the log file at `path` and rebuild the key
    /// directory by replay.
    ///
    /// A torn final record (crash mid-write) is recovered from: replay
    /// stops at the last complete record, a warning is logged, and the
    /// file is truncated back to the recovered offset so the next append
    /// is contiguous. An empty or absent file is a fresh store.
    pub fn open(path: &Path, config: LogConfig) -> LogResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() && !path.is_file() {
            return Err(LogError::NotAFile(path.to_path_buf()));
        }

        let writer_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = writer_file.metadata()?.len();
        let (keydir, valid_len) = Self::replay(File::open(path)?, file_len)?;

        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "torn record at end of log; truncating"
            );
            writer_file.set_len(valid_len)?;
        }

        debug!(
            path = %path.display(),
            keys = keydir.len(),
            offset = valid_len,
            "log opened"
        );

        let reader = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
            writer: Mutex::new(Writer {
                file: writer_file,
                offset: valid_len,
            }),
            reader: Mutex::new(reader),
            keydir: RwLock::new(keydir),
        })
    }

    /// Replay the log front-to-back, building the key directory.
    ///
    /// Returns the directory and the offset of the first byte past the last
    /// complete record. Stops early (without error) when a record's declared
    /// lengths run past end-of-file; everything before it is kept.
    fn replay(file: File, file_len: u64) -> LogResult<(HashMap<Vec<u8>, KeyDirEntry>, u64)> {
        let mut reader = BufReader::new(file);
        let mut keydir: HashMap<Vec<u8>, KeyDirEntry> = HashMap::new();
        let mut offset: u64 = 0;

        loop {
            // timestamp + key length
            let mut prefix = [0u8; 12];
            match reader.read_exact(&mut prefix) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let timestamp = u64::from_le_bytes(prefix[0..8].try_into().expect("sliced 8 bytes"));
            let key_len =
                u32::from_le_bytes(prefix[8..12].try_into().expect("sliced 4 bytes")) as u64;

            // Bound-check before allocating: a torn length field can claim
            // anything.
            if offset + 12 + key_len + 4 > file_len {
                break;
            }

            let mut key = vec![0u8; key_len as usize];
            match reader.read_exact(&mut key) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let value_len = u32::from_le_bytes(len_buf);

            if value_len == TOMBSTONE_LEN {
                let record_len = FIXED_OVERHEAD as u64 + key_len;
                keydir.remove(&key);
                offset += record_len;
            } else {
                let record_len = FIXED_OVERHEAD as u64 + key_len + value_len as u64;
                if offset + record_len > file_len {
                    break;
                }
                reader.seek_relative(value_len as i64)?;
                keydir.insert(
                    key,
                    KeyDirEntry {
                        offset,
                        length: record_len as u32,
                        timestamp,
                    },
                );
                offset += record_len;
            }
        }

        Ok((keydir, offset))
    }

    /// Store `value` under `key`.
    ///
    /// Appends one record at end-of-file with a single write call, then
    /// points the key directory at it. In [`SyncMode::EveryWrite`] the
    /// record is fsynced before this returns. On write failure the key
    /// directory is left untouched and the partial record is discarded.
    pub fn put(&self, key: &[u8], value: &[u8]) -> LogResult<()> {
        self.append(key, Some(value))
    }

    /// Logically delete `key` by appending a tombstone record.
    ///
    /// Fails with [`LogError::KeyNotFound`] if the key has no live record.
    pub fn remove(&self, key: &[u8]) -> LogResult<()> {
        if !self
            .keydir
            .read()
            .expect("keydir lock poisoned")
            .contains_key(key)
        {
            return Err(LogError::key_not_found(key));
        }
        self.append(key, None)
    }

    fn append(&self, key: &[u8], value: Option<&[u8]>) -> LogResult<()> {
        let record = LogRecord {
            timestamp: unix_now(),
            key: key.to_vec(),
            value: value.map(<[u8]>::to_vec),
        };
        let record_len = record.encoded_len();
        if record_len > u32::MAX as u64 {
            return Err(LogError::RecordTooLarge {
                len: record_len as usize,
            });
        }
        let buf = record.encode()?;

        let mut writer = self.writer.lock().expect("writer lock poisoned");
        let offset = writer.offset;

        let sync_mode = self.config.sync_mode;
        let write_result = (|| -> io::Result<()> {
            writer.file.write_all(&buf)?;
            if sync_mode == SyncMode::EveryWrite {
                writer.file.sync_all()?;
            }
            Ok(())
        })();
        if let Err(e) = write_result {
            // Discard any partial bytes so the next append starts at the
            // tracked offset. The index was never touched.
            let _ = writer.file.set_len(offset);
            return Err(e.into());
        }
        writer.offset += record_len;

        let mut keydir = self.keydir.write().expect("keydir lock poisoned");
        match value {
            Some(_) => {
                keydir.insert(
                    key.to_vec(),
                    KeyDirEntry {
                        offset,
                        length: record_len as u32,
                        timestamp: record.timestamp,
                    },
                );
            }
            None => {
                keydir.remove(key);
            }
        }
        drop(keydir);
        drop(writer);

        debug!(offset, len = record_len, "append");
        Ok(())
    }

    /// Read the live value for `key`.
    ///
    /// Fails with [`LogError::KeyNotFound`] for an absent key — a normal
    /// outcome, not an error condition worth escalating.
    pub fn get(&self, key: &[u8]) -> LogResult<Vec<u8>> {
        let entry = self
            .keydir
            .read()
            .expect("keydir lock poisoned")
            .get(key)
            .copied()
            .ok_or_else(|| LogError::key_not_found(key))?;

        let mut buf = vec![0u8; entry.length as usize];
        {
            let mut reader = self.reader.lock().expect("reader lock poisoned");
            reader.seek(SeekFrom::Start(entry.offset))?;
            reader.read_exact(&mut buf)?;
        }

        let record = LogRecord::decode(&buf, entry.offset)?;
        if record.key != key {
            return Err(LogError::Invariant {
                offset: entry.offset,
                details: "decoded key does not match index key".to_string(),
            });
        }
        record.value.ok_or_else(|| LogError::Invariant {
            offset: entry.offset,
            details: "index points at a tombstone".to_string(),
        })
    }

    /// All live keys, in no particular order. No disk I/O.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keydir
            .read()
            .expect("keydir lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Returns `true` if `key` has a live record.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.keydir
            .read()
            .expect("keydir lock poisoned")
            .contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keydir.read().expect("keydir lock poisoned").len()
    }

    /// Returns `true` if no key has a live record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current size of the log file in bytes (superseded records included;
    /// the log grows monotonically).
    pub fn size_bytes(&self) -> u64 {
        self.writer.lock().expect("writer lock poisoned").offset
    }

    /// Flush buffered writes to stable storage.
    pub fn sync(&self) -> LogResult<()> {
        self.writer
            .lock()
            .expect("writer lock poisoned")
            .file
            .sync_all()?;
        Ok(())
    }

    /// Flush and close the log. Consumes the store, so a closed log cannot
    /// be written to again.
    pub fn close(self) -> LogResult<()> {
        self.sync()
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLog")
            .field("path", &self.path)
            .field("keys", &self.len())
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn open_log(dir: &tempfile::TempDir) -> AppendLog {
        AppendLog::open(&dir.path().join("depot.log"), LogConfig::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"key", b"value bytes").unwrap();
        assert_eq!(log.get(b"key").unwrap(), b"value bytes");
    }

    #[test]
    fn empty_value_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"empty", b"").unwrap();
        assert_eq!(log.get(b"empty").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn binary_key_with_all_byte_values() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        let key: Vec<u8> = (0..=255).collect();
        log.put(&key, b"binary").unwrap();
        assert_eq!(log.get(&key).unwrap(), b"binary");
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        let result = log.get(b"absent");
        assert!(matches!(result, Err(LogError::KeyNotFound { .. })));
    }

    // -----------------------------------------------------------------------
    // Last-write-wins
    // -----------------------------------------------------------------------

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"k", b"v1").unwrap();
        log.put(b"k", b"v2").unwrap();
        assert_eq!(log.get(b"k").unwrap(), b"v2");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn last_write_wins_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"k", b"v1").unwrap();
        log.put(b"k", b"v2").unwrap();
        log.close().unwrap();

        let log = open_log(&dir);
        assert_eq!(log.get(b"k").unwrap(), b"v2");
    }

    // -----------------------------------------------------------------------
    // Persistence / crash recovery
    // -----------------------------------------------------------------------

    #[test]
    fn close_reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"a", b"alpha").unwrap();
        log.put(b"b", b"beta").unwrap();
        log.close().unwrap();

        let log = open_log(&dir);
        assert_eq!(log.get(b"a").unwrap(), b"alpha");
        assert_eq!(log.get(b"b").unwrap(), b"beta");

        let keys: HashSet<Vec<u8>> = log.keys().into_iter().collect();
        let expected: HashSet<Vec<u8>> = [b"a".to_vec(), b"b".to_vec()].into_iter().collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn reopen_rebuilds_identical_keydir() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        for i in 0u32..50 {
            log.put(format!("key-{i}").as_bytes(), &i.to_le_bytes())
                .unwrap();
        }
        // Overwrite a few.
        log.put(b"key-3", b"rewritten").unwrap();
        log.put(b"key-7", b"rewritten").unwrap();

        let before: Vec<(Vec<u8>, Vec<u8>)> = {
            let mut pairs: Vec<_> = log
                .keys()
                .into_iter()
                .map(|k| {
                    let v = log.get(&k).unwrap();
                    (k, v)
                })
                .collect();
            pairs.sort();
            pairs
        };

        // Simulate a crash: drop without close.
        drop(log);

        let log = open_log(&dir);
        let after: Vec<(Vec<u8>, Vec<u8>)> = {
            let mut pairs: Vec<_> = log
                .keys()
                .into_iter()
                .map(|k| {
                    let v = log.get(&k).unwrap();
                    (k, v)
                })
                .collect();
            pairs.sort();
            pairs
        };

        assert_eq!(before, after);
    }

    #[test]
    fn empty_file_is_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);
        assert!(log.is_empty());
        assert!(log.keys().is_empty());
    }

    #[test]
    fn open_on_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppendLog::open(dir.path(), LogConfig::default());
        assert!(matches!(result, Err(LogError::NotAFile(_))));
    }

    // -----------------------------------------------------------------------
    // Torn-tail recovery
    // -----------------------------------------------------------------------

    #[test]
    fn torn_tail_recovers_earlier_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.log");
        let log = AppendLog::open(&path, LogConfig::default()).unwrap();

        log.put(b"first", b"intact").unwrap();
        log.put(b"second", b"will be torn").unwrap();
        let total = log.size_bytes();
        drop(log);

        // Tear the last record mid-value.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(total - 3).unwrap();
        drop(file);

        let log = AppendLog::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.get(b"first").unwrap(), b"intact");
        assert!(matches!(
            log.get(b"second"),
            Err(LogError::KeyNotFound { .. })
        ));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn appends_after_torn_recovery_are_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.log");
        let log = AppendLog::open(&path, LogConfig::default()).unwrap();

        log.put(b"first", b"intact").unwrap();
        let valid = log.size_bytes();
        log.put(b"second", b"torn away").unwrap();
        let total = log.size_bytes();
        drop(log);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(total - 1).unwrap();
        drop(file);

        let log = AppendLog::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.size_bytes(), valid);
        log.put(b"third", b"after recovery").unwrap();
        log.close().unwrap();

        let log = AppendLog::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.get(b"first").unwrap(), b"intact");
        assert_eq!(log.get(b"third").unwrap(), b"after recovery");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn tear_inside_header_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.log");
        let log = AppendLog::open(&path, LogConfig::default()).unwrap();

        log.put(b"kept", b"data").unwrap();
        let valid = log.size_bytes();
        log.put(b"lost", b"x").unwrap();
        drop(log);

        // Leave only 5 bytes of the second record's header.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(valid + 5).unwrap();
        drop(file);

        let log = AppendLog::open(&path, LogConfig::default()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.size_bytes(), valid);
    }

    // -----------------------------------------------------------------------
    // Tombstones
    // -----------------------------------------------------------------------

    #[test]
    fn remove_drops_key() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"doomed", b"value").unwrap();
        log.remove(b"doomed").unwrap();
        assert!(matches!(
            log.get(b"doomed"),
            Err(LogError::KeyNotFound { .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn remove_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"doomed", b"value").unwrap();
        log.put(b"kept", b"value").unwrap();
        log.remove(b"doomed").unwrap();
        log.close().unwrap();

        let log = open_log(&dir);
        assert!(!log.contains(b"doomed"));
        assert!(log.contains(b"kept"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn remove_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);
        assert!(matches!(
            log.remove(b"never"),
            Err(LogError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn key_can_be_rewritten_after_remove() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir);

        log.put(b"k", b"v1").unwrap();
        log.remove(b"k").unwrap();
        log.put(b"k", b"v2").unwrap();
        assert_eq!(log.get(b"k").unwrap(), b"v2");
    }

    // -----------------------------------------------------------------------
    // Sync modes
    // -----------------------------------------------------------------------

    #[test]
    fn every_write_mode_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let log = AppendLog::open(&dir.path().join("sync.log"), config).unwrap();

        log.put(b"durable", b"now").unwrap();
        assert_eq!(log.get(b"durable").unwrap(), b"now");
    }

    // -----------------------------------------------------------------------
    // Property: arbitrary byte strings round-trip
    // -----------------------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_bytes_roundtrip(
                key in proptest::collection::vec(any::<u8>(), 0..48),
                value in proptest::collection::vec(any::<u8>(), 0..256),
            ) {
                let dir = tempfile::tempdir().unwrap();
                let log = AppendLog::open(
                    &dir.path().join("prop.log"),
                    LogConfig::default(),
                )
                .unwrap();

                log.put(&key, &value).unwrap();
                prop_assert_eq!(log.get(&key).unwrap(), value.clone());

                log.close().unwrap();
                let log = AppendLog::open(
                    &dir.path().join("prop.log"),
                    LogConfig::default(),
                )
                .unwrap();
                prop_assert_eq!(log.get(&key).unwrap(), value);
            }
        }
    }
}
