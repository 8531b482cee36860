//! The store: durable key/value mapping over an append-only record log and
//! a B+tree index of record offsets.

use crate::iterator::Iter;
use crate::record::{Record, RECORD_HEADER_SIZE};
use bytes::Bytes;
use keel_common::{KeelError, Result, StoreConfig};
use keel_index::{Index, InsertMode};
use keel_pager::Pager;
use std::path::{Path, PathBuf};

const DATA_FILE: &str = "data.db";
const INDEX_FILE: &str = "index.db";
const CLEAN_LOCK_FILE: &str = "clean.lock";

/// A log-structured key/value store.
///
/// Writes append a record to `data.db` (durable before the call returns)
/// and point the index at its offset; reads resolve the offset through the
/// index and fetch the record. The index itself is write-back cached, so
/// after a crash it is rebuilt by replaying the log (see [`Store::open`]).
pub struct Store {
    log: Pager,
    index: Index,
    /// Next append position; equals the used length of the log.
    offset: u64,
    data_dir: PathBuf,
}

impl Store {
    /// Opens (or creates) a store in `config.data_dir`.
    ///
    /// If the previous shutdown was clean (marker file present), the log is
    /// scanned only to find the append offset and the persisted index is
    /// trusted. Otherwise every record is replayed into the index,
    /// tombstones included, so the mapping converges to the state implied
    /// by the durable log.
    pub fn open(config: StoreConfig) -> Result<Store> {
        std::fs::create_dir_all(&config.data_dir)?;

        let log = Pager::open(config.data_dir.join(DATA_FILE), config.pager.clone())?;
        let index_pager = Pager::open(config.data_dir.join(INDEX_FILE), config.pager.clone())?;
        let index = Index::open(index_pager)?;

        let mut store = Store {
            log,
            index,
            offset: 0,
            data_dir: config.data_dir,
        };

        let lock_path = store.data_dir.join(CLEAN_LOCK_FILE);
        if lock_path.exists() {
            store.offset = store.scan_log(false)?;
            std::fs::remove_file(&lock_path)?;
        } else {
            store.offset = store.scan_log(true)?;
            tracing::debug!(offset = store.offset, "index rebuilt from log replay");
        }

        Ok(store)
    }

    /// Inserts or overwrites `key -> value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append_insert(key, value, InsertMode::Upsert)
    }

    /// Inserts `key -> value`; fails with `KeyAlreadyExists` if present.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append_insert(key, value, InsertMode::InsertOnly)
    }

    /// Overwrites `key -> value`; fails with `KeyNotFound` if absent.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append_insert(key, value, InsertMode::UpdateOnly)
    }

    /// Returns the current value for `key`, or `None` if the key is absent
    /// or its latest record is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let offset = match self.index.search(key) {
            Ok(offset) => offset,
            Err(KeelError::KeyNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let record = self.read_record(offset)?;
        if record.is_tombstone() {
            Ok(None)
        } else {
            Ok(Some(record.value))
        }
    }

    /// Deletes `key` by appending a tombstone. Returns whether a live value
    /// existed. Deleting an absent or already-deleted key writes nothing.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let offset = match self.index.search(key) {
            Ok(offset) => offset,
            Err(KeelError::KeyNotFound) => return Ok(false),
            Err(e) => return Err(e),
        };

        if self.read_record(offset)?.is_tombstone() {
            return Ok(false);
        }

        let encoded = Record::tombstone(key).encode();
        self.log.write_at_offset(self.offset, &encoded)?;
        self.index.insert(key, self.offset, InsertMode::Upsert)?;
        self.offset += encoded.len() as u64;
        Ok(true)
    }

    /// Opens an ordered iterator over `[start, end)`. Tombstoned keys are
    /// skipped.
    pub fn iter(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Iter<'_>> {
        let cursor = self.index.cursor(start, end)?;
        Ok(Iter::new(self, cursor))
    }

    /// Closes the index and log, then drops the clean-shutdown marker.
    /// Consuming `self` makes a second close unrepresentable.
    pub fn close(self) -> Result<()> {
        self.index.close()?;
        self.log.close()?;
        std::fs::File::create(self.data_dir.join(CLEAN_LOCK_FILE))?;
        Ok(())
    }

    /// The directory holding this store's files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn append_insert(&mut self, key: &[u8], value: &[u8], mode: InsertMode) -> Result<()> {
        let encoded = Record::insert(key, value).encode();
        self.log.write_at_offset(self.offset, &encoded)?;
        // On an index-mode failure the offset stays put, so the dead record
        // is overwritten by the next append.
        self.index.insert(key, self.offset, mode)?;
        self.offset += encoded.len() as u64;
        Ok(())
    }

    /// Reads and decodes the record starting at `offset`.
    pub(crate) fn read_record(&self, offset: u64) -> Result<Record> {
        let header = self.log.read_at_offset(offset, RECORD_HEADER_SIZE)?;
        let key_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let value_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;

        let mut data = header;
        data.extend(self.log.read_at_offset(offset + RECORD_HEADER_SIZE as u64, key_len + value_len)?);
        Record::decode(&data, offset)
    }

    /// Scans the log from the start, optionally replaying each record into
    /// the index, and returns the append offset. The scan stops cleanly at
    /// a torn tail record left behind by a crash mid-append.
    fn scan_log(&mut self, rebuild: bool) -> Result<u64> {
        let size = self.log.size()?;
        let mut offset = 0u64;

        while offset < size {
            if offset + RECORD_HEADER_SIZE as u64 > size {
                tracing::warn!(offset, "torn record header at log tail; ignoring");
                break;
            }
            let header = self.log.read_at_offset(offset, RECORD_HEADER_SIZE)?;
            let key_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as u64;
            let value_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as u64;
            let record_len = RECORD_HEADER_SIZE as u64 + key_len + value_len;

            if offset + record_len > size {
                tracing::warn!(offset, "torn record body at log tail; ignoring");
                break;
            }

            if rebuild {
                let record = self.read_record(offset)?;
                self.index.insert(&record.key, offset, InsertMode::Upsert)?;
            }
            offset += record_len;
        }

        Ok(offset)
    }
}
