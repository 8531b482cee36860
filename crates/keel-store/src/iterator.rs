//! Ordered iteration over live key/value pairs.

use crate::store::Store;
use bytes::Bytes;
use keel_common::Result;
use keel_index::Cursor;

/// Forward iterator over a key range of the store.
///
/// Wraps an index cursor and resolves each offset through the record log.
/// Tombstoned keys are skipped, so only live pairs are yielded.
pub struct Iter<'a> {
    store: &'a Store,
    cursor: Cursor<'a>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(store: &'a Store, cursor: Cursor<'a>) -> Self {
        Self { store, cursor }
    }

    /// Returns the next live entry, or `None` at the end of the range.
    pub fn next(&mut self) -> Result<Option<(Bytes, Bytes)>> {
        while let Some((key, offset)) = self.cursor.next()? {
            let record = self.store.read_record(offset)?;
            if record.is_tombstone() {
                continue;
            }
            return Ok(Some((key, record.value)));
        }
        Ok(None)
    }
}
