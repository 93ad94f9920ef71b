//! In-memory `BlockBackend`, used for tests and as the reference
//! implementation every property in spec §8 must be exercisable
//! against (spec §9 design notes).

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::block::backend::{BlockBackend, DeleteRangeOutcome};
use crate::block::block::{BlockMeta, RawBlockRecord};
use crate::common::Result;

#[derive(Default)]
pub struct MemoryBlockBackend {
    // BTreeMap keeps `scan` ordered by index for free.
    databases: Mutex<std::collections::HashMap<String, BTreeMap<u32, RawBlockRecord>>>,
}

impl MemoryBlockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/debug hook: corrupt a stored block's payload in place so
    /// the next `get` observes a checksum mismatch (spec §8 property
    /// 2). The checksum field is left untouched on purpose.
    pub fn corrupt_for_test(&self, db: &str, index: u32, mutate: impl FnOnce(&mut [u8])) {
        let mut dbs = self.databases.lock();
        if let Some(blocks) = dbs.get_mut(db) {
            if let Some(record) = blocks.get_mut(&index) {
                mutate(&mut record.payload);
            }
        }
    }
}

impl BlockBackend for MemoryBlockBackend {
    fn put(&self, db: &str, index: u32, record: RawBlockRecord) -> Result<()> {
        let mut dbs = self.databases.lock();
        dbs.entry(db.to_string()).or_default().insert(index, record);
        Ok(())
    }

    fn get(&self, db: &str, index: u32) -> Result<Option<RawBlockRecord>> {
        let dbs = self.databases.lock();
        Ok(dbs.get(db).and_then(|blocks| blocks.get(&index).cloned()))
    }

    fn delete_range(&self, db: &str, from: u32, to: u32) -> DeleteRangeOutcome {
        if from > to {
            return DeleteRangeOutcome::success(None);
        }
        let mut dbs = self.databases.lock();
        let mut last_deleted = None;
        if let Some(blocks) = dbs.get_mut(db) {
            for index in from..=to {
                blocks.remove(&index);
                last_deleted = Some(index);
            }
        }
        DeleteRangeOutcome::success(last_deleted)
    }

    fn scan(&self, db: &str) -> Result<Vec<BlockMeta>> {
        let dbs = self.databases.lock();
        Ok(dbs
            .get(db)
            .map(|blocks| blocks.iter().map(|(&idx, rec)| rec.meta(idx)).collect())
            .unwrap_or_default())
    }

    fn enumerate_databases(&self) -> Result<Vec<String>> {
        let dbs = self.databases.lock();
        Ok(dbs.keys().cloned().collect())
    }

    fn delete_database(&self, db: &str) -> Result<()> {
        let mut dbs = self.databases.lock();
        dbs.remove(db);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: u64, payload: &[u8]) -> RawBlockRecord {
        RawBlockRecord {
            payload_len: payload.len() as u32,
            checksum: crate::block::block::compute_checksum(payload),
            epoch,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_put_get_roundtrip() {
        let backend = MemoryBlockBackend::new();
        backend.put("t1.db", 0, record(1, b"hello")).unwrap();

        let got = backend.get("t1.db", 0).unwrap().unwrap();
        assert_eq!(got.payload, b"hello");
    }

    #[test]
    fn test_get_missing_returns_none() {
        let backend = MemoryBlockBackend::new();
        assert!(backend.get("t1.db", 0).unwrap().is_none());
    }

    #[test]
    fn test_scan_is_ordered() {
        let backend = MemoryBlockBackend::new();
        backend.put("t1.db", 2, record(1, b"c")).unwrap();
        backend.put("t1.db", 0, record(1, b"a")).unwrap();
        backend.put("t1.db", 1, record(1, b"b")).unwrap();

        let indices: Vec<u32> = backend.scan("t1.db").unwrap().iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_range() {
        let backend = MemoryBlockBackend::new();
        for i in 0..5 {
            backend.put("t1.db", i, record(1, b"x")).unwrap();
        }

        let outcome = backend.delete_range("t1.db", 1, 3);
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.last_deleted, Some(3));

        let remaining: Vec<u32> = backend.scan("t1.db").unwrap().iter().map(|m| m.index).collect();
        assert_eq!(remaining, vec![0, 4]);
    }

    #[test]
    fn test_enumerate_and_delete_database() {
        let backend = MemoryBlockBackend::new();
        backend.put("t1.db", 0, record(1, b"a")).unwrap();
        backend.put("t2.db", 0, record(1, b"b")).unwrap();

        let mut names = backend.enumerate_databases().unwrap();
        names.sort();
        assert_eq!(names, vec!["t1.db".to_string(), "t2.db".to_string()]);

        backend.delete_database("t1.db").unwrap();
        let names = backend.enumerate_databases().unwrap();
        assert_eq!(names, vec!["t2.db".to_string()]);
    }

    #[test]
    fn test_corrupt_for_test_mutates_payload() {
        let backend = MemoryBlockBackend::new();
        backend.put("t1.db", 0, record(1, b"hello")).unwrap();
        backend.corrupt_for_test("t1.db", 0, |data| data[0] = b'H');

        let got = backend.get("t1.db", 0).unwrap().unwrap();
        assert_eq!(&got.payload, b"Hello");
        // Checksum was computed over the original payload and is left
        // untouched, so the stored checksum no longer matches.
        assert_ne!(got.checksum, crate::block::block::compute_checksum(&got.payload));
    }
}
