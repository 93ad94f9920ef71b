//! On-disk `BlockBackend`, generalizing the teacher's `DiskManager` from
//! a single fixed-layout file to a keyed, checksummed, multi-database
//! store: one directory per database name, one file per block.
//!
//! Each block file is a small fixed header followed by the payload:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     payload_len (u32, little-endian)
//! 4       8     checksum (u64, little-endian)
//! 12      8     epoch (u64, little-endian)
//! 20      ..    payload (payload_len bytes)
//! ```
//!
//! Writes go to a sibling temp file and are `fsync`'d before an atomic
//! rename over the target, so a crash mid-write never leaves a block
//! with a mismatched header/payload — the same "write then fsync"
//! durability discipline the teacher's `DiskManager::write_page` uses,
//! extended with a rename for per-block atomicity.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::backend::{BlockBackend, DeleteRangeOutcome};
use crate::block::block::{BlockMeta, RawBlockRecord};
use crate::common::{Error, Result};

const HEADER_SIZE: usize = 20;
const NAME_FILE: &str = ".dbname";

pub struct FileBlockBackend {
    base_dir: PathBuf,
    temp_counter: AtomicU64,
}

impl FileBlockBackend {
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            temp_counter: AtomicU64::new(0),
        })
    }

    fn db_dir(&self, db: &str) -> PathBuf {
        self.base_dir.join(sanitize(db))
    }

    fn block_path(&self, db: &str, index: u32) -> PathBuf {
        self.db_dir(db).join(format!("{index:010}.blk"))
    }

    fn ensure_db_dir(&self, db: &str) -> Result<PathBuf> {
        let dir = self.db_dir(db);
        fs::create_dir_all(&dir)?;
        let name_file = dir.join(NAME_FILE);
        if !name_file.exists() {
            fs::write(&name_file, db.as_bytes())?;
        }
        Ok(dir)
    }

    fn next_temp_path(&self, dir: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(".tmp-{n}-{}", std::process::id()))
    }

    fn encode(record: &RawBlockRecord) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + record.payload.len());
        buf.extend_from_slice(&record.payload_len.to_le_bytes());
        buf.extend_from_slice(&record.checksum.to_le_bytes());
        buf.extend_from_slice(&record.epoch.to_le_bytes());
        buf.extend_from_slice(&record.payload);
        buf
    }

    fn decode_header(bytes: &[u8]) -> Result<(u32, u64, u64)> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::CorruptPayload("block header truncated".to_string()));
        }
        let payload_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let checksum = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let epoch = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
        Ok((payload_len, checksum, epoch))
    }
}

impl BlockBackend for FileBlockBackend {
    fn put(&self, db: &str, index: u32, record: RawBlockRecord) -> Result<()> {
        let dir = self.ensure_db_dir(db)?;
        let bytes = Self::encode(&record);

        let temp_path = self.next_temp_path(&dir);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.block_path(db, index))?;
        Ok(())
    }

    fn get(&self, db: &str, index: u32) -> Result<Option<RawBlockRecord>> {
        let path = self.block_path(db, index);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (payload_len, checksum, epoch) = Self::decode_header(&bytes)?;
        let payload = bytes[HEADER_SIZE..].to_vec();
        if payload.len() != payload_len as usize {
            return Err(Error::CorruptPayload(format!(
                "declared payload_len {payload_len} does not match stored length {}",
                payload.len()
            )));
        }

        Ok(Some(RawBlockRecord {
            payload_len,
            checksum,
            epoch,
            payload,
        }))
    }

    fn delete_range(&self, db: &str, from: u32, to: u32) -> DeleteRangeOutcome {
        if from > to {
            return DeleteRangeOutcome::success(None);
        }
        let mut last_deleted = None;
        for index in from..=to {
            let path = self.block_path(db, index);
            match fs::remove_file(&path) {
                Ok(()) => last_deleted = Some(index),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => last_deleted = Some(index),
                Err(e) => return DeleteRangeOutcome::failure(last_deleted, e.into()),
            }
        }
        DeleteRangeOutcome::success(last_deleted)
    }

    fn scan(&self, db: &str) -> Result<Vec<BlockMeta>> {
        let dir = self.db_dir(db);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(".blk") else {
                continue;
            };
            let Ok(index) = stem.parse::<u32>() else {
                continue;
            };

            let mut file = File::open(entry.path())?;
            let mut header = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let (payload_len, checksum, epoch) = Self::decode_header(&header)?;
            metas.push(BlockMeta {
                index,
                payload_len,
                checksum,
                epoch,
            });
        }

        metas.sort_by_key(|m| m.index);
        Ok(metas)
    }

    fn enumerate_databases(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name_file = entry.path().join(NAME_FILE);
            if let Ok(name) = fs::read_to_string(&name_file) {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn delete_database(&self, db: &str) -> Result<()> {
        let dir = self.db_dir(db);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Map an arbitrary database name to a filesystem-safe directory name.
/// The original name is preserved verbatim in a sidecar file so
/// `enumerate_databases` can recover it exactly.
fn sanitize(db: &str) -> String {
    let mut out = String::with_capacity(db.len());
    for c in db.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out == "." || out == ".." {
        out = format!("db-{:x}", crc32fast::hash(db.as_bytes()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

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
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();

        backend.put("t1.db", 0, record(1, b"hello world")).unwrap();
        let got = backend.get("t1.db", 0).unwrap().unwrap();
        assert_eq!(got.payload, b"hello world");
        assert_eq!(got.epoch, 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();
        assert!(backend.get("t1.db", 0).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_backend_instances() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBlockBackend::open(dir.path()).unwrap();
            backend.put("t1.db", 0, record(1, b"durable")).unwrap();
        }
        {
            let backend = FileBlockBackend::open(dir.path()).unwrap();
            let got = backend.get("t1.db", 0).unwrap().unwrap();
            assert_eq!(got.payload, b"durable");
        }
    }

    #[test]
    fn test_scan_orders_by_index_without_loading_all_payloads() {
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();
        backend.put("t1.db", 5, record(1, b"e")).unwrap();
        backend.put("t1.db", 1, record(1, b"a")).unwrap();
        backend.put("t1.db", 3, record(1, b"c")).unwrap();

        let indices: Vec<u32> = backend.scan("t1.db").unwrap().iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[test]
    fn test_delete_range() {
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();
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
    fn test_enumerate_and_delete_database_preserves_original_name() {
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();
        backend.put("weird/name:db", 0, record(1, b"x")).unwrap();

        let names = backend.enumerate_databases().unwrap();
        assert_eq!(names, vec!["weird/name:db".to_string()]);

        backend.delete_database("weird/name:db").unwrap();
        assert!(backend.enumerate_databases().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_payload_on_disk_is_detected_by_header_mismatch() {
        let dir = tempdir().unwrap();
        let backend = FileBlockBackend::open(dir.path()).unwrap();
        backend.put("t1.db", 0, record(1, b"hello")).unwrap();

        // Simulate bit rot: flip a payload byte directly on disk.
        let path = backend.block_path("t1.db", 0);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let got = backend.get("t1.db", 0).unwrap().unwrap();
        assert_ne!(
            crate::block::block::compute_checksum(&got.payload),
            got.checksum
        );
    }
}
