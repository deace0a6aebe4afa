//! Single-file, append-only key-value store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("TRIENODE")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - reserved: 48 bytes
//!
//! [RECORDS: variable]
//!   - see `record.rs`, concatenated in write order
//! ```
//!
//! There is no on-disk index. Opening a store scans every record and
//! rebuilds the index in memory. A batch is appended with a single write
//! followed by an fsync, so a crash can only leave a torn record at the
//! tail, which the next open cuts off.

use super::record::{self, RecordHeader, RECORD_HEADER_SIZE};
use super::{Batch, KeyValueStore, KeyValueWriter, PendingWrites};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_SIZE: u64 = 64;

/// Location of a compressed value inside the file
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// File handle plus the append position, guarded together
struct Appender {
    file: File,
    write_offset: u64,
}

/// A durable key-value store backed by a single file
pub struct FileStore {
    path: PathBuf,
    appender: Mutex<Appender>,
    index: RwLock<HashMap<Vec<u8>, IndexEntry>>,
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(path = %path.display(), "file_store.create");

        Ok(FileStore {
            path,
            appender: Mutex::new(Appender {
                file,
                write_offset: HEADER_SIZE,
            }),
            index: RwLock::new(HashMap::new()),
        })
    }

    /// Open an existing store file and rebuild its index
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let file_len = file.seek(SeekFrom::End(0))?;
        let (index, write_offset) = Self::scan(&mut file, file_len)?;

        if write_offset < file_len {
            warn!(
                path = %path.display(),
                discarded = file_len - write_offset,
                "file_store.open.torn_tail"
            );
            file.set_len(write_offset)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), objects = index.len(), "file_store.open");

        Ok(FileStore {
            path,
            appender: Mutex::new(Appender { file, write_offset }),
            index: RwLock::new(index),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Walk all complete records, returning the index and the end of the
    /// last complete record
    fn scan(file: &mut File, file_len: u64) -> Result<(HashMap<Vec<u8>, IndexEntry>, u64)> {
        let mut index = HashMap::new();
        let mut offset = HEADER_SIZE;
        file.seek(SeekFrom::Start(offset))?;

        while offset + RECORD_HEADER_SIZE as u64 <= file_len {
            let mut buf = [0u8; RECORD_HEADER_SIZE];
            file.read_exact(&mut buf)?;
            let header = RecordHeader::parse(&buf);

            let body_start = offset + RECORD_HEADER_SIZE as u64;
            if body_start + header.body_len() > file_len {
                break;
            }

            let mut key = vec![0u8; header.key_len as usize];
            file.read_exact(&mut key)?;
            let value_offset = body_start + header.key_len as u64;
            file.seek(SeekFrom::Start(value_offset + header.value_len as u64))?;

            index.insert(
                key,
                IndexEntry {
                    offset: value_offset,
                    size: header.value_len,
                },
            );
            offset = value_offset + header.value_len as u64;
        }

        Ok((index, offset))
    }

    /// Append a group of puts as one write. Keys that are already stored
    /// are skipped since values are content-addressed.
    fn append(&self, writes: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let mut appender = self.appender.lock();
        let base = appender.write_offset;

        let mut buf = Vec::new();
        let mut added: HashMap<Vec<u8>, IndexEntry> = HashMap::new();
        {
            let index = self.index.read();
            for (key, value) in writes {
                if index.contains_key(key) || added.contains_key(key) {
                    continue;
                }
                let record_start = buf.len() as u64;
                let size = record::encode_into(&mut buf, key, value)?;
                added.insert(
                    key.clone(),
                    IndexEntry {
                        offset: base + record_start + RECORD_HEADER_SIZE as u64 + key.len() as u64,
                        size,
                    },
                );
            }
        }
        if buf.is_empty() {
            return Ok(());
        }

        appender.file.seek(SeekFrom::Start(base))?;
        appender.file.write_all(&buf)?;
        appender.file.sync_data()?;
        appender.write_offset = base + buf.len() as u64;

        self.index.write().extend(added);
        Ok(())
    }

    /// Number of stored keys
    pub fn object_count(&self) -> usize {
        self.index.read().len()
    }

    /// Check if a key is stored, without touching the file
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.read().contains_key(key)
    }

    /// Flush file metadata to disk
    pub fn sync(&self) -> Result<()> {
        self.appender.lock().file.sync_all()?;
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.read().get(key).copied() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut data = vec![0u8; entry.size as usize];
        {
            let mut appender = self.appender.lock();
            appender.file.seek(SeekFrom::Start(entry.offset))?;
            appender.file.read_exact(&mut data)?;
        }

        Ok(Some(record::decode_value(&data)?))
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.contains(key))
    }

    fn new_batch(&self) -> Box<dyn Batch + '_> {
        Box::new(FileBatch {
            store: self,
            pending: PendingWrites::default(),
        })
    }
}

struct FileBatch<'a> {
    store: &'a FileStore,
    pending: PendingWrites,
}

impl Batch for FileBatch<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending.put(key, value);
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.pending.size
    }

    fn write(&mut self) -> Result<()> {
        self.store.append(&self.pending.writes)
    }

    fn reset(&mut self) {
        self.pending.reset();
    }

    fn replay(&self, writer: &mut dyn KeyValueWriter) -> Result<()> {
        self.pending.replay(writer)
    }
}
