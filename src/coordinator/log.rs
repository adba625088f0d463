//! Durable state log
//!
//! Membership state transitions are appended to a replicated, linearizable
//! log before the corresponding in-memory change becomes externally
//! observable. After a coordinator restart, replaying the surviving records
//! in append order reconstructs the list. Records are identified by
//! monotonic entry ids and superseded records are invalidated in batches:
//! `ServerEnlisted` invalidates the preceding `ServerEnlisting`, a
//! `ServerUpdate` invalidates the previous one, and removing a server
//! invalidates everything recorded for it.
//!
//! The log service itself is external; `MemoryLog` and `FileLog` are local
//! implementations of the same interface for embedding and tests.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Identifier the log assigns to an appended record; 0 never names a record.
pub type EntryId = u64;

pub const NO_ENTRY_ID: EntryId = 0;

/// External replicated log interface.
pub trait DurableLog: Send + Sync {
    /// Append a record, atomically invalidating the given prior entries.
    /// Returns the entry id assigned to the new record.
    fn append(&self, record: &[u8], invalidates: &[EntryId]) -> Result<EntryId>;

    /// Read back one live record.
    fn read(&self, id: EntryId) -> Result<Vec<u8>>;

    /// All live records in append order; the replay order for recovery.
    fn read_all(&self) -> Result<Vec<(EntryId, Vec<u8>)>>;

    /// Invalidate a batch of records.
    fn invalidate(&self, ids: &[EntryId]) -> Result<()>;
}

// === Record types ===

/// Body of `ServerEnlisting` and `ServerEnlisted` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInformation {
    pub server_id: u64,
    pub services: u32,
    pub read_speed: u32,
    pub service_locator: String,
}

/// Body of a `ServerDown` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDownInfo {
    pub server_id: u64,
}

/// Body of a `ServerUpdate` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerUpdateInfo {
    pub server_id: u64,
    pub master_recovery_info: Vec<u8>,
}

/// A typed durable-log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    ServerEnlisting(ServerInformation),
    ServerEnlisted(ServerInformation),
    ServerDown(ServerDownInfo),
    ServerUpdate(ServerUpdateInfo),
}

impl LogRecord {
    pub fn entry_type(&self) -> &'static str {
        match self {
            LogRecord::ServerEnlisting(_) => "ServerEnlisting",
            LogRecord::ServerEnlisted(_) => "ServerEnlisted",
            LogRecord::ServerDown(_) => "ServerDown",
            LogRecord::ServerUpdate(_) => "ServerUpdate",
        }
    }
}

/// On-the-wire shape of a record: the entry type name plus the encoded body.
#[derive(Serialize, Deserialize)]
struct RecordFrame {
    entry_type: String,
    body: Vec<u8>,
}

// === Adapter ===

/// Thin typed wrapper over a `DurableLog`: encodes records going in, decodes
/// and dispatches records coming out.
#[derive(Clone)]
pub struct LogAdapter {
    log: Arc<dyn DurableLog>,
}

impl LogAdapter {
    pub fn new(log: Arc<dyn DurableLog>) -> Self {
        Self { log }
    }

    pub fn append(&self, record: &LogRecord, invalidates: &[EntryId]) -> Result<EntryId> {
        let body = match record {
            LogRecord::ServerEnlisting(info) | LogRecord::ServerEnlisted(info) => {
                bincode::serialize(info)
            }
            LogRecord::ServerDown(info) => bincode::serialize(info),
            LogRecord::ServerUpdate(info) => bincode::serialize(info),
        }
        .map_err(|e| Error::DurableLog(format!("Serialize error: {}", e)))?;

        let frame = RecordFrame {
            entry_type: record.entry_type().to_string(),
            body,
        };
        let bytes = bincode::serialize(&frame)
            .map_err(|e| Error::DurableLog(format!("Serialize error: {}", e)))?;
        self.log.append(&bytes, invalidates)
    }

    pub fn read(&self, id: EntryId) -> Result<LogRecord> {
        Self::decode(&self.log.read(id)?)
    }

    pub fn read_all(&self) -> Result<Vec<(EntryId, LogRecord)>> {
        self.log
            .read_all()?
            .into_iter()
            .map(|(id, bytes)| Ok((id, Self::decode(&bytes)?)))
            .collect()
    }

    pub fn invalidate(&self, ids: &[EntryId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.log.invalidate(ids)
    }

    fn decode(bytes: &[u8]) -> Result<LogRecord> {
        let frame: RecordFrame = bincode::deserialize(bytes)
            .map_err(|e| Error::Corrupted(format!("bad record frame: {}", e)))?;

        let corrupted = |e| Error::Corrupted(format!("bad {} body: {}", frame.entry_type, e));
        match frame.entry_type.as_str() {
            "ServerEnlisting" => Ok(LogRecord::ServerEnlisting(
                bincode::deserialize(&frame.body).map_err(corrupted)?,
            )),
            "ServerEnlisted" => Ok(LogRecord::ServerEnlisted(
                bincode::deserialize(&frame.body).map_err(corrupted)?,
            )),
            "ServerDown" => Ok(LogRecord::ServerDown(
                bincode::deserialize(&frame.body).map_err(corrupted)?,
            )),
            "ServerUpdate" => Ok(LogRecord::ServerUpdate(
                bincode::deserialize(&frame.body).map_err(corrupted)?,
            )),
            other => Err(Error::Corrupted(format!("unknown entry type: {}", other))),
        }
    }
}

// === In-memory implementation ===

#[derive(Default)]
struct MemoryLogInner {
    next_id: EntryId,
    entries: BTreeMap<EntryId, Vec<u8>>,
}

/// In-memory log for tests and single-process embedding.
pub struct MemoryLog {
    inner: Mutex<MemoryLogInner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryLogInner {
                next_id: 1,
                entries: BTreeMap::new(),
            }),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableLog for MemoryLog {
    fn append(&self, record: &[u8], invalidates: &[EntryId]) -> Result<EntryId> {
        let mut inner = self.inner.lock().unwrap();
        for id in invalidates {
            inner.entries.remove(id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(id, record.to_vec());
        Ok(id)
    }

    fn read(&self, id: EntryId) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::DurableLog(format!("no live entry {}", id)))
    }

    fn read_all(&self) -> Result<Vec<(EntryId, Vec<u8>)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect())
    }

    fn invalidate(&self, ids: &[EntryId]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            inner.entries.remove(id);
        }
        Ok(())
    }
}

// === File-backed implementation ===

const LOG_MAGIC: [u8; 4] = [0x43, 0x53, 0x4C, 0x31]; // "CSL1"
const FRAME_RECORD: u8 = 1;
const FRAME_TOMBSTONE: u8 = 2;

struct FileLogInner {
    writer: BufWriter<File>,
    next_id: EntryId,
    live: BTreeMap<EntryId, Vec<u8>>,
}

/// Single-file append-only log.
///
/// Frame format: `[MAGIC][ID][FRAME_KIND][LEN][PAYLOAD][CRC32]`. Records are
/// invalidated by appending tombstone frames carrying the target id, so the
/// file itself stays append-only; the set of live records is rebuilt on open.
pub struct FileLog {
    inner: Mutex<FileLogInner>,
}

impl FileLog {
    /// Open or create the log file, replaying it to rebuild the live set.
    /// Replay stops at the first corrupted frame.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut next_id = 1;
        let mut live = BTreeMap::new();
        match File::open(path) {
            Ok(file) => {
                let mut reader = BufReader::new(file);
                loop {
                    match Self::read_frame(&mut reader) {
                        Ok(Some((id, FRAME_RECORD, payload))) => {
                            live.insert(id, payload);
                            next_id = next_id.max(id + 1);
                        }
                        Ok(Some((id, _, _))) => {
                            live.remove(&id);
                            next_id = next_id.max(id + 1);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("log replay stopped at corrupted frame: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(FileLogInner {
                writer: BufWriter::new(file),
                next_id,
                live,
            }),
        })
    }

    fn write_frame(writer: &mut BufWriter<File>, id: EntryId, kind: u8, payload: &[u8]) -> Result<()> {
        writer.write_all(&LOG_MAGIC)?;
        writer.write_all(&id.to_le_bytes())?;
        writer.write_all(&[kind])?;
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(payload)?;

        let mut checksum_data = Vec::with_capacity(13 + payload.len());
        checksum_data.extend_from_slice(&id.to_le_bytes());
        checksum_data.push(kind);
        checksum_data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        checksum_data.extend_from_slice(payload);
        writer.write_all(&crc32fast::hash(&checksum_data).to_le_bytes())?;
        Ok(())
    }

    fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(EntryId, u8, Vec<u8>)>> {
        let mut magic = [0u8; 4];
        match reader.read_exact(&mut magic) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        if magic != LOG_MAGIC {
            return Err(Error::Corrupted("invalid log magic".into()));
        }

        let mut id_bytes = [0u8; 8];
        reader.read_exact(&mut id_bytes)?;
        let id = EntryId::from_le_bytes(id_bytes);

        let mut kind = [0u8; 1];
        reader.read_exact(&mut kind)?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let mut checksum_data = Vec::with_capacity(13 + len);
        checksum_data.extend_from_slice(&id_bytes);
        checksum_data.push(kind[0]);
        checksum_data.extend_from_slice(&len_bytes);
        checksum_data.extend_from_slice(&payload);
        if crc32fast::hash(&checksum_data) != stored_checksum {
            return Err(Error::Corrupted("checksum mismatch".into()));
        }

        Ok(Some((id, kind[0], payload)))
    }

    fn sync(inner: &mut FileLogInner) -> Result<()> {
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl DurableLog for FileLog {
    fn append(&self, record: &[u8], invalidates: &[EntryId]) -> Result<EntryId> {
        let mut inner = self.inner.lock().unwrap();
        for id in invalidates {
            Self::write_frame(&mut inner.writer, *id, FRAME_TOMBSTONE, &[])?;
            inner.live.remove(id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        Self::write_frame(&mut inner.writer, id, FRAME_RECORD, record)?;
        inner.live.insert(id, record.to_vec());
        Self::sync(&mut inner)?;
        Ok(id)
    }

    fn read(&self, id: EntryId) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .live
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::DurableLog(format!("no live entry {}", id)))
    }

    fn read_all(&self) -> Result<Vec<(EntryId, Vec<u8>)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .live
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect())
    }

    fn invalidate(&self, ids: &[EntryId]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            Self::write_frame(&mut inner.writer, *id, FRAME_TOMBSTONE, &[])?;
            inner.live.remove(id);
        }
        Self::sync(&mut inner)
    }
}
