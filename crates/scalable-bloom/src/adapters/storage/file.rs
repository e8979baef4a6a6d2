//! File-backed keyed store
//!
//! # Log Format
//!
//! ```text
//! header:  magic "SBKV" (4) | version (1) | epoch u64 (8)
//! record:  length u32 (4)   | op (1)      | crc32 (4)    | payload
//! ```
//!
//! The file is an append-only log of mutations. Each handle keeps a replica of
//! the map and the log offset it has replayed up to. Before every operation it
//! takes an `fs2` lock on the `<path>.lock` sidecar (shared for reads,
//! exclusive for writes) and replays whatever other handles appended since.
//! A mutation only reaches the replica after its record is on disk.
//!
//! Compaction rewrites the log under a new epoch; a handle that sees the epoch
//! change replays the log from the start.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::ports::outbound::{all_positions_set, decode_counter, set_positions};
use crate::ports::KeyValueStore;

/// Magic bytes identifying a keyed store log
const LOG_MAGIC: [u8; 4] = *b"SBKV";

/// Current log format version
const LOG_VERSION: u8 = 1;

/// magic + version + epoch
const HEADER_SIZE: u64 = 4 + 1 + 8;

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;
const OP_ALLOCATE: u8 = 2;
const OP_SET_BITS: u8 = 3;

type Entries = HashMap<Vec<u8>, Vec<u8>>;

fn io_error(e: std::io::Error) -> StoreError {
    StoreError::Io {
        message: e.to_string(),
    }
}

fn corrupt(path: &Path, message: String) -> StoreError {
    StoreError::Corrupt {
        key: path.display().to_string(),
        message,
    }
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Option<&'a [u8]> {
    let slice = bytes.get(*cursor..cursor.checked_add(len)?)?;
    *cursor += len;
    Some(slice)
}

fn read_len(bytes: &[u8], cursor: &mut usize) -> Option<usize> {
    let raw: [u8; 4] = take(bytes, cursor, 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw) as usize)
}

fn checksum(op: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[op]);
    hasher.update(payload);
    hasher.finalize()
}

/// `<path>.<suffix>`, next to the log
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Epoch for a freshly written log, strictly after `previous`
fn next_epoch(previous: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    now.max(previous.saturating_add(1))
}

fn bits_set(entries: &Entries, key: &[u8], positions: &[usize]) -> bool {
    all_positions_set(entries.get(key).map_or(&[][..], Vec::as_slice), positions)
}

fn counter_value(entries: &Entries, key: &[u8]) -> Result<u64, StoreError> {
    match entries.get(key) {
        Some(bytes) => decode_counter(key, bytes),
        None => Ok(0),
    }
}

/// One logged mutation
#[derive(Debug, Clone, PartialEq)]
enum Record {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
    Allocate { key: Vec<u8>, len_bits: u64 },
    SetBits { key: Vec<u8>, positions: Vec<usize> },
}

impl Record {
    fn op(&self) -> u8 {
        match self {
            Record::Put { .. } => OP_PUT,
            Record::Delete { .. } => OP_DELETE,
            Record::Allocate { .. } => OP_ALLOCATE,
            Record::SetBits { .. } => OP_SET_BITS,
        }
    }

    fn key(&self) -> &[u8] {
        match self {
            Record::Put { key, .. }
            | Record::Delete { key }
            | Record::Allocate { key, .. }
            | Record::SetBits { key, .. } => key,
        }
    }

    // Payload: [key_len:u32][key][op-specific tail]
    fn encode(&self, out: &mut Vec<u8>) {
        let key = self.key();
        let mut payload = Vec::with_capacity(4 + key.len());
        payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
        payload.extend_from_slice(key);
        match self {
            Record::Put { value, .. } => payload.extend_from_slice(value),
            Record::Delete { .. } => {}
            Record::Allocate { len_bits, .. } => payload.extend_from_slice(&len_bits.to_le_bytes()),
            Record::SetBits { positions, .. } => {
                for &pos in positions {
                    payload.extend_from_slice(&(pos as u64).to_le_bytes());
                }
            }
        }

        let op = self.op();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.push(op);
        out.extend_from_slice(&checksum(op, &payload).to_le_bytes());
        out.extend_from_slice(&payload);
    }

    fn decode(op: u8, payload: &[u8]) -> Option<Self> {
        let mut cursor = 0;
        let key_len = read_len(payload, &mut cursor)?;
        let key = take(payload, &mut cursor, key_len)?.to_vec();
        let tail = payload.get(cursor..)?;

        match op {
            OP_PUT => Some(Record::Put {
                key,
                value: tail.to_vec(),
            }),
            OP_DELETE if tail.is_empty() => Some(Record::Delete { key }),
            OP_ALLOCATE => Some(Record::Allocate {
                key,
                len_bits: u64::from_le_bytes(tail.try_into().ok()?),
            }),
            OP_SET_BITS if tail.len() % 8 == 0 => {
                let positions = tail
                    .chunks_exact(8)
                    .map(|chunk| {
                        let raw = <[u8; 8]>::try_from(chunk).ok()?;
                        usize::try_from(u64::from_le_bytes(raw)).ok()
                    })
                    .collect::<Option<Vec<usize>>>()?;
                Some(Record::SetBits { key, positions })
            }
            _ => None,
        }
    }

    fn apply(self, entries: &mut Entries) {
        match self {
            Record::Put { key, value } => {
                entries.insert(key, value);
            }
            Record::Delete { key } => {
                entries.remove(&key);
            }
            Record::Allocate { key, len_bits } => {
                entries
                    .entry(key)
                    .or_insert_with(|| vec![0u8; len_bits.div_ceil(8) as usize]);
            }
            Record::SetBits { key, positions } => {
                set_positions(entries.entry(key).or_default(), &positions);
            }
        }
    }
}

/// Split the next frame off `bytes`, or `None` if it is incomplete
fn next_frame<'a>(bytes: &'a [u8], cursor: &mut usize) -> Option<(u8, u32, &'a [u8])> {
    let len = read_len(bytes, cursor)?;
    let op = *take(bytes, cursor, 1)?.first()?;
    let crc = u32::from_le_bytes(take(bytes, cursor, 4)?.try_into().ok()?);
    let payload = take(bytes, cursor, len)?;
    Some((op, crc, payload))
}

/// Decode complete records from `bytes`, read at log offset `offset`.
///
/// Returns the records and the number of bytes they span; an incomplete
/// trailing frame is left unconsumed.
fn decode_records(
    path: &Path,
    offset: u64,
    bytes: &[u8],
) -> Result<(Vec<Record>, usize), StoreError> {
    let mut records = Vec::new();
    let mut cursor = 0;

    loop {
        let start = cursor;
        let Some((op, stored, payload)) = next_frame(bytes, &mut cursor) else {
            return Ok((records, start));
        };

        let at = offset + start as u64;
        if checksum(op, payload) != stored {
            return Err(corrupt(path, format!("checksum mismatch at offset {}", at)));
        }
        let record = Record::decode(op, payload)
            .ok_or_else(|| corrupt(path, format!("malformed record at offset {}", at)))?;
        records.push(record);
    }
}

/// A handle's view of the log
#[derive(Default)]
struct Replica {
    entries: Entries,
    epoch: u64,
    /// Log bytes replayed so far; 0 while no log exists
    offset: u64,
}

/// `fs2` lock on the sidecar, released on drop
struct LogGuard<'a>(&'a File);

impl<'a> LogGuard<'a> {
    fn shared(file: &'a File) -> Result<Self, StoreError> {
        FileExt::lock_shared(file).map_err(io_error)?;
        Ok(Self(file))
    }

    fn exclusive(file: &'a File) -> Result<Self, StoreError> {
        FileExt::lock_exclusive(file).map_err(io_error)?;
        Ok(Self(file))
    }
}

impl Drop for LogGuard<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.0);
    }
}

/// File-backed key-value store.
///
/// Any number of handles, in one process or several, may open the same path.
/// Writes serialize on the sidecar lock and each one appends a single
/// checksummed record (a bit update writes only the touched positions) and
/// syncs it. Reads replay only what was appended since the handle last looked.
/// The log grows with every write until [`compact`](Self::compact) is called.
pub struct FileBackedKVStore {
    path: PathBuf,
    lock_file: File,
    replica: Mutex<Replica>,
}

impl FileBackedKVStore {
    /// Open the store at `path`, replaying the existing log if there is one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        // Not truncated on open: other handles may hold the lock
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(sidecar(&path, "lock"))
            .map_err(io_error)?;

        let store = Self {
            path,
            lock_file,
            replica: Mutex::new(Replica::default()),
        };
        let (keys, bytes) = store.read(|replica| (replica.entries.len(), replica.offset))?;
        info!(path = %store.path.display(), keys, bytes, "Opened keyed store");
        Ok(store)
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the log as one record per live key.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut replica = self.replica.lock();
        let _guard = LogGuard::exclusive(&self.lock_file)?;
        self.catch_up(&mut *replica, true)?;
        if replica.offset == 0 {
            return Ok(());
        }

        let mut body = Vec::new();
        for (key, value) in &replica.entries {
            Record::Put {
                key: key.clone(),
                value: value.clone(),
            }
            .encode(&mut body);
        }

        let epoch = next_epoch(replica.epoch);
        self.write_log(epoch, &body)?;

        let compacted = HEADER_SIZE + body.len() as u64;
        info!(
            path = %self.path.display(),
            before = replica.offset,
            after = compacted,
            "Compacted keyed store log"
        );
        replica.epoch = epoch;
        replica.offset = compacted;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Replica) -> T) -> Result<T, StoreError> {
        let mut replica = self.replica.lock();
        let _guard = LogGuard::shared(&self.lock_file)?;
        self.catch_up(&mut *replica, false)?;
        Ok(f(&*replica))
    }

    /// Plan records against the current contents, append them, then apply them.
    fn write<T>(
        &self,
        plan: impl FnOnce(&Entries) -> Result<(Vec<Record>, T), StoreError>,
    ) -> Result<T, StoreError> {
        let mut replica = self.replica.lock();
        let _guard = LogGuard::exclusive(&self.lock_file)?;
        self.catch_up(&mut *replica, true)?;

        let (records, out) = plan(&replica.entries)?;
        if !records.is_empty() {
            self.append(&mut *replica, records)?;
        }
        Ok(out)
    }

    /// Replay records appended since this handle last read the log.
    ///
    /// A torn trailing record can only come from a crashed writer; it is
    /// skipped, and cut off when the caller holds the exclusive lock.
    fn catch_up(&self, replica: &mut Replica, exclusive: bool) -> Result<(), StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                *replica = Replica::default();
                return Ok(());
            }
            Err(e) => return Err(io_error(e)),
        };

        let epoch = self.read_header(&mut file)?;
        let len = file.metadata().map_err(io_error)?.len();
        let reload = replica.offset == 0 || replica.epoch != epoch || replica.offset > len;
        let start = if reload { HEADER_SIZE } else { replica.offset };
        if !reload && start == len {
            return Ok(());
        }

        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(start)).map_err(io_error)?;
        file.read_to_end(&mut tail).map_err(io_error)?;
        let (records, consumed) = decode_records(&self.path, start, &tail)?;

        if reload {
            replica.entries.clear();
            replica.epoch = epoch;
        }
        let replayed = records.len();
        for record in records {
            record.apply(&mut replica.entries);
        }
        replica.offset = start + consumed as u64;

        if consumed < tail.len() {
            warn!(
                path = %self.path.display(),
                offset = replica.offset,
                bytes = tail.len() - consumed,
                "Torn record at end of keyed store log"
            );
            if exclusive {
                OpenOptions::new()
                    .write(true)
                    .open(&self.path)
                    .and_then(|file| file.set_len(start + consumed as u64))
                    .map_err(io_error)?;
            }
        }

        if replayed > 0 {
            debug!(
                path = %self.path.display(),
                records = replayed,
                offset = replica.offset,
                "Replayed keyed store log"
            );
        }
        Ok(())
    }

    fn read_header(&self, file: &mut File) -> Result<u64, StoreError> {
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => corrupt(&self.path, "truncated log header".to_string()),
            _ => io_error(e),
        })?;

        if header[..4] != LOG_MAGIC {
            return Err(corrupt(&self.path, "not a keyed store log".to_string()));
        }
        if header[4] != LOG_VERSION {
            return Err(corrupt(
                &self.path,
                format!("unsupported log version {}", header[4]),
            ));
        }

        let mut epoch = [0u8; 8];
        epoch.copy_from_slice(&header[5..]);
        Ok(u64::from_le_bytes(epoch))
    }

    /// Put `records` on disk, then apply them to the replica.
    fn append(&self, replica: &mut Replica, records: Vec<Record>) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        for record in &records {
            record.encode(&mut bytes);
        }

        let base = if replica.offset == 0 {
            let epoch = next_epoch(replica.epoch);
            self.write_log(epoch, &bytes)?;
            replica.epoch = epoch;
            HEADER_SIZE
        } else {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&self.path)
                .map_err(io_error)?;
            if let Err(e) = file.write_all(&bytes).and_then(|()| file.sync_data()) {
                // The log must end on a record boundary
                if let Err(trim) = file.set_len(replica.offset) {
                    warn!(path = %self.path.display(), error = %trim, "Failed to trim partial append");
                }
                return Err(io_error(e));
            }
            replica.offset
        };

        for record in records {
            record.apply(&mut replica.entries);
        }
        replica.offset = base + bytes.len() as u64;
        Ok(())
    }

    /// Replace the log atomically via a temp file and rename.
    fn write_log(&self, epoch: u64, body: &[u8]) -> Result<(), StoreError> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE as usize + body.len());
        bytes.extend_from_slice(&LOG_MAGIC);
        bytes.push(LOG_VERSION);
        bytes.extend_from_slice(&epoch.to_le_bytes());
        bytes.extend_from_slice(body);

        let temp_path = sidecar(&self.path, "tmp");
        let written = File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|()| std::fs::rename(&temp_path, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_error(e));
        }

        debug!(path = %self.path.display(), epoch, bytes = bytes.len(), "Wrote keyed store log");
        Ok(())
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read(|replica| replica.entries.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write(|_| {
            let record = Record::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            };
            Ok((vec![record], ()))
        })
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.write(|entries| {
            let records = if entries.contains_key(key) {
                vec![Record::Delete { key: key.to_vec() }]
            } else {
                Vec::new()
            };
            Ok((records, ()))
        })
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.read(|replica| replica.entries.contains_key(key))
    }

    fn allocate_bits(&self, key: &[u8], len_bits: u64) -> Result<(), StoreError> {
        self.write(|entries| {
            let records = if entries.contains_key(key) {
                Vec::new()
            } else {
                vec![Record::Allocate {
                    key: key.to_vec(),
                    len_bits,
                }]
            };
            Ok((records, ()))
        })
    }

    fn set_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        self.write(|entries| {
            if bits_set(entries, key, positions) {
                return Ok((Vec::new(), false));
            }
            let record = Record::SetBits {
                key: key.to_vec(),
                positions: positions.to_vec(),
            };
            Ok((vec![record], true))
        })
    }

    fn set_bits_and_increment(
        &self,
        key: &[u8],
        positions: &[usize],
        counter: &[u8],
        by: u64,
    ) -> Result<bool, StoreError> {
        self.write(|entries| {
            if bits_set(entries, key, positions) {
                return Ok((Vec::new(), false));
            }
            let next = counter_value(entries, counter)?.saturating_add(by);
            let records = vec![
                Record::SetBits {
                    key: key.to_vec(),
                    positions: positions.to_vec(),
                },
                Record::Put {
                    key: counter.to_vec(),
                    value: next.to_le_bytes().to_vec(),
                },
            ];
            Ok((records, true))
        })
    }

    fn test_bits(&self, key: &[u8], positions: &[usize]) -> Result<bool, StoreError> {
        self.read(|replica| bits_set(&replica.entries, key, positions))
    }

    fn increment(&self, key: &[u8], by: u64) -> Result<u64, StoreError> {
        self.write(|entries| {
            let next = counter_value(entries, key)?.saturating_add(by);
            let record = Record::Put {
                key: key.to_vec(),
                value: next.to_le_bytes().to_vec(),
            };
            Ok((vec![record], next))
        })
    }
}
