use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{TrustDbError, TrustDbResult};
use crate::record::Record;

/// Highest log schema this build can replay.
pub const SCHEMA_VERSION: u16 = 1;

/// One committed write batch.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
/// A batch is one frame, so a torn write loses the whole batch and never
/// part of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub schema: u16,
    pub commit_seq: u64,
    pub records: Vec<Record>,
}

/// Flush strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every batch.
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only.
    OsDefault,
}

const HEADER_SIZE: usize = 8;

struct LogWriter {
    file: File,
    /// End of the last acknowledged frame.
    offset: u64,
    /// Set when a failed append could not be rolled back.
    broken: bool,
}

impl LogWriter {
    fn write_frame(&mut self, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len > self.offset {
            warn!(offset = self.offset, len, "discarding bytes past the last frame");
            self.file.set_len(self.offset)?;
        }
        self.file.write_all(frame)?;
        if sync_mode == SyncMode::EveryWrite {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

/// Append-only, CRC-framed commit log backing a durable store.
///
/// Recovery reads front-to-back: frames failing the CRC are skipped, and a
/// truncated tail (a crash mid-append) ends recovery. A failed append is
/// cut back off the file before the error is returned, so a later
/// acknowledged frame never sits behind a partial one.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_mode: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> TrustDbResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                file,
                offset,
                broken: false,
            }),
            sync_mode,
        })
    }

    /// Append one batch. Returns the byte offset of its frame once the frame
    /// is written (and synced under [`SyncMode::EveryWrite`]).
    ///
    /// On failure the file is truncated back to the previous frame. If even
    /// that fails the log refuses every later append.
    pub fn append(&self, record: &LogRecord) -> TrustDbResult<u64> {
        let payload = bincode::serialize(record)
            .map_err(|e| TrustDbError::Unavailable(format!("log encoding failed: {e}")))?;
        let length = u32::try_from(payload.len()).map_err(|_| {
            let len = payload.len();
            TrustDbError::Validation(format!("batch of {len} bytes exceeds frame limit"))
        })?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self
            .writer
            .lock()
            .map_err(|_| TrustDbError::Unavailable("log writer lock poisoned".into()))?;
        if w.broken {
            return Err(TrustDbError::Unavailable(format!(
                "log {} holds an unrecoverable partial frame",
                self.path.display()
            )));
        }
        let entry_offset = w.offset;

        if let Err(e) = w.write_frame(&frame, self.sync_mode) {
            match w.file.set_len(entry_offset) {
                Ok(()) => {
                    warn!(offset = entry_offset, error = %e, "log append failed; rolled back");
                }
                Err(te) => {
                    error!(
                        offset = entry_offset,
                        error = %e,
                        truncate_error = %te,
                        "log append failed and could not be rolled back"
                    );
                    w.broken = true;
                }
            }
            return Err(e.into());
        }

        w.offset += frame.len() as u64;

        debug!(
            offset = entry_offset,
            len = payload.len(),
            commit_seq = record.commit_seq,
            "log append"
        );
        Ok(entry_offset)
    }

    /// Read back every intact frame. A torn tail is cut off so that later
    /// appends start on a frame boundary.
    pub fn recover(&self) -> TrustDbResult<Vec<LogRecord>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "truncated log frame; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated log frame; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping log frame"
                );
                offset += HEADER_SIZE as u64 + length as u64;
                continue;
            }

            match bincode::deserialize::<LogRecord>(&payload) {
                Ok(record) => entries.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "undecodable log frame; skipping");
                }
            }

            offset += HEADER_SIZE as u64 + length as u64;
        }

        if offset < file_len {
            self.truncate_to(offset)?;
        }

        debug!(recovered = entries.len(), "log recovery complete");
        Ok(entries)
    }

    fn truncate_to(&self, len: u64) -> TrustDbResult<()> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| TrustDbError::Unavailable("log writer lock poisoned".into()))?;
        w.file.set_len(len)?;
        w.offset = len;
        warn!(len, "truncated torn log tail");
        Ok(())
    }

    /// Current end-of-log offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().map(|w| w.offset).unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
