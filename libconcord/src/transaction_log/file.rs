// Copyright 2021-2022 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A file-backed transaction log.
//!
//! The file is a sequence of frames:
//!
//! ```text
//! [len: u32 LE][crc32 of body: u32 LE][body: JSON encoded LogEntry]
//! ```
//!
//! Each append writes one whole frame, flushes it and calls `fsync` before returning. On open the
//! file is replayed into memory. A frame cut short at the end of the file is the footprint of a
//! crash during `append`; that append never returned, so the partial frame is discarded. A
//! complete frame that fails its checksum or does not decode means the log can not be trusted.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{InternalError, LogError};
use crate::process::ProcessId;
use crate::two_phase_commit::TransactionId;

use super::{incomplete_entries, LogEntry, TransactionLog};

const FRAME_HEADER_LEN: usize = 8;

/// A [`TransactionLog`] stored in a single append-only file.
pub struct FileTransactionLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    len: u64,
    entries: Vec<LogEntry>,
}

impl FileTransactionLog {
    /// Opens the log at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupt`] if a complete frame fails validation, and
    /// [`LogError::Internal`] if the file can not be read or repaired.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (entries, valid_len) = decode_frames(&bytes)?;

        if valid_len < bytes.len() {
            warn!(
                "Discarding {} bytes of incomplete trailing frame in {}",
                bytes.len() - valid_len,
                path.display()
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        debug!(
            "Opened transaction log {} with {} entries",
            path.display(),
            entries.len()
        );

        Ok(FileTransactionLog {
            path,
            inner: Mutex::new(Inner {
                file,
                len: valid_len as u64,
                entries,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TransactionLog for FileTransactionLog {
    fn append(&self, entry: LogEntry) -> Result<(), LogError> {
        let frame = encode_frame(&entry)?;

        let mut inner = self.inner.lock();
        if let Err(err) = write_durably(&mut inner.file, &frame) {
            error!(
                "Failed to append to transaction log {}: {}",
                self.path.display(),
                err
            );
            // Cut any partial frame so the next append starts on a frame boundary.
            let previous_len = inner.len;
            if let Err(truncate_err) = inner.file.set_len(previous_len) {
                error!(
                    "Failed to truncate transaction log {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(LogError::from(err));
        }

        inner.len += frame.len() as u64;
        inner.entries.push(entry);
        Ok(())
    }

    fn scan_incomplete(&self, actor: &ProcessId) -> Result<Vec<LogEntry>, LogError> {
        Ok(incomplete_entries(self.inner.lock().entries.iter(), actor))
    }

    fn load(&self, transaction_id: &TransactionId) -> Result<Vec<LogEntry>, LogError> {
        Ok(self
            .inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.transaction_id() == transaction_id)
            .cloned()
            .collect())
    }
}

fn write_durably(file: &mut File, frame: &[u8]) -> std::io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    file.sync_all()
}

fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>, LogError> {
    let body = serde_json::to_vec(entry).map_err(|err| {
        LogError::Internal(InternalError::with_message(format!(
            "unable to encode log entry: {}",
            err
        )))
    })?;
    let len = u32::try_from(body.len()).map_err(|_| {
        LogError::Internal(InternalError::with_message(format!(
            "log entry of {} bytes exceeds the frame size limit",
            body.len()
        )))
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

// Returns the decoded entries and the length of the prefix made of complete frames.
fn decode_frames(bytes: &[u8]) -> Result<(Vec<LogEntry>, usize), LogError> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while bytes.len() - offset >= FRAME_HEADER_LEN {
        let header = &bytes[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let body_start = offset + FRAME_HEADER_LEN;
        if bytes.len() - body_start < len {
            break;
        }
        let body = &bytes[body_start..body_start + len];

        if crc32fast::hash(body) != checksum {
            return Err(LogError::corrupt(format!(
                "checksum mismatch in frame at offset {}",
                offset
            )));
        }

        let entry: LogEntry = serde_json::from_slice(body).map_err(|err| {
            LogError::corrupt(format!(
                "undecodable frame at offset {}: {}",
                offset, err
            ))
        })?;

        entries.push(entry);
        offset = body_start + len;
    }

    Ok((entries, offset))
}
