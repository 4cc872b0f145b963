// SPDX-License-Identifier: Apache-2.0

//! Incremental reads of remote log files.
//!
//! Only whole lines are consumed. A trailing line without its newline is left
//! for the next read, unless it is already longer than the maximum line size,
//! in which case it is consumed as-is so a file without newlines cannot stall
//! the reader.

use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, info};

use crate::monitor::config::ConnectionConfig;
use crate::monitor::error::{Error, Result};
use crate::monitor::fingerprint::line_hash;
use crate::monitor::transport::RemoteFileTransport;

/// Result of one incremental read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// New, non-empty lines in file order
    pub lines: Vec<String>,
    /// Offset after the last consumed byte
    pub offset: u64,
    /// Hash of the last line read, empty if none is known
    pub fingerprint: String,
    /// The file was truncated or replaced and reading restarted at 0
    pub rotated: bool,
    /// Bytes consumed by this read
    pub bytes_read: u64,
}

impl ReadOutcome {
    fn unchanged(offset: u64, fingerprint: &str) -> Self {
        Self {
            lines: Vec::new(),
            offset,
            fingerprint: fingerprint.to_string(),
            rotated: false,
            bytes_read: 0,
        }
    }

    /// Whether the stored position must be updated.
    pub fn has_progress(&self) -> bool {
        self.rotated || self.bytes_read > 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IncrementalReader {
    max_read_bytes: u64,
    max_line_bytes: usize,
}

/// Extra bytes read before a remembered offset, to look past blank lines.
const VERIFY_SLACK: u64 = 64;

impl IncrementalReader {
    pub fn new(max_read_bytes: u64, max_line_bytes: usize) -> Self {
        let max_line_bytes = max_line_bytes.max(1);
        Self {
            max_read_bytes: max_read_bytes.max(max_line_bytes as u64),
            max_line_bytes,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.max_read_bytes, config.max_line_bytes)
    }

    /// Read lines appended since `last_offset`.
    ///
    /// A missing file yields an unchanged, empty outcome. Other transport
    /// errors are returned so the caller can decide whether to reconnect.
    pub fn read_new(
        &self,
        transport: &mut dyn RemoteFileTransport,
        path: &str,
        last_offset: u64,
        last_fingerprint: &str,
    ) -> Result<ReadOutcome> {
        match self.read_inner(transport, path, last_offset, last_fingerprint) {
            Err(Error::FileNotFound(_)) => {
                debug!(path, "Log file not found, skipping");
                Ok(ReadOutcome::unchanged(last_offset, last_fingerprint))
            }
            other => other,
        }
    }

    fn read_inner(
        &self,
        transport: &mut dyn RemoteFileTransport,
        path: &str,
        last_offset: u64,
        last_fingerprint: &str,
    ) -> Result<ReadOutcome> {
        let size = transport.stat(path)?.size;

        let mut offset = last_offset;
        let mut fingerprint = last_fingerprint;
        let mut rotated = false;

        if size < offset {
            info!(path, previous_offset = offset, size, "Log file truncated, reading from start");
            rotated = true;
        } else if size > offset
            && offset > 0
            && !fingerprint.is_empty()
            && !self.verify_position(transport, path, offset, fingerprint)?
        {
            info!(path, previous_offset = offset, size, "Log file replaced, reading from start");
            rotated = true;
        }

        if rotated {
            offset = 0;
            fingerprint = "";
        }

        if size == offset {
            let mut outcome = ReadOutcome::unchanged(offset, fingerprint);
            outcome.rotated = rotated;
            return Ok(outcome);
        }

        let to_read = (size - offset).min(self.max_read_bytes);
        let mut buf = Vec::with_capacity(to_read as usize);
        {
            let mut handle = transport.open_read(path)?;
            handle.seek(SeekFrom::Start(offset))?;
            handle.take(to_read).read_to_end(&mut buf)?;
        }

        let consumed = match buf.iter().rposition(|&b| b == b'\n') {
            Some(idx) if buf.len() - (idx + 1) <= self.max_line_bytes => idx + 1,
            Some(_) => buf.len(),
            None if buf.len() >= self.max_line_bytes => buf.len(),
            None => 0,
        };

        let text = String::from_utf8_lossy(&buf[..consumed]);
        let mut lines = Vec::new();
        let mut last_hash = None;
        for raw in text.split('\n') {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }
            last_hash = Some(line_hash(line));
            lines.push(self.truncate(line));
        }

        let new_fingerprint = match last_hash {
            Some(h) => h,
            None => fingerprint.to_string(),
        };

        if consumed > 0 {
            debug!(path, offset, consumed, lines = lines.len(), "Read new log data");
        }

        Ok(ReadOutcome {
            lines,
            offset: offset + consumed as u64,
            fingerprint: new_fingerprint,
            rotated,
            bytes_read: consumed as u64,
        })
    }

    /// Check that the last line ending at `offset` still hashes to `fingerprint`.
    ///
    /// Returns true when the position cannot be checked, e.g. the line is
    /// longer than the verification window or did not end in a newline.
    fn verify_position(
        &self,
        transport: &mut dyn RemoteFileTransport,
        path: &str,
        offset: u64,
        fingerprint: &str,
    ) -> Result<bool> {
        let window = offset.min(self.max_line_bytes as u64 + VERIFY_SLACK);
        let start = offset - window;

        let mut buf = Vec::with_capacity(window as usize);
        {
            let mut handle = transport.open_read(path)?;
            handle.seek(SeekFrom::Start(start))?;
            handle.take(window).read_to_end(&mut buf)?;
        }

        if buf.last() != Some(&b'\n') {
            return Ok(true);
        }

        let end = match buf.iter().rposition(|&b| b != b'\n' && b != b'\r') {
            Some(idx) => idx + 1,
            None => return Ok(true),
        };
        let line_start = match buf[..end].iter().rposition(|&b| b == b'\n') {
            Some(idx) => idx + 1,
            None if start == 0 => 0,
            None => return Ok(true),
        };

        let line = String::from_utf8_lossy(&buf[line_start..end]);
        Ok(line_hash(&line) == fingerprint)
    }

    fn truncate(&self, line: &str) -> String {
        if line.len() <= self.max_line_bytes {
            return line.to_string();
        }
        let mut cut = self.max_line_bytes;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line[..cut].to_string()
    }
}
