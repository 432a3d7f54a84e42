//! File-identity-aware read cursor.
//!
//! A [`Cursor`] follows one log file by `(device, inode)` identity rather
//! than by name, so externally rotated or truncated files are picked up
//! without a restart. It reads only bytes appended since the last poll, in
//! bounded chunks, and holds back an incomplete trailing line until the
//! writer completes it.
//!
//! Cursor positions are process-local: losing one on restart costs nothing,
//! because startup reconstruction rebuilds status from the files themselves.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::TailError;

/// Upper bound on bytes consumed per poll. Keeps a single poll from
/// stalling its task on a huge backlog; the remainder is picked up next
/// time around.
const MAX_READ: usize = 64 * 1024;

/// Identity of a file on disk, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

fn file_id(meta: &std::fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId {
        dev: meta.dev(),
        ino: meta.ino(),
    }
}

pub struct Cursor {
    path: PathBuf,
    id: Option<FileId>,
    offset: u64,
    partial: Vec<u8>,
    skip_existing: bool,
}

impl Cursor {
    /// Follow `path`, skipping whatever it already contains. This is the
    /// live-tailing entry point: history belongs to the reconstructor.
    pub fn tail_end(path: PathBuf) -> Cursor {
        Cursor {
            path,
            id: None,
            offset: 0,
            partial: Vec::new(),
            skip_existing: true,
        }
    }

    /// Follow `path` from its first byte — used when switching to a freshly
    /// created dated file, where every line is new.
    pub fn from_start(path: PathBuf) -> Cursor {
        Cursor {
            skip_existing: false,
            ..Cursor::tail_end(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read newly appended bytes and return the complete lines among them.
    ///
    /// Rotation (identity change) and truncation (length below the cursor)
    /// reset the cursor to the start of the file instead of erroring; the
    /// bounded data loss is logged and accepted.
    pub async fn read_new(&mut self) -> Result<Vec<String>, TailError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(source) => {
                // If the file never existed, whatever appears later is new
                // content and must be read from the start.
                self.skip_existing = false;
                return Err(TailError::SourceUnavailable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let id = file_id(&meta);
        match self.id {
            None => {
                self.id = Some(id);
                if self.skip_existing {
                    self.offset = meta.len();
                }
            }
            Some(prev) if prev != id => {
                tracing::warn!(path = %self.path.display(), "file identity changed, cursor reset");
                self.id = Some(id);
                self.offset = 0;
                self.partial.clear();
            }
            Some(_) => {}
        }
        self.skip_existing = false;

        if meta.len() < self.offset {
            tracing::warn!(path = %self.path.display(), "file shrank, cursor reset");
            self.offset = 0;
            self.partial.clear();
        }
        if meta.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await.map_err(|e| TailError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| TailError::Io {
                path: self.path.clone(),
                source: e,
            })?;

        let want = ((meta.len() - self.offset) as usize).min(MAX_READ);
        let mut buf = vec![0u8; want];
        let n = file.read(&mut buf).await.map_err(|e| TailError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        buf.truncate(n);
        self.offset += n as u64;

        let mut lines = Vec::new();
        for byte in buf {
            if byte == b'\n' {
                let text = String::from_utf8_lossy(&self.partial);
                lines.push(text.trim_end_matches('\r').to_string());
                self.partial.clear();
            } else {
                self.partial.push(byte);
            }
        }
        Ok(lines)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
