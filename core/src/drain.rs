//! Where received body bytes go.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use bytes::{Bytes, BytesMut};

/// Policy for received body bytes.
///
/// Each variant is owned by exactly one transfer, so appends need no lock.
#[derive(Debug)]
pub enum DataDrain {
    /// Keep everything in memory. Grows by append, never shrinks.
    InMemory(BytesMut),
    /// Append every chunk at the end of a file the transfer holds open.
    ToFile(File),
    /// Drop the bytes; a streaming consumer has already seen them.
    Ignore,
}

impl DataDrain {
    pub fn in_memory() -> Self {
        DataDrain::InMemory(BytesMut::new())
    }

    pub fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            DataDrain::InMemory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            DataDrain::ToFile(file) => {
                file.seek(SeekFrom::End(0))?;
                file.write_all(chunk)
            }
            DataDrain::Ignore => Ok(()),
        }
    }

    /// Bytes retained in memory so far. Empty for file and ignore drains.
    pub fn buffered(&self) -> &[u8] {
        match self {
            DataDrain::InMemory(buf) => buf,
            DataDrain::ToFile(_) | DataDrain::Ignore => &[],
        }
    }

    /// Flush a file drain to disk. A no-op for the other variants.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            DataDrain::ToFile(file) => file.sync_all(),
            DataDrain::InMemory(_) | DataDrain::Ignore => Ok(()),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            DataDrain::InMemory(buf) => buf.freeze(),
            DataDrain::ToFile(_) | DataDrain::Ignore => Bytes::new(),
        }
    }
}
