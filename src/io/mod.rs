//! Positioned block I/O over the single backing file.
//!
//! Every persistent structure lives at an absolute offset inside one regular
//! file. This module wraps [`std::fs::File`] with strictly positioned reads
//! and writes — there is no append mode and no shared cursor, so components
//! never disturb each other's file position. Alignment and sizing are the
//! caller's responsibility.
//!
//! # Guarantees
//!
//! - **No implicit append** — all offsets are absolute.
//! - **Short reads are distinguishable** — [`BlockFile::read_exact_at`]
//!   reports [`FileError::ShortRead`] rather than a generic I/O failure, so
//!   boot-time journal scans can treat a truncated tail as end-of-log.
//! - **Zero-fill extension** — [`BlockFile::ensure_size`] grows the file with
//!   zero bytes and fsyncs before returning.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, trace};

use crate::layout::BLOCK_SIZE;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by block I/O operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// EOF reached before the requested byte count.
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Absolute offset of the read.
        offset: u64,
        /// Bytes requested.
        wanted: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Round `n` up to the next multiple of `align`.
///
/// `align` must be a power of two; [`BLOCK_SIZE`] is the usual choice.
#[inline]
pub fn align_up(n: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// [`align_up`] with the block size as the alignment.
#[inline]
pub fn align_block(n: u64) -> u64 {
    align_up(n, BLOCK_SIZE as u64)
}

// ------------------------------------------------------------------------------------------------
// BlockFile
// ------------------------------------------------------------------------------------------------

/// The backing file, accessed exclusively through positioned I/O.
///
/// Created or opened read-write. All reads and writes go through
/// [`FileExt`], so a shared reference suffices for every operation; the
/// submission loop remains the sole holder of mutable engine state while
/// components keep an `Arc<BlockFile>` handle.
#[derive(Debug)]
pub struct BlockFile {
    file: File,
    path: PathBuf,
}

impl BlockFile {
    /// Open an existing file read-write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path_ref)?;
        info!("opened backing file {}", path_ref.display());
        Ok(Self {
            file,
            path: path_ref.to_path_buf(),
        })
    }

    /// Open a file read-write, creating it if missing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, FileError> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;
        info!("opened (create) backing file {}", path_ref.display());
        Ok(Self {
            file,
            path: path_ref.to_path_buf(),
        })
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<u64, FileError> {
        Ok(self.file.metadata()?.len())
    }

    /// Extend the file to at least `n` bytes with zero-fill, then fsync.
    ///
    /// A file already at least `n` bytes long is left untouched.
    pub fn ensure_size(&self, n: u64) -> Result<(), FileError> {
        if self.size()? < n {
            self.file.set_len(n)?;
            self.file.sync_all()?;
            info!("extended {} to {} bytes", self.path.display(), n);
        }
        Ok(())
    }

    /// Write `buf` at the absolute `offset`.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), FileError> {
        trace!("write {} bytes at offset {}", buf.len(), offset);
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    /// Read up to `n` bytes at the absolute `offset`.
    ///
    /// Returns fewer bytes when EOF intervenes; never errors on a short
    /// read.
    pub fn read_at(&self, offset: u64, n: usize) -> Result<Vec<u8>, FileError> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Read exactly `n` bytes at the absolute `offset`.
    ///
    /// Fails with [`FileError::ShortRead`] if EOF is reached first.
    pub fn read_exact_at(&self, offset: u64, n: usize) -> Result<Vec<u8>, FileError> {
        let buf = self.read_at(offset, n)?;
        if buf.len() < n {
            return Err(FileError::ShortRead {
                offset,
                wanted: n,
                got: buf.len(),
            });
        }
        Ok(buf)
    }

    /// Flush file contents and metadata to stable storage.
    pub fn sync(&self) -> Result<(), FileError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
