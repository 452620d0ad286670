//! # Manifest Page
//!
//! The manifest is a single fixed-size page listing every sealed table blob
//! currently admitted to the database. It is the central metadata authority
//! for the table region: a table exists exactly when the manifest page
//! carries its entry.
//!
//! ## On-disk layout (one block)
//!
//! ```text
//! header (16 bytes):
//!   [version u16][reserved u16][epoch u64][count u16][reserved u16]
//! entries (48 bytes each, up to CAP = ⌊(B − 16) / 48⌋ = 85):
//!   [level u16][reserved u16][meta_off u64][meta_len u32][min_prefix 16][max_prefix 16]
//! ```
//!
//! A page whose version, epoch, and count are all zero decodes as the empty
//! manifest — a freshly zero-filled region is a valid, empty database.
//!
//! ## Role
//!
//! The codecs here are stateless; the table store holds the mutable
//! in-memory page and persists it by rewriting the whole block on every
//! admission. Entries are append-only within a running process.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

use crate::codec::{CodecError, Decode, Encode};
use crate::layout::BLOCK_SIZE;

/// Manifest header size in bytes.
pub const MANIFEST_HEADER_SIZE: usize = 16;

/// Encoded size of one manifest entry.
pub const MANIFEST_ENTRY_SIZE: usize = 48;

/// Maximum entries one page can hold.
pub const MANIFEST_CAP: usize = (BLOCK_SIZE - MANIFEST_HEADER_SIZE) / MANIFEST_ENTRY_SIZE;

/// Current manifest format version.
pub const MANIFEST_VERSION: u16 = 1;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by manifest codecs.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A sort-key prefix slice was not exactly 16 bytes.
    #[error("invalid prefix size: expected 16 bytes, got {0}")]
    InvalidPrefixSize(usize),

    /// The page holds more entries than one block can encode.
    #[error("too many manifest entries: {0} (cap {MANIFEST_CAP})")]
    TooManyEntries(usize),

    /// The buffer handed to the decoder was not exactly one block.
    #[error("invalid manifest page size: {0} bytes")]
    InvalidPageSize(usize),

    /// The decoded entry count exceeds the page capacity.
    #[error("manifest count {0} exceeds cap {MANIFEST_CAP}")]
    CountExceedsCap(usize),

    /// The claimed entry payload exceeds the page.
    #[error("corrupt manifest page: {0}")]
    Corrupt(String),

    /// Encoding / decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

// ------------------------------------------------------------------------------------------------
// Manifest data structures
// ------------------------------------------------------------------------------------------------

/// One admitted table blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// LSM level the table belongs to (flushes produce level 0).
    pub level: u16,

    /// Absolute offset of the table's meta page.
    pub meta_off: u64,

    /// Total blob length in bytes (meta + index + data).
    pub meta_len: u32,

    /// Smallest sort-key prefix in the table.
    pub min_prefix: [u8; 16],

    /// Largest sort-key prefix in the table.
    pub max_prefix: [u8; 16],
}

impl ManifestEntry {
    /// Build an entry from raw prefix slices, validating their length.
    pub fn new(
        level: u16,
        meta_off: u64,
        meta_len: u32,
        min_prefix: &[u8],
        max_prefix: &[u8],
    ) -> Result<Self, ManifestError> {
        let min: [u8; 16] = min_prefix
            .try_into()
            .map_err(|_| ManifestError::InvalidPrefixSize(min_prefix.len()))?;
        let max: [u8; 16] = max_prefix
            .try_into()
            .map_err(|_| ManifestError::InvalidPrefixSize(max_prefix.len()))?;
        Ok(Self {
            level,
            meta_off,
            meta_len,
            min_prefix: min,
            max_prefix: max,
        })
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.level.encode_to(buf);
        0u16.encode_to(buf);
        self.meta_off.encode_to(buf);
        self.meta_len.encode_to(buf);
        self.min_prefix.encode_to(buf);
        self.max_prefix.encode_to(buf);
    }

    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut off = 0;
        let (level, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (_reserved, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (meta_off, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (meta_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (min_prefix, n) = <[u8; 16]>::decode_from(&buf[off..])?;
        off += n;
        let (max_prefix, n) = <[u8; 16]>::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                level,
                meta_off,
                meta_len,
                min_prefix,
                max_prefix,
            },
            off,
        ))
    }
}

/// The decoded manifest page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPage {
    /// Format version; zero only on the empty page.
    pub version: u16,

    /// Bumped on every persisted rewrite.
    pub epoch: u64,

    /// Admitted tables, in admission order.
    pub entries: Vec<ManifestEntry>,
}

impl ManifestPage {
    /// The page a zero-filled block decodes to.
    pub fn empty() -> Self {
        Self {
            version: 0,
            epoch: 0,
            entries: Vec::new(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Page codecs
// ------------------------------------------------------------------------------------------------

/// Encode a manifest page into one zero-padded block.
pub fn encode_page(page: &ManifestPage) -> Result<Vec<u8>, ManifestError> {
    if page.entries.len() > MANIFEST_CAP {
        return Err(ManifestError::TooManyEntries(page.entries.len()));
    }

    let mut buf = Vec::with_capacity(BLOCK_SIZE);
    page.version.encode_to(&mut buf);
    0u16.encode_to(&mut buf);
    page.epoch.encode_to(&mut buf);
    (page.entries.len() as u16).encode_to(&mut buf);
    0u16.encode_to(&mut buf);
    debug_assert_eq!(buf.len(), MANIFEST_HEADER_SIZE);

    for entry in &page.entries {
        entry.encode_to(&mut buf);
    }
    buf.resize(BLOCK_SIZE, 0);
    Ok(buf)
}

/// Decode a manifest page from exactly one block.
pub fn decode_page(buf: &[u8]) -> Result<ManifestPage, ManifestError> {
    if buf.len() != BLOCK_SIZE {
        return Err(ManifestError::InvalidPageSize(buf.len()));
    }

    let mut off = 0;
    let (version, n) = u16::decode_from(&buf[off..])?;
    off += n;
    let (_reserved, n) = u16::decode_from(&buf[off..])?;
    off += n;
    let (epoch, n) = u64::decode_from(&buf[off..])?;
    off += n;
    let (count, n) = u16::decode_from(&buf[off..])?;
    off += n;
    let (_reserved, n) = u16::decode_from(&buf[off..])?;
    off += n;

    if version == 0 && epoch == 0 && count == 0 {
        return Ok(ManifestPage::empty());
    }
    if count as usize > MANIFEST_CAP {
        return Err(ManifestError::CountExceedsCap(count as usize));
    }
    if MANIFEST_HEADER_SIZE + count as usize * MANIFEST_ENTRY_SIZE > BLOCK_SIZE {
        return Err(ManifestError::Corrupt(format!(
            "{count} entries exceed the page"
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (entry, n) = ManifestEntry::decode_from(&buf[off..])?;
        off += n;
        entries.push(entry);
    }

    Ok(ManifestPage {
        version,
        epoch,
        entries,
    })
}
