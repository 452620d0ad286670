//! Deterministic binary codec primitives for on-disk persistence.
//!
//! This module provides the [`Encode`] and [`Decode`] traits used by every
//! persistent structure in the database. The wire format is hand-written and
//! byte-stable: because the crate owns the format, the on-disk representation
//! **never** changes due to a dependency upgrade.
//!
//! # Wire format
//!
//! | Rust type | Encoding                                     |
//! |-----------|----------------------------------------------|
//! | `u8`      | 1 byte                                       |
//! | `u16`     | 2 bytes, little-endian                       |
//! | `u32`     | 4 bytes, little-endian                       |
//! | `u64`     | 8 bytes, little-endian                       |
//! | `[u8; N]` | `N` raw bytes (fixed-size, no length prefix) |
//!
//! All multi-byte integers are **little-endian**. Structures encode their
//! fields back-to-back at explicit offsets; variable-length payloads carry
//! their own length fields in the owning structure.
//!
//! # Sort keys
//!
//! Cross-table ordering is done on a fixed 16-byte token derived from the
//! raw key: [`sort_key16`] takes the first 16 bytes of the Blake2b-512
//! digest. [`cmp16`] compares two tokens bytewise lexicographically.
//! Persisted tables lock in the hash function — substituting another digest
//! requires rewriting all data.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path. All errors are propagated via [`CodecError`].

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;

use blake2::{Blake2b512, Digest};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations **must** produce deterministic output: the same logical
/// value always yields the exact same byte sequence.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>);
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` on success so that callers can advance
/// a cursor through a buffer containing multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError>;
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

impl Encode for u8 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl Decode for u8 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        require(buf, 1)?;
        Ok((buf[0], 1))
    }
}

impl Encode for u16 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

impl Decode for u16 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        require(buf, 2)?;
        Ok((u16::from_le_bytes([buf[0], buf[1]]), 2))
    }
}

impl Encode for u32 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

impl Decode for u32 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        require(buf, 4)?;
        Ok((u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 4))
    }
}

impl Encode for u64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

impl Decode for u64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        require(buf, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        Ok((u64::from_le_bytes(bytes), 8))
    }
}

impl<const N: usize> Encode for [u8; N] {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        require(buf, N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(&buf[..N]);
        Ok((arr, N))
    }
}

// ------------------------------------------------------------------------------------------------
// Sort-key derivation
// ------------------------------------------------------------------------------------------------

/// Fixed 16-byte sort token for a raw key: the first 16 bytes of the
/// Blake2b-512 digest of the key bytes.
///
/// Stable across runs and collision-resistant for practical purposes. The
/// token defines a table's min/max range and is the ordering key for
/// cross-table merges.
pub fn sort_key16(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = Blake2b512::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Bytewise lexicographic comparison of two 16-byte sort tokens.
#[inline]
pub fn cmp16(a: &[u8; 16], b: &[u8; 16]) -> Ordering {
    a.cmp(b)
}
