//! Byte buffers for wire encoding and record assembly.
//!
//! [`Buf`] wraps `Vec<u8>` with the handful of operations the codecs need. Its
//! `Debug` output is limited to the length so buffers holding key shares or
//! handshake bytes can be logged freely.

use std::fmt;
use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

/// Growable byte buffer used by every encoder in the crate.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Buf(Vec<u8>);

impl Buf {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer able to hold `capacity` bytes without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Buf(Vec::with_capacity(capacity))
    }

    /// Create a new buffer from a slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Buf(data.to_vec())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    /// Append a big endian u16.
    pub fn push_u16(&mut self, value: u16) {
        self.0.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big endian u24, as used by handshake message headers.
    pub fn push_u24(&mut self, value: u32) {
        self.0.extend_from_slice(&value.to_be_bytes()[1..]);
    }

    /// Resize the buffer to the specified length, filling with the given value.
    pub fn resize(&mut self, len: usize, value: u8) {
        self.0.resize(len, value);
    }

    /// Truncate the buffer to the specified length.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity()
    }

    /// Make room for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    /// Overwrite a previously written big endian u16 at `pos`.
    ///
    /// Used to back-fill length prefixes once the body is known.
    pub fn set_u16(&mut self, pos: usize, value: u16) {
        self.0[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Overwrite a previously written big endian u24 at `pos`.
    pub fn set_u24(&mut self, pos: usize, value: u32) {
        self.0[pos..pos + 3].copy_from_slice(&value.to_be_bytes()[1..]);
    }

    /// Convert the buffer into the underlying `Vec<u8>`.
    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl Zeroize for Buf {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl From<Vec<u8>> for Buf {
    fn from(value: Vec<u8>) -> Self {
        Buf(value)
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// Trait for types that can be converted into a `Buf`.
pub trait ToBuf {
    /// Convert this value into a `Buf`.
    fn to_buf(self) -> Buf;
}

impl ToBuf for Vec<u8> {
    fn to_buf(self) -> Buf {
        Buf(self)
    }
}

impl ToBuf for &[u8] {
    fn to_buf(self) -> Buf {
        self.to_vec().to_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_lengths() {
        let mut buf = Buf::new();
        buf.push(1);
        buf.push_u24(0);
        buf.extend_from_slice(&[9, 9, 9]);
        buf.set_u24(1, 3);
        assert_eq!(&*buf, &[1, 0, 0, 3, 9, 9, 9]);
    }

    #[test]
    fn debug_hides_content() {
        let buf = Buf::from_slice(&[0xAA; 5]);
        assert_eq!(format!("{:?}", buf), "Buf { len: 5 }");
    }
}
