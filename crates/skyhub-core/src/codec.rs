//! Packet buffer and numeric encodings.
//!
//! Every packet is read and written through a [`PacketBuf`]: an owned
//! byte buffer with a fixed capacity, a count of bytes in use and a
//! cursor. Two numeric representations exist on the wire, selected per
//! connection:
//!
//! - [`Encoding::Xdr`] — the legacy 4-byte-aligned external
//!   representation. 8- and 16-bit integers are widened to 4 bytes
//!   before encoding; floats are carried bit-for-bit in the
//!   same-width integer. Everything is big-endian.
//! - [`Encoding::Net`] — plain network-byte-order integers at their
//!   natural width.
//!
//! 64-bit values occupy 8 bytes under both encodings. There is no
//! struct casting anywhere on the packet path; every field goes
//! through an explicit per-width pack/unpack, so the layout never
//! depends on the platform.

/// Numeric wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Legacy external representation: sub-32-bit values widened to 4
    /// bytes, big-endian.
    Xdr,
    /// Network byte order at natural width.
    Net,
}

/// Errors from encoding or decoding through a [`PacketBuf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer has no storage at all.
    #[error("packet buffer has no storage")]
    NoBuffer,

    /// Not enough room left to encode the value.
    #[error("no room in packet buffer: need {needed}, have {available}")]
    NoSpace { needed: usize, available: usize },

    /// Not enough data left to decode the value.
    #[error("short read from packet buffer: need {needed}, have {available}")]
    ShortRead { needed: usize, available: usize },
}

/// A fixed-capacity packet buffer with a read/write cursor.
#[derive(Debug, Clone)]
pub struct PacketBuf {
    buf: Vec<u8>,
    used: usize,
    cursor: usize,
    encoding: Encoding,
}

impl PacketBuf {
    /// An empty buffer with `capacity` bytes of storage.
    pub fn new(capacity: usize, encoding: Encoding) -> Self {
        Self {
            buf: vec![0u8; capacity],
            used: 0,
            cursor: 0,
            encoding,
        }
    }

    /// A buffer holding a copy of received bytes, cursor at the start.
    pub fn from_bytes(data: &[u8], encoding: Encoding) -> Self {
        Self {
            buf: data.to_vec(),
            used: data.len(),
            cursor: 0,
            encoding,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes left between the cursor and the used length.
    pub fn remaining_data(&self) -> usize {
        self.used.saturating_sub(self.cursor)
    }

    /// Bytes of storage left past the cursor.
    pub fn available(&self) -> usize {
        self.buf.len().saturating_sub(self.cursor)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Rewind the cursor to the start, keeping the contents.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Drop all contents.
    pub fn clear(&mut self) {
        self.used = 0;
        self.cursor = 0;
    }

    /// The used portion of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    // raw cursor I/O

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            return Err(CodecError::NoBuffer);
        }
        if self.available() < bytes.len() {
            return Err(CodecError::NoSpace {
                needed: bytes.len(),
                available: self.available(),
            });
        }
        self.buf[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        if self.cursor > self.used {
            self.used = self.cursor;
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&[u8], CodecError> {
        if self.buf.is_empty() {
            return Err(CodecError::NoBuffer);
        }
        if self.remaining_data() < len {
            return Err(CodecError::ShortRead {
                needed: len,
                available: self.remaining_data(),
            });
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buf[start..start + len])
    }

    // unsigned integers

    pub fn write_u8(&mut self, v: u8) -> Result<(), CodecError> {
        match self.encoding {
            Encoding::Xdr => self.put(&(v as u32).to_be_bytes()),
            Encoding::Net => self.put(&[v]),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        match self.encoding {
            Encoding::Xdr => Ok(self.read_u32()? as u8),
            Encoding::Net => Ok(self.take(1)?[0]),
        }
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), CodecError> {
        match self.encoding {
            Encoding::Xdr => self.put(&(v as u32).to_be_bytes()),
            Encoding::Net => self.put(&v.to_be_bytes()),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        match self.encoding {
            Encoding::Xdr => Ok(self.read_u32()? as u16),
            Encoding::Net => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]))
            }
        }
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.put(&v.to_be_bytes())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), CodecError> {
        self.put(&v.to_be_bytes())
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    // signed integers

    pub fn write_i8(&mut self, v: i8) -> Result<(), CodecError> {
        match self.encoding {
            Encoding::Xdr => self.put(&(v as i32).to_be_bytes()),
            Encoding::Net => self.put(&v.to_be_bytes()),
        }
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        match self.encoding {
            Encoding::Xdr => Ok(self.read_i32()? as i8),
            Encoding::Net => Ok(self.take(1)?[0] as i8),
        }
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        match self.encoding {
            Encoding::Xdr => self.put(&(v as i32).to_be_bytes()),
            Encoding::Net => self.put(&v.to_be_bytes()),
        }
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        match self.encoding {
            Encoding::Xdr => Ok(self.read_i32()? as i16),
            Encoding::Net => {
                let b = self.take(2)?;
                Ok(i16::from_be_bytes([b[0], b[1]]))
            }
        }
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        self.put(&v.to_be_bytes())
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.put(&v.to_be_bytes())
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.read_u64()? as i64)
    }

    // floats, carried bit-for-bit in the same-width integer

    pub fn write_f32(&mut self, v: f32) -> Result<(), CodecError> {
        self.write_u32(v.to_bits())
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), CodecError> {
        self.write_u64(v.to_bits())
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    // raw and opaque blocks

    /// Write raw bytes at the cursor, no length prefix.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.put(data)
    }

    /// Read `len` raw bytes from the cursor.
    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Write a variable-length block: 4-byte length prefix, the bytes,
    /// then zero padding to 4-byte alignment under [`Encoding::Xdr`].
    pub fn write_opaque(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let pad = match self.encoding {
            Encoding::Xdr => (4 - data.len() % 4) % 4,
            Encoding::Net => 0,
        };
        let needed = 4 + data.len() + pad;
        if self.available() < needed {
            return Err(CodecError::NoSpace {
                needed,
                available: self.available(),
            });
        }
        self.write_u32(data.len() as u32)?;
        self.put(data)?;
        for _ in 0..pad {
            self.put(&[0])?;
        }
        Ok(())
    }

    /// Read a block written by [`write_opaque`](Self::write_opaque),
    /// skipping the alignment padding.
    pub fn read_opaque(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        let pad = match self.encoding {
            Encoding::Xdr => (4 - len % 4) % 4,
            Encoding::Net => 0,
        };
        if self.remaining_data() < len + pad {
            return Err(CodecError::ShortRead {
                needed: len + pad,
                available: self.remaining_data(),
            });
        }
        let data = self.take(len)?.to_vec();
        self.take(pad)?;
        Ok(data)
    }

    /// Write a string as a fixed-width field, NUL padded. Longer
    /// strings are truncated to `width`.
    pub fn write_fixed_str(&mut self, s: &str, width: usize) -> Result<(), CodecError> {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        if self.available() < width {
            return Err(CodecError::NoSpace {
                needed: width,
                available: self.available(),
            });
        }
        self.put(&bytes[..n])?;
        for _ in n..width {
            self.put(&[0])?;
        }
        Ok(())
    }

    /// Read a fixed-width string field, trimming at the first NUL.
    pub fn read_fixed_str(&mut self, width: usize) -> Result<String, CodecError> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}
