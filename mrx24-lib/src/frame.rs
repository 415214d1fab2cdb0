//! Transmit and receive frame buffers with owned cursors.
//!
//! All multi-byte values travel big-endian. A frame can run in word-aligned
//! mode, where every 8-bit field is widened to 16 bits on both encode and
//! decode; this is a property of the attached transport (some links only move
//! 16-bit words), never a per-call choice.

use crate::error::{RadarError, Result};

/// Append-only buffer the next command frame is encoded into.
///
/// Cleared (cursor to zero, allocation kept) at the start of each exchange.
#[derive(Debug)]
pub struct TxFrame {
    buf: Vec<u8>,
    word_aligned: bool,
}

impl TxFrame {
    pub fn new(word_aligned: bool) -> Self {
        TxFrame {
            buf: Vec::with_capacity(4096),
            word_aligned,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        if self.word_aligned {
            self.put_u16(v as u16);
        } else {
            self.buf.push(v);
        }
    }

    pub fn put_i8(&mut self, v: i8) {
        if self.word_aligned {
            self.put_i16(v as i16);
        } else {
            self.buf.push(v as u8);
        }
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
}

/// Receive buffer filled by the transport and drained by decoders.
///
/// Invariant: `read <= write <= buf.len()`. Reading past the write position
/// is a length-arithmetic bug and fails with [`RadarError::RxUnderrun`]
/// instead of returning zeros.
#[derive(Debug)]
pub struct RxFrame {
    buf: Vec<u8>,
    write: usize,
    read: usize,
    word_aligned: bool,
}

impl RxFrame {
    pub fn new(word_aligned: bool) -> Self {
        RxFrame {
            buf: Vec::new(),
            write: 0,
            read: 0,
            word_aligned,
        }
    }

    pub fn clear(&mut self) {
        self.write = 0;
        self.read = 0;
    }

    pub fn write_pos(&self) -> usize {
        self.write
    }

    pub fn read_pos(&self) -> usize {
        self.read
    }

    /// Bytes received but not yet decoded.
    pub fn unread(&self) -> usize {
        self.write - self.read
    }

    /// Everything the transport delivered this exchange, decoded or not.
    pub fn received(&self) -> &[u8] {
        &self.buf[..self.write]
    }

    /// Writable scratch region of `n` bytes at the write position. The
    /// caller reports how much actually landed via [`RxFrame::commit`].
    pub fn space(&mut self, n: usize) -> &mut [u8] {
        if self.buf.len() < self.write + n {
            self.buf.resize(self.write + n, 0);
        }
        &mut self.buf[self.write..self.write + n]
    }

    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.write + n <= self.buf.len());
        self.write += n;
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.read + n > self.write {
            return Err(RadarError::RxUnderrun {
                needed: n,
                available: self.write - self.read,
            });
        }
        let start = self.read;
        self.read += n;
        Ok(&self.buf[start..start + n])
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        if self.word_aligned {
            return Ok(self.get_u16()? as u8);
        }
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        if self.word_aligned {
            return Ok(self.get_i16()? as i8);
        }
        Ok(self.take(1)?[0] as i8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
