//! Chunked sealing of entry payloads.
//!
//! A sealed payload is a sequence of frames:
//!
//! ```text
//! | header u32 LE (bit 31 = final, bits 0..30 = len) | nonce (12) | ciphertext | tag (16) |
//! ```
//!
//! Exactly one frame, the last, carries the final flag. A stream that ends
//! without it was truncated.

use crate::error::ArchiveError;
use crate::key::{chunk_aad, ArchiveKey, ChunkCipher, NONCE_SIZE, TAG_SIZE};
use std::io::{self, Read, Write};

/// Plaintext bytes per sealed chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

const FINAL_FLAG: u32 = 1 << 31;
const MAX_FRAME: usize = CHUNK_SIZE + NONCE_SIZE + TAG_SIZE;

fn to_io(err: ArchiveError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

/// Writer that seals everything written to it into chunk frames.
pub(crate) struct SealingWriter<W: Write> {
    inner: W,
    cipher: ChunkCipher,
    entry: String,
    index: u64,
    buffer: Vec<u8>,
}

impl<W: Write> SealingWriter<W> {
    pub(crate) fn new(inner: W, key: &ArchiveKey, entry: &str) -> Self {
        Self {
            inner,
            cipher: ChunkCipher::new(key),
            entry: entry.to_string(),
            index: 0,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn emit(&mut self, plaintext: &[u8], last: bool) -> io::Result<()> {
        let aad = chunk_aad(&self.entry, self.index, last);
        let sealed = self.cipher.seal(plaintext, &aad).map_err(to_io)?;
        let mut header = sealed.len() as u32;
        if last {
            header |= FINAL_FLAG;
        }
        self.inner.write_all(&header.to_le_bytes())?;
        self.inner.write_all(&sealed)?;
        self.index += 1;
        Ok(())
    }

    /// Seals the remaining buffered bytes as the final chunk.
    pub(crate) fn finish(mut self) -> io::Result<W> {
        let rest = std::mem::take(&mut self.buffer);
        self.emit(&rest, true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for SealingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        // Keep at least one byte back so the final frame is never empty
        // unless the whole payload is.
        while self.buffer.len() > CHUNK_SIZE {
            let rest = self.buffer.split_off(CHUNK_SIZE);
            let chunk = std::mem::replace(&mut self.buffer, rest);
            self.emit(&chunk, false)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that opens chunk frames produced by [`SealingWriter`].
pub(crate) struct OpeningReader<R: Read> {
    inner: R,
    cipher: ChunkCipher,
    entry: String,
    index: u64,
    plain: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> OpeningReader<R> {
    pub(crate) fn new(inner: R, key: &ArchiveKey, entry: &str) -> Self {
        Self {
            inner,
            cipher: ChunkCipher::new(key),
            entry: entry.to_string(),
            index: 0,
            plain: Vec::new(),
            pos: 0,
            finished: false,
        }
    }

    fn next_frame(&mut self) -> io::Result<()> {
        let mut header = [0u8; 4];
        if let Err(e) = self.inner.read_exact(&mut header) {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("entry {} truncated before final chunk", self.entry),
                ));
            }
            return Err(e);
        }
        let header = u32::from_le_bytes(header);
        let last = header & FINAL_FLAG != 0;
        let len = (header & !FINAL_FLAG) as usize;
        if len > MAX_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk of {len} bytes exceeds frame limit"),
            ));
        }

        let mut sealed = vec![0u8; len];
        self.inner.read_exact(&mut sealed)?;
        let aad = chunk_aad(&self.entry, self.index, last);
        self.plain = self.cipher.open(&sealed, &aad).map_err(to_io)?;
        self.pos = 0;
        self.index += 1;
        self.finished = last;
        Ok(())
    }
}

impl<R: Read> Read for OpeningReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.plain.len() {
            if self.finished {
                return Ok(0);
            }
            self.next_frame()?;
        }
        let n = buf.len().min(self.plain.len() - self.pos);
        buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
