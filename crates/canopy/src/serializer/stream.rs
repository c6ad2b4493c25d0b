//! Byte-stream transport.
//!
//! The logical field sequence is packed onto an in-order byte stream:
//! scalars as raw little-endian bytes, arrays and strings prefixed with a
//! `u64` element count. Reads and writes either succeed fully or fail with
//! a serialization error; a partially read model is discarded by the caller.

use std::io::{Read, Write};

use crate::error::{Error, Result};

use super::{SerializerSink, SerializerSource, WireScalar};

// =============================================================================
// Sink
// =============================================================================

/// Writes the logical field sequence onto a byte stream.
pub(crate) struct StreamSink<'a, W: Write> {
    writer: &'a mut W,
    scratch: Vec<u8>,
}

impl<'a, W: Write> StreamSink<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer, scratch: Vec::new() }
    }

    fn flush_scratch(&mut self) -> Result<()> {
        self.writer.write_all(&self.scratch)?;
        self.scratch.clear();
        Ok(())
    }
}

impl<W: Write> SerializerSink for StreamSink<'_, W> {
    fn scalar<T: WireScalar>(&mut self, value: T) -> Result<()> {
        value.write_le(&mut self.scratch);
        self.flush_scratch()
    }

    fn array<T: WireScalar>(&mut self, values: &[T]) -> Result<()> {
        (values.len() as u64).write_le(&mut self.scratch);
        for &value in values {
            value.write_le(&mut self.scratch);
        }
        self.flush_scratch()
    }

    fn string(&mut self, value: &str) -> Result<()> {
        (value.len() as u64).write_le(&mut self.scratch);
        self.flush_scratch()?;
        self.writer.write_all(value.as_bytes())?;
        Ok(())
    }
}

// =============================================================================
// Source
// =============================================================================

/// Replays a byte stream as the logical field sequence.
pub(crate) struct StreamSource<'a, R: Read> {
    reader: &'a mut R,
}

impl<'a, R: Read> StreamSource<'a, R> {
    pub fn new(reader: &'a mut R) -> Self {
        Self { reader }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Serialization(format!(
                    "stream truncated: expected {} more bytes",
                    buf.len()
                ))
            } else {
                Error::from(e)
            }
        })
    }

    fn read_len(&mut self) -> Result<usize> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        let len = u64::read_le(&buf)?;
        usize::try_from(len)
            .map_err(|_| Error::Serialization(format!("length {len} exceeds address space")))
    }
}

impl<R: Read> SerializerSource for StreamSource<'_, R> {
    fn scalar<T: WireScalar>(&mut self) -> Result<T> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..T::SIZE];
        self.read_exact(buf)?;
        T::read_le(buf)
    }

    fn array<T: WireScalar>(&mut self) -> Result<Vec<T>> {
        let n_items = self.read_len()?;
        let mut bytes = vec![0u8; n_items * T::SIZE];
        self.read_exact(&mut bytes)?;
        bytes.chunks(T::SIZE).map(T::read_le).collect()
    }

    fn string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|_| Error::Serialization("string payload is not valid UTF-8".into()))
    }

    fn skip_optional_field(&mut self) -> Result<()> {
        // Self-describing layout: a name string, then a byte-length-prefixed
        // payload block.
        let _name = self.string()?;
        let byte_len = self.read_len()?;
        let mut remaining = byte_len;
        let mut chunk = [0u8; 4096];
        while remaining > 0 {
            let take = remaining.min(chunk.len());
            self.read_exact(&mut chunk[..take])?;
            remaining -= take;
        }
        Ok(())
    }
}
