//! Framed-buffer transport.
//!
//! Each logical field becomes one typed [`Frame`]: format string, element
//! size, element count and the raw little-endian payload. The frame list is
//! the in-memory interchange format handed across language boundaries.

use crate::error::{Error, Result};

use super::{SerializerSink, SerializerSource, WireScalar};

/// Format string used for string payloads (byte frames).
const CHAR_FORMAT: &str = "=c";

/// One typed frame of the in-memory interchange format.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Element format in Python buffer-protocol notation (e.g. `"=l"`).
    pub format: &'static str,
    /// Size of one element in bytes.
    pub item_size: usize,
    /// Number of elements in `data`.
    pub n_items: usize,
    /// Raw little-endian payload; `item_size * n_items` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    fn of_scalars<T: WireScalar>(values: &[T]) -> Frame {
        let mut data = Vec::with_capacity(values.len() * T::SIZE);
        for &value in values {
            value.write_le(&mut data);
        }
        Frame { format: T::FORMAT, item_size: T::SIZE, n_items: values.len(), data }
    }

    fn of_bytes(bytes: &[u8]) -> Frame {
        Frame { format: CHAR_FORMAT, item_size: 1, n_items: bytes.len(), data: bytes.to_vec() }
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Collects the logical field sequence into a frame list.
pub(crate) struct FrameSink {
    frames: Vec<Frame>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl SerializerSink for FrameSink {
    fn scalar<T: WireScalar>(&mut self, value: T) -> Result<()> {
        self.frames.push(Frame::of_scalars(&[value]));
        Ok(())
    }

    fn array<T: WireScalar>(&mut self, values: &[T]) -> Result<()> {
        self.frames.push(Frame::of_scalars(values));
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<()> {
        self.frames.push(Frame::of_bytes(value.as_bytes()));
        Ok(())
    }
}

// =============================================================================
// Source
// =============================================================================

/// Replays a frame list as the logical field sequence.
pub(crate) struct FrameSource<'a> {
    frames: &'a [Frame],
    pos: usize,
}

impl<'a> FrameSource<'a> {
    pub fn new(frames: &'a [Frame]) -> Self {
        Self { frames, pos: 0 }
    }

    fn next_frame(&mut self) -> Result<&'a Frame> {
        let frame = self.frames.get(self.pos).ok_or_else(|| {
            Error::Serialization(format!(
                "frame sequence truncated at index {} (have {} frames)",
                self.pos,
                self.frames.len()
            ))
        })?;
        self.pos += 1;
        Ok(frame)
    }

    fn typed_frame<T: WireScalar>(&mut self) -> Result<&'a Frame> {
        let index = self.pos;
        let frame = self.next_frame()?;
        if frame.format != T::FORMAT || frame.item_size != T::SIZE {
            return Err(Error::Serialization(format!(
                "frame {index} has format {:?} (item size {}), expected {:?} (item size {})",
                frame.format,
                frame.item_size,
                T::FORMAT,
                T::SIZE
            )));
        }
        if frame.data.len() != frame.item_size * frame.n_items {
            return Err(Error::Serialization(format!(
                "frame {index} payload has {} bytes, expected {}",
                frame.data.len(),
                frame.item_size * frame.n_items
            )));
        }
        Ok(frame)
    }

    /// Verify that the whole sequence was consumed.
    pub fn finish(&self) -> Result<()> {
        if self.pos != self.frames.len() {
            return Err(Error::Serialization(format!(
                "{} trailing frames after model payload",
                self.frames.len() - self.pos
            )));
        }
        Ok(())
    }
}

impl SerializerSource for FrameSource<'_> {
    fn scalar<T: WireScalar>(&mut self) -> Result<T> {
        let frame = self.typed_frame::<T>()?;
        if frame.n_items != 1 {
            return Err(Error::Serialization(format!(
                "expected a scalar frame, got {} items",
                frame.n_items
            )));
        }
        T::read_le(&frame.data)
    }

    fn array<T: WireScalar>(&mut self) -> Result<Vec<T>> {
        let frame = self.typed_frame::<T>()?;
        frame.data.chunks(T::SIZE).map(T::read_le).collect()
    }

    fn string(&mut self) -> Result<String> {
        let index = self.pos;
        let frame = self.next_frame()?;
        if frame.format != CHAR_FORMAT || frame.item_size != 1 {
            return Err(Error::Serialization(format!(
                "frame {index} has format {:?}, expected a string frame",
                frame.format
            )));
        }
        String::from_utf8(frame.data.clone())
            .map_err(|_| Error::Serialization(format!("frame {index} is not valid UTF-8")))
    }

    fn skip_optional_field(&mut self) -> Result<()> {
        // Self-describing layout: a name frame followed by one payload frame.
        let _name = self.string()?;
        let _payload = self.next_frame()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_array_roundtrip() {
        let mut sink = FrameSink::new();
        sink.scalar(7i32).unwrap();
        sink.array(&[1u64, 2, 3]).unwrap();
        sink.string("hello").unwrap();
        let frames = sink.into_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].format, "=l");
        assert_eq!(frames[1].n_items, 3);
        assert_eq!(frames[2].format, "=c");

        let mut source = FrameSource::new(&frames);
        assert_eq!(source.scalar::<i32>().unwrap(), 7);
        assert_eq!(source.array::<u64>().unwrap(), vec![1, 2, 3]);
        assert_eq!(source.string().unwrap(), "hello");
        source.finish().unwrap();
    }

    #[test]
    fn format_mismatch_is_an_error() {
        let mut sink = FrameSink::new();
        sink.scalar(7i32).unwrap();
        let frames = sink.into_frames();
        let mut source = FrameSource::new(&frames);
        assert!(source.scalar::<f64>().is_err());
    }

    #[test]
    fn truncation_is_an_error() {
        let frames: Vec<Frame> = Vec::new();
        let mut source = FrameSource::new(&frames);
        assert!(source.scalar::<i32>().is_err());
    }

    #[test]
    fn skip_optional_field_consumes_name_and_payload() {
        let mut sink = FrameSink::new();
        sink.string("future_field").unwrap();
        sink.array(&[1.0f64, 2.0]).unwrap();
        sink.scalar(99i32).unwrap();
        let frames = sink.into_frames();

        let mut source = FrameSource::new(&frames);
        source.skip_optional_field().unwrap();
        assert_eq!(source.scalar::<i32>().unwrap(), 99);
        source.finish().unwrap();
    }
}
