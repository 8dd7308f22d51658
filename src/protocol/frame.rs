use crate::common::{ProtocolError, ProxyResult};
use crate::protocol::varint::decode_varint;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// Buffers a byte stream and hands out whole VarInt-length-prefixed frames.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameReader {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_len,
        }
    }

    /// Start from bytes that were already read off the stream.
    pub fn with_buffered(initial: &[u8], max_frame_len: usize) -> Self {
        let mut reader = Self::new(max_frame_len);
        reader.buf.extend_from_slice(initial);
        reader
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_buffered(self) -> BytesMut {
        self.buf
    }

    /// Size of the complete frame at the head of the buffer, prefix
    /// included, or `None` while more bytes are needed.
    pub fn complete_frame_len(&self) -> Result<Option<usize>, ProtocolError> {
        let (body_len, prefix_len) = match decode_varint(&self.buf, 0) {
            Ok(decoded) => decoded,
            Err(ProtocolError::MalformedVarInt) => return Ok(None),
            Err(e) => return Err(e),
        };
        let body_len = body_len as usize;
        if body_len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len: body_len,
                max: self.max_frame_len,
            });
        }
        let total = prefix_len + body_len;
        Ok((self.buf.len() >= total).then_some(total))
    }

    /// Read once from `reader` into the buffer. Returns 0 on EOF.
    pub async fn fill<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.buf.capacity() - self.buf.len() < READ_CHUNK {
            self.buf.reserve(READ_CHUNK);
        }
        reader.read_buf(&mut self.buf).await
    }

    /// Next whole frame, or `None` if the stream ended cleanly between frames.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> ProxyResult<Option<Bytes>> {
        loop {
            if let Some(len) = self.complete_frame_len()? {
                return Ok(Some(self.buf.split_to(len).freeze()));
            }
            if self.fill(reader).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed in the middle of a frame",
                )
                .into());
            }
        }
    }
}
