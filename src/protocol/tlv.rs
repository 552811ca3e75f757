//! TLV record codec
//!
//! Responses arrive as a single record, whose payload may itself be a
//! sequence of records using the same framing:
//! ```text
//! +--------+--------+--------+--------+--------+-- ... --+
//! | Tag    | Length (4 bytes, big-endian)      | Value   |
//! +--------+--------+--------+--------+--------+-- ... --+
//! ```
//! Requests are not records: they are text lines `as_<command>\n`.

use std::io::{self, ErrorKind};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::error::ProtocolError;

/// Tag size in bytes
pub const TAG_SIZE: usize = 1;

/// Length field size in bytes
pub const LENGTH_SIZE: usize = 4;

/// Header size: 1 byte tag + 4 bytes length
pub const HEADER_SIZE: usize = TAG_SIZE + LENGTH_SIZE;

/// Tag returned when the input is exhausted at a record boundary
pub const END_OF_BUFFER: u8 = 0;

/// Prefix of every command line sent to the agent
pub const COMMAND_PREFIX: &str = "as_";

/// One Tag-Length-Value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue {
    pub tag: u8,
    pub value: Bytes,
}

impl TagValue {
    pub fn new(tag: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// The end-of-buffer marker: tag 0 with an empty value.
    pub fn end() -> Self {
        Self {
            tag: END_OF_BUFFER,
            value: Bytes::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.tag == END_OF_BUFFER
    }

    /// Append the framed record to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE + self.value.len());
        buf.put_u8(self.tag);
        buf.put_u32(self.value.len() as u32);
        buf.extend_from_slice(&self.value);
    }

    /// Encode the framed record.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

/// Read one record from a stream.
///
/// A stream that is already exhausted yields [`TagValue::end`]. Running out
/// of bytes after the tag has been read is a framing error.
pub async fn read_record<R>(reader: &mut R) -> Result<TagValue, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; TAG_SIZE];
    let read = loop {
        match reader.read(&mut tag).await {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::truncated("tag", e)),
        }
    };
    if read == 0 {
        trace!("[tlv] end of stream");
        return Ok(TagValue::end());
    }

    let length = reader
        .read_u32()
        .await
        .map_err(|e| ProtocolError::truncated("length", e))? as usize;

    let mut value = vec![0u8; length];
    reader
        .read_exact(&mut value)
        .await
        .map_err(|e| ProtocolError::truncated("value", e))?;

    trace!("[tlv] read record tag={} len={}", tag[0], length);
    Ok(TagValue::new(tag[0], value))
}

/// Write a command line (`as_<text>\n`) and flush it.
pub async fn write_command<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = format!("{}{}\n", COMMAND_PREFIX, text);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Reads records out of an in-memory payload.
#[derive(Debug)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    pub fn new(payload: Bytes) -> Self {
        Self { buf: payload }
    }

    /// True once every byte of the payload has been consumed.
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Next record, or [`TagValue::end`] once the payload is exhausted.
    pub fn next_record(&mut self) -> Result<TagValue, ProtocolError> {
        if !self.buf.has_remaining() {
            return Ok(TagValue::end());
        }
        if self.buf.remaining() < HEADER_SIZE {
            return Err(ProtocolError::truncated("length", eof()));
        }

        let tag = self.buf.get_u8();
        let length = self.buf.get_u32() as usize;
        if self.buf.remaining() < length {
            return Err(ProtocolError::truncated("value", eof()));
        }

        Ok(TagValue::new(tag, self.buf.split_to(length)))
    }
}

fn eof() -> io::Error {
    io::Error::new(ErrorKind::UnexpectedEof, "payload ended inside a record")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_record_from_stream() {
        let record = TagValue::new(6, Bytes::from_static(b"abc"));
        let encoded = record.encode();
        let mut stream: &[u8] = &encoded;

        let decoded = read_record(&mut stream).await.unwrap();
        assert_eq!(decoded, record);

        // Stream now exhausted at a record boundary
        let end = read_record(&mut stream).await.unwrap();
        assert!(end.is_end());
        assert!(end.value.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_length_is_framing_error() {
        let mut stream: &[u8] = &[5, 0, 0];
        let err = read_record(&mut stream).await.unwrap_err();
        assert!(err.is_framing());
        assert!(matches!(err, ProtocolError::Truncated { what: "length", .. }));
    }

    #[tokio::test]
    async fn test_truncated_value_is_framing_error() {
        let mut stream: &[u8] = &[5, 0, 0, 0, 4, b'a', b'b'];
        let err = read_record(&mut stream).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { what: "value", .. }));
    }

    #[tokio::test]
    async fn test_write_command_line() {
        let mut out: Vec<u8> = Vec::new();
        write_command(&mut out, "ls \"/tmp\"").await.unwrap();
        assert_eq!(out, b"as_ls \"/tmp\"\n");
    }

    #[test]
    fn test_payload_reader_sequence() {
        let mut buf = BytesMut::new();
        TagValue::new(1, Bytes::from_static(b"x\0")).encode_into(&mut buf);
        TagValue::new(2, Bytes::new()).encode_into(&mut buf);

        let mut reader = PayloadReader::new(buf.freeze());
        assert_eq!(reader.next_record().unwrap().tag, 1);
        let second = reader.next_record().unwrap();
        assert_eq!(second.tag, 2);
        assert!(second.value.is_empty());
        assert!(reader.is_empty());
        assert!(reader.next_record().unwrap().is_end());
        // Stays at end
        assert!(reader.next_record().unwrap().is_end());
    }

    #[test]
    fn test_payload_reader_short_header() {
        let mut reader = PayloadReader::new(Bytes::from_static(&[1, 0]));
        assert!(reader.next_record().unwrap_err().is_framing());
    }
}
