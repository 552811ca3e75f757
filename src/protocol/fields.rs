//! Scalar field codecs: zero-terminated strings and big-endian integers.

use bytes::{BufMut, BytesMut};

use super::error::ProtocolError;
use super::tlv::TagValue;

/// Decode a zero-terminated UTF-8 string.
pub fn decode_zstr(field: &'static str, value: &[u8]) -> Result<String, ProtocolError> {
    let Some((&0, text)) = value.split_last() else {
        return Err(ProtocolError::MissingTerminator { field });
    };
    std::str::from_utf8(text)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8 { field })
}

pub fn decode_u32(field: &'static str, value: &[u8]) -> Result<u32, ProtocolError> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| ProtocolError::WrongWidth {
        field,
        expected: 4,
        actual: value.len(),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn decode_u64(field: &'static str, value: &[u8]) -> Result<u64, ProtocolError> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| ProtocolError::WrongWidth {
        field,
        expected: 8,
        actual: value.len(),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Record holding a zero-terminated string.
pub fn zstr_record(tag: u8, text: &str) -> TagValue {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.put_u8(0);
    TagValue::new(tag, buf.freeze())
}

pub fn u32_record(tag: u8, value: u32) -> TagValue {
    TagValue::new(tag, value.to_be_bytes().to_vec())
}

pub fn u64_record(tag: u8, value: u64) -> TagValue {
    TagValue::new(tag, value.to_be_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstr_roundtrip() {
        for text in ["", "hello", "répertoire/ファイル"] {
            let record = zstr_record(1, text);
            assert_eq!(decode_zstr("name", &record.value).unwrap(), text);
        }
    }

    #[test]
    fn test_zstr_requires_terminator() {
        let err = decode_zstr("name", b"abc").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingTerminator { field: "name" }));

        let err = decode_zstr("name", b"").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingTerminator { .. }));
    }

    #[test]
    fn test_zstr_rejects_invalid_utf8() {
        let err = decode_zstr("name", &[0x66, 0xff, 0xfe, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8 { field: "name" }));
    }

    #[test]
    fn test_integer_roundtrip() {
        let record = u32_record(3, 0o100644);
        assert_eq!(decode_u32("mode", &record.value).unwrap(), 0o100644);

        let record = u64_record(2, u64::MAX - 7);
        assert_eq!(decode_u64("size", &record.value).unwrap(), u64::MAX - 7);
    }

    #[test]
    fn test_integer_wrong_width() {
        let err = decode_u32("mode", &[0, 0, 1]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::WrongWidth { field: "mode", expected: 4, actual: 3 }
        ));

        let err = decode_u64("size", &[0; 4]).unwrap_err();
        assert!(matches!(err, ProtocolError::WrongWidth { expected: 8, actual: 4, .. }));
    }
}
