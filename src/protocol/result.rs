//! Top-level response dispatch.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use super::error::ProtocolError;
use super::tlv::{PayloadReader, TagValue, END_OF_BUFFER};
use super::types::{
    decode_checksum, encode_checksum, payload_of, CommandError, MountList, PlatformInfo,
    SizeSummary, Stat,
};

/// Outer response tags
pub mod tag {
    pub const STAT: u8 = 1;
    pub const LISTING: u8 = 2;
    pub const SIZE: u8 = 3;
    pub const ERROR: u8 = 4;
    pub const INFO: u8 = 5;
    pub const SUCCESS: u8 = 6;
    pub const EXIT: u8 = 7;
    pub const MOUNTS: u8 = 8;
    pub const CHECKSUM: u8 = 9;
}

/// A decoded agent response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandResult {
    Stat(Stat),
    Listing(Vec<Stat>),
    Size(SizeSummary),
    Error(CommandError),
    Info(PlatformInfo),
    Success,
    Exit,
    Mounts(MountList),
    Checksum(String),
}

/// Variant name of a [`CommandResult`], used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Stat,
    Listing,
    Size,
    Error,
    Info,
    Success,
    Exit,
    Mounts,
    Checksum,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::Stat => "stat",
            ResultKind::Listing => "directory listing",
            ResultKind::Size => "size summary",
            ResultKind::Error => "command error",
            ResultKind::Info => "platform info",
            ResultKind::Success => "success",
            ResultKind::Exit => "exit",
            ResultKind::Mounts => "mount list",
            ResultKind::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

impl CommandResult {
    /// Decode a response record. Tag 0 here means the agent answered with
    /// nothing at all, which is an error.
    pub fn decode(record: TagValue) -> Result<Self, ProtocolError> {
        let TagValue { tag: outer, value } = record;
        let result = match outer {
            END_OF_BUFFER => return Err(ProtocolError::EmptyResponse),
            tag::STAT => CommandResult::Stat(Stat::decode(value)?),
            tag::LISTING => CommandResult::Listing(decode_listing(value)?),
            tag::SIZE => CommandResult::Size(SizeSummary::decode(value)?),
            tag::ERROR => CommandResult::Error(CommandError::decode(value)?),
            tag::INFO => CommandResult::Info(PlatformInfo::decode(value)?),
            tag::SUCCESS => CommandResult::Success,
            tag::EXIT => CommandResult::Exit,
            tag::MOUNTS => CommandResult::Mounts(MountList::decode(value)?),
            tag::CHECKSUM => CommandResult::Checksum(decode_checksum(value)?),
            tag => {
                return Err(ProtocolError::UnknownTag {
                    context: "response",
                    tag,
                })
            }
        };
        Ok(result)
    }

    /// Encode as the record an agent would send.
    pub fn encode(&self) -> TagValue {
        match self {
            CommandResult::Stat(stat) => TagValue::new(tag::STAT, stat.encode()),
            CommandResult::Listing(entries) => {
                let records: Vec<TagValue> = entries
                    .iter()
                    .map(|stat| TagValue::new(tag::STAT, stat.encode()))
                    .collect();
                TagValue::new(tag::LISTING, payload_of(&records))
            }
            CommandResult::Size(size) => TagValue::new(tag::SIZE, size.encode()),
            CommandResult::Error(error) => TagValue::new(tag::ERROR, error.encode()),
            CommandResult::Info(info) => TagValue::new(tag::INFO, info.encode()),
            CommandResult::Success => TagValue::new(tag::SUCCESS, Bytes::new()),
            CommandResult::Exit => TagValue::new(tag::EXIT, Bytes::new()),
            CommandResult::Mounts(mounts) => TagValue::new(tag::MOUNTS, mounts.encode()),
            CommandResult::Checksum(digest) => {
                TagValue::new(tag::CHECKSUM, encode_checksum(digest))
            }
        }
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            CommandResult::Stat(_) => ResultKind::Stat,
            CommandResult::Listing(_) => ResultKind::Listing,
            CommandResult::Size(_) => ResultKind::Size,
            CommandResult::Error(_) => ResultKind::Error,
            CommandResult::Info(_) => ResultKind::Info,
            CommandResult::Success => ResultKind::Success,
            CommandResult::Exit => ResultKind::Exit,
            CommandResult::Mounts(_) => ResultKind::Mounts,
            CommandResult::Checksum(_) => ResultKind::Checksum,
        }
    }
}

/// A listing is a run of stat records (tag 1) packed in the payload. Only
/// running out of bytes ends it; an explicit tag-0 record is rejected.
fn decode_listing(payload: Bytes) -> Result<Vec<Stat>, ProtocolError> {
    let mut entries = Vec::new();
    let mut reader = PayloadReader::new(payload);
    while !reader.is_empty() {
        let record = reader.next_record()?;
        match record.tag {
            tag::STAT => entries.push(Stat::decode(record.value)?),
            tag => {
                return Err(ProtocolError::UnknownTag {
                    context: "directory listing",
                    tag,
                })
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fields::zstr_record;

    fn named(name: &str) -> Stat {
        Stat {
            name: name.to_string(),
            ..Stat::default()
        }
    }

    #[test]
    fn test_listing_keeps_order() {
        let record = CommandResult::Listing(vec![named("a"), named("b")]).encode();
        match CommandResult::decode(record).unwrap() {
            CommandResult::Listing(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, ["a", "b"]);
            }
            other => panic!("Expected listing, got {}", other.kind()),
        }
    }

    #[test]
    fn test_listing_rejects_non_stat_records() {
        let payload = payload_of(&[zstr_record(3, "x")]);
        let err = CommandResult::decode(TagValue::new(tag::LISTING, payload)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnknownTag { context: "directory listing", tag: 3 }
        ));
    }

    #[test]
    fn test_listing_rejects_inner_end_marker() {
        let payload = payload_of(&[
            TagValue::new(tag::STAT, named("a").encode()),
            TagValue::end(),
            TagValue::new(tag::STAT, named("b").encode()),
        ]);
        let err = CommandResult::decode(TagValue::new(tag::LISTING, payload)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnknownTag { context: "directory listing", tag: 0 }
        ));
    }

    #[test]
    fn test_empty_listing() {
        let result = CommandResult::decode(TagValue::new(tag::LISTING, Bytes::new())).unwrap();
        assert_eq!(result, CommandResult::Listing(Vec::new()));
    }

    #[test]
    fn test_empty_response_is_error() {
        let err = CommandResult::decode(TagValue::end()).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyResponse));
        assert!(!err.is_framing());
    }

    #[test]
    fn test_unknown_outer_tag() {
        let err = CommandResult::decode(TagValue::new(10, Bytes::new())).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag { context: "response", tag: 10 }));
    }

    #[test]
    fn test_markers() {
        let success = CommandResult::decode(TagValue::new(tag::SUCCESS, Bytes::new())).unwrap();
        assert_eq!(success, CommandResult::Success);
        let exit = CommandResult::decode(TagValue::new(tag::EXIT, Bytes::new())).unwrap();
        assert_eq!(exit.kind(), ResultKind::Exit);
    }
}
