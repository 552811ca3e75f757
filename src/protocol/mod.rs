//! Wire protocol of the ascmd agent
//!
//! Text commands go out, binary TLV records come back:
//! - request: `as_<command> "<arg>" "<arg>"\n`
//! - response: one record, `tag:u8 | length:u32be | value`
//!
//! Response tags:
//! - 1: stat of a single entry
//! - 2: directory listing (a run of tag-1 records)
//! - 3: size summary
//! - 4: command error
//! - 5: platform info
//! - 6: success
//! - 7: exit
//! - 8: mount list
//! - 9: checksum

mod error;
mod fields;
mod result;
mod tlv;
mod types;

pub use error::ProtocolError;
pub use fields::{decode_u32, decode_u64, decode_zstr, u32_record, u64_record, zstr_record};
pub use result::{tag, CommandResult, ResultKind};
pub use tlv::{
    read_record, write_command, PayloadReader, TagValue, COMMAND_PREFIX, END_OF_BUFFER,
    HEADER_SIZE,
};
pub use types::{
    decode_checksum, encode_checksum, payload_of, CommandError, Mount, MountList, PlatformInfo,
    SizeSummary, Stat,
};
