//! Typed response payloads and their decoders.
//!
//! Each payload is a sequence of inner records ended by tag 0 or by running
//! out of bytes. The encoders mirror the decoders and are what fake agents
//! use to answer commands.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ProtocolError;
use super::fields::{decode_u32, decode_u64, decode_zstr, u32_record, u64_record, zstr_record};
use super::tlv::{PayloadReader, TagValue, END_OF_BUFFER};

/// File type bits of a POSIX mode
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Platform information, sent as the handshake banner and by `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub platform: String,
    pub version: String,
    pub lang: String,
    pub territory: String,
    pub codeset: String,
    pub lc_ctype: String,
    pub lc_numeric: String,
    pub lc_time: String,
    pub lc_all: String,
    /// Device capabilities, in the order received
    pub devices: Vec<String>,
    pub browse_caps: String,
    pub protocol: u64,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            platform: String::new(),
            version: String::new(),
            lang: String::new(),
            territory: String::new(),
            codeset: String::new(),
            lc_ctype: String::new(),
            lc_numeric: String::new(),
            lc_time: String::new(),
            lc_all: String::new(),
            devices: Vec::new(),
            browse_caps: String::new(),
            // Agents that omit the field speak protocol 1
            protocol: 1,
        }
    }
}

impl PlatformInfo {
    pub fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut info = PlatformInfo::default();
        let mut reader = PayloadReader::new(payload);
        loop {
            let record = reader.next_record()?;
            let v = &record.value;
            match record.tag {
                END_OF_BUFFER => return Ok(info),
                1 => info.platform = decode_zstr("platform", v)?,
                2 => info.version = decode_zstr("version", v)?,
                3 => info.lang = decode_zstr("lang", v)?,
                4 => info.territory = decode_zstr("territory", v)?,
                5 => info.codeset = decode_zstr("codeset", v)?,
                6 => info.lc_ctype = decode_zstr("lc_ctype", v)?,
                7 => info.lc_numeric = decode_zstr("lc_numeric", v)?,
                8 => info.lc_time = decode_zstr("lc_time", v)?,
                9 => info.lc_all = decode_zstr("lc_all", v)?,
                10 => info.devices.push(decode_zstr("dev", v)?),
                11 => info.browse_caps = decode_zstr("browse_caps", v)?,
                12 => info.protocol = decode_u64("protocol", v)?,
                tag => {
                    return Err(ProtocolError::UnknownTag {
                        context: "platform info",
                        tag,
                    })
                }
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        let strings = [
            (1, &self.platform),
            (2, &self.version),
            (3, &self.lang),
            (4, &self.territory),
            (5, &self.codeset),
            (6, &self.lc_ctype),
            (7, &self.lc_numeric),
            (8, &self.lc_time),
            (9, &self.lc_all),
        ];
        for (tag, text) in strings {
            zstr_record(tag, text).encode_into(&mut buf);
        }
        for dev in &self.devices {
            zstr_record(10, dev).encode_into(&mut buf);
        }
        zstr_record(11, &self.browse_caps).encode_into(&mut buf);
        u64_record(12, self.protocol).encode_into(&mut buf);
        buf.freeze()
    }
}

/// Metadata of one file or directory.
///
/// When the agent could not stat the entry, `error_code` and
/// `error_message` are set and the other fields may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mode_text: String,
    pub uid: u32,
    pub owner: String,
    pub gid: u32,
    pub group: String,
    pub ctime: u64,
    pub ctime_text: String,
    pub mtime: u64,
    pub mtime_text: String,
    pub atime: u64,
    pub atime_text: String,
    pub symlink: Option<String>,
    pub error_code: u32,
    pub error_message: String,
}

impl Stat {
    pub fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut stat = Stat::default();
        let mut reader = PayloadReader::new(payload);
        loop {
            let record = reader.next_record()?;
            let v = &record.value;
            match record.tag {
                END_OF_BUFFER => return Ok(stat),
                1 => stat.name = decode_zstr("name", v)?,
                2 => stat.size = decode_u64("size", v)?,
                3 => stat.mode = decode_u32("mode", v)?,
                4 => stat.mode_text = decode_zstr("zmode", v)?,
                5 => stat.uid = decode_u32("uid", v)?,
                6 => stat.owner = decode_zstr("zuid", v)?,
                7 => stat.gid = decode_u32("gid", v)?,
                8 => stat.group = decode_zstr("zgid", v)?,
                9 => stat.ctime = decode_u64("ctime", v)?,
                10 => stat.ctime_text = decode_zstr("zctime", v)?,
                11 => stat.mtime = decode_u64("mtime", v)?,
                12 => stat.mtime_text = decode_zstr("zmtime", v)?,
                13 => stat.atime = decode_u64("atime", v)?,
                14 => stat.atime_text = decode_zstr("zatime", v)?,
                15 => stat.symlink = Some(decode_zstr("symlink", v)?),
                16 => stat.error_code = decode_u32("errno", v)?,
                17 => stat.error_message = decode_zstr("errstr", v)?,
                tag => return Err(ProtocolError::UnknownTag { context: "stat", tag }),
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        zstr_record(1, &self.name).encode_into(&mut buf);
        u64_record(2, self.size).encode_into(&mut buf);
        u32_record(3, self.mode).encode_into(&mut buf);
        zstr_record(4, &self.mode_text).encode_into(&mut buf);
        u32_record(5, self.uid).encode_into(&mut buf);
        zstr_record(6, &self.owner).encode_into(&mut buf);
        u32_record(7, self.gid).encode_into(&mut buf);
        zstr_record(8, &self.group).encode_into(&mut buf);
        u64_record(9, self.ctime).encode_into(&mut buf);
        zstr_record(10, &self.ctime_text).encode_into(&mut buf);
        u64_record(11, self.mtime).encode_into(&mut buf);
        zstr_record(12, &self.mtime_text).encode_into(&mut buf);
        u64_record(13, self.atime).encode_into(&mut buf);
        zstr_record(14, &self.atime_text).encode_into(&mut buf);
        if let Some(target) = &self.symlink {
            zstr_record(15, target).encode_into(&mut buf);
        }
        if self.has_error() {
            u32_record(16, self.error_code).encode_into(&mut buf);
            zstr_record(17, &self.error_message).encode_into(&mut buf);
        }
        buf.freeze()
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Whether the agent failed to stat this entry.
    pub fn has_error(&self) -> bool {
        self.error_code != 0 || !self.error_message.is_empty()
    }

    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.ctime)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.mtime)
    }

    pub fn accessed_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.atime)
    }
}

fn epoch_to_datetime(secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// One mounted filesystem reported by `df`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub filesystem: String,
    pub directory: String,
    pub fs_type: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub file_count: u64,
    pub error_code: u32,
    pub error_message: String,
}

/// Mounted filesystems, in the order reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountList {
    pub mounts: Vec<Mount>,
}

impl MountList {
    /// Fields of all mounts are flattened into one record list: tag 1 opens
    /// a new entry and every following field belongs to it.
    pub fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut result = MountList::default();
        let mut current: Option<Mount> = None;
        let mut reader = PayloadReader::new(payload);
        loop {
            let record = reader.next_record()?;
            let v = &record.value;
            if record.tag == 1 {
                if let Some(done) = current.take() {
                    result.mounts.push(done);
                }
                current = Some(Mount {
                    filesystem: decode_zstr("fs", v)?,
                    ..Mount::default()
                });
                continue;
            }
            if record.tag == END_OF_BUFFER {
                result.mounts.extend(current.take());
                return Ok(result);
            }

            let field = mount_field_name(record.tag).ok_or(ProtocolError::UnknownTag {
                context: "mount list",
                tag: record.tag,
            })?;
            let mount = current
                .as_mut()
                .ok_or(ProtocolError::OrphanMountField { field })?;
            match record.tag {
                2 => mount.directory = decode_zstr(field, v)?,
                3 => mount.fs_type = decode_zstr(field, v)?,
                4 => mount.total = decode_u64(field, v)?,
                5 => mount.used = decode_u64(field, v)?,
                6 => mount.free = decode_u64(field, v)?,
                7 => mount.file_count = decode_u64(field, v)?,
                8 => mount.error_code = decode_u32(field, v)?,
                _ => mount.error_message = decode_zstr(field, v)?,
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for mount in &self.mounts {
            zstr_record(1, &mount.filesystem).encode_into(&mut buf);
            zstr_record(2, &mount.directory).encode_into(&mut buf);
            zstr_record(3, &mount.fs_type).encode_into(&mut buf);
            u64_record(4, mount.total).encode_into(&mut buf);
            u64_record(5, mount.used).encode_into(&mut buf);
            u64_record(6, mount.free).encode_into(&mut buf);
            u64_record(7, mount.file_count).encode_into(&mut buf);
            u32_record(8, mount.error_code).encode_into(&mut buf);
            zstr_record(9, &mount.error_message).encode_into(&mut buf);
        }
        buf.freeze()
    }
}

fn mount_field_name(tag: u8) -> Option<&'static str> {
    Some(match tag {
        2 => "dir",
        3 => "is_a",
        4 => "total",
        5 => "used",
        6 => "free",
        7 => "fcount",
        8 => "errno",
        9 => "errstr",
        _ => return None,
    })
}

/// Totals from a recursive size computation (`du`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeSummary {
    pub size: u64,
    pub file_count: u32,
    pub dir_count: u32,
    pub failed_file_count: u32,
    pub failed_dir_count: u32,
}

impl SizeSummary {
    pub fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut size = SizeSummary::default();
        let mut reader = PayloadReader::new(payload);
        loop {
            let record = reader.next_record()?;
            let v = &record.value;
            match record.tag {
                END_OF_BUFFER => return Ok(size),
                1 => size.size = decode_u64("size", v)?,
                2 => size.file_count = decode_u32("fcount", v)?,
                3 => size.dir_count = decode_u32("dcount", v)?,
                4 => size.failed_file_count = decode_u32("failed_fcount", v)?,
                5 => size.failed_dir_count = decode_u32("failed_dcount", v)?,
                tag => return Err(ProtocolError::UnknownTag { context: "size", tag }),
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        u64_record(1, self.size).encode_into(&mut buf);
        u32_record(2, self.file_count).encode_into(&mut buf);
        u32_record(3, self.dir_count).encode_into(&mut buf);
        u32_record(4, self.failed_file_count).encode_into(&mut buf);
        u32_record(5, self.failed_dir_count).encode_into(&mut buf);
        buf.freeze()
    }
}

/// Failure reported by the agent for a well-formed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandError {
    pub code: u32,
    pub message: String,
}

impl CommandError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn decode(payload: Bytes) -> Result<Self, ProtocolError> {
        let mut error = CommandError::default();
        let mut reader = PayloadReader::new(payload);
        loop {
            let record = reader.next_record()?;
            match record.tag {
                END_OF_BUFFER => return Ok(error),
                1 => error.code = decode_u32("errno", &record.value)?,
                2 => error.message = decode_zstr("errstr", &record.value)?,
                tag => return Err(ProtocolError::UnknownTag { context: "error", tag }),
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        u32_record(1, self.code).encode_into(&mut buf);
        zstr_record(2, &self.message).encode_into(&mut buf);
        buf.freeze()
    }
}

/// Decode an `md5sum` payload into its hex digest.
pub fn decode_checksum(payload: Bytes) -> Result<String, ProtocolError> {
    let mut digest = String::new();
    let mut reader = PayloadReader::new(payload);
    loop {
        let record = reader.next_record()?;
        match record.tag {
            END_OF_BUFFER => return Ok(digest),
            1 => digest = decode_zstr("md5sum", &record.value)?,
            tag => return Err(ProtocolError::UnknownTag { context: "checksum", tag }),
        }
    }
}

pub fn encode_checksum(digest: &str) -> Bytes {
    zstr_record(1, digest).encode()
}

/// Helper to build a payload out of raw records.
pub fn payload_of(records: &[TagValue]) -> Bytes {
    let mut buf = BytesMut::new();
    for record in records {
        record.encode_into(&mut buf);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stat(name: &str) -> Stat {
        Stat {
            name: name.to_string(),
            size: 1024,
            mode: 0o100644,
            mode_text: "-rw-r--r--".to_string(),
            uid: 1000,
            owner: "xfer".to_string(),
            gid: 1000,
            group: "xfer".to_string(),
            ctime: 1_700_000_000,
            ctime_text: "2023-11-14 22:13:20".to_string(),
            mtime: 1_700_000_100,
            mtime_text: "2023-11-14 22:15:00".to_string(),
            atime: 1_700_000_200,
            atime_text: "2023-11-14 22:16:40".to_string(),
            symlink: None,
            error_code: 0,
            error_message: String::new(),
        }
    }

    #[test]
    fn test_stat_roundtrip() {
        let stat = sample_stat("report.txt");
        let decoded = Stat::decode(stat.encode()).unwrap();
        assert_eq!(decoded, stat);
        assert!(!decoded.is_dir());
        assert_eq!(decoded.modified_at().unwrap().timestamp(), 1_700_000_100);
    }

    #[test]
    fn test_stat_symlink_and_error_fields() {
        let mut stat = sample_stat("link");
        stat.mode = 0o120777;
        stat.symlink = Some("target".to_string());
        stat.error_code = 13;
        stat.error_message = "Permission denied".to_string();

        let decoded = Stat::decode(stat.encode()).unwrap();
        assert!(decoded.is_symlink());
        assert!(decoded.has_error());
        assert_eq!(decoded.symlink.as_deref(), Some("target"));
    }

    #[test]
    fn test_stat_unknown_tag() {
        let payload = payload_of(&[zstr_record(1, "a"), zstr_record(42, "?")]);
        let err = Stat::decode(payload).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag { context: "stat", tag: 42 }));
    }

    #[test]
    fn test_info_devices_and_default_protocol() {
        let payload = payload_of(&[
            zstr_record(1, "x86_64-linux"),
            zstr_record(2, "4.4.5"),
            zstr_record(10, "disk"),
            zstr_record(10, "s3"),
        ]);
        let info = PlatformInfo::decode(payload).unwrap();
        assert_eq!(info.platform, "x86_64-linux");
        assert_eq!(info.devices, vec!["disk".to_string(), "s3".to_string()]);
        assert_eq!(info.protocol, 1);
    }

    #[test]
    fn test_info_roundtrip() {
        let info = PlatformInfo {
            platform: "x86_64-linux".to_string(),
            version: "4.4.5".to_string(),
            lang: "en".to_string(),
            codeset: "UTF-8".to_string(),
            devices: vec!["disk".to_string()],
            browse_caps: "ls,df".to_string(),
            protocol: 2,
            ..PlatformInfo::default()
        };
        assert_eq!(PlatformInfo::decode(info.encode()).unwrap(), info);
    }

    #[test]
    fn test_info_stops_at_explicit_end_record() {
        let payload = payload_of(&[
            zstr_record(1, "linux"),
            TagValue::end(),
            zstr_record(99, "ignored"),
        ]);
        assert_eq!(PlatformInfo::decode(payload).unwrap().platform, "linux");
    }

    #[test]
    fn test_mounts_group_on_filesystem_tag() {
        // Tags 1,2,3,4,1,2 then end of buffer
        let payload = payload_of(&[
            zstr_record(1, "/dev/sda1"),
            zstr_record(2, "/"),
            zstr_record(3, "ext4"),
            u64_record(4, 500),
            zstr_record(1, "tmpfs"),
            zstr_record(2, "/tmp"),
            TagValue::end(),
        ]);
        let list = MountList::decode(payload).unwrap();
        assert_eq!(list.mounts.len(), 2);

        let first = &list.mounts[0];
        assert_eq!(first.filesystem, "/dev/sda1");
        assert_eq!(first.directory, "/");
        assert_eq!(first.fs_type, "ext4");
        assert_eq!(first.total, 500);

        let second = &list.mounts[1];
        assert_eq!(second.filesystem, "tmpfs");
        assert_eq!(second.directory, "/tmp");
        assert_eq!(second.fs_type, "");
        assert_eq!(second.total, 0);
    }

    #[test]
    fn test_mounts_field_before_filesystem() {
        let payload = payload_of(&[zstr_record(2, "/")]);
        let err = MountList::decode(payload).unwrap_err();
        assert!(matches!(err, ProtocolError::OrphanMountField { field: "dir" }));
    }

    #[test]
    fn test_mounts_empty_payload() {
        assert!(MountList::decode(Bytes::new()).unwrap().mounts.is_empty());
    }

    #[test]
    fn test_size_wrong_width() {
        let payload = payload_of(&[u32_record(1, 7)]);
        let err = SizeSummary::decode(payload).unwrap_err();
        assert!(matches!(err, ProtocolError::WrongWidth { field: "size", .. }));
    }

    #[test]
    fn test_checksum_and_error() {
        let digest = "d41d8cd98f00b204e9800998ecf8427e";
        assert_eq!(decode_checksum(encode_checksum(digest)).unwrap(), digest);

        let error = CommandError::new(2, "No such file or directory");
        assert_eq!(CommandError::decode(error.encode()).unwrap(), error);
    }
}
