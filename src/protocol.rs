//! 9P2000 protocol constants and data types.

use std::fmt;

use crate::error::WireError;

/// Request/response correlation id.
pub type Tag = u16;
/// Client-chosen handle to a served resource.
pub type Fid = u32;

/// Special values used by the protocol.
pub const NO_TAG: Tag = 0;
pub const NO_FID: Fid = 0xFFFF_FFFF;

/// The only protocol version this crate speaks.
pub const VERSION_9P2000: &str = "9P2000";
pub const VERSION_UNKNOWN: &str = "unknown";

/// Longest string that fits behind a 2-byte length prefix.
pub const MAX_STR_SIZE: usize = 65535;

/// size[4] type[1] tag[2]
pub const HEADER_SIZE: u32 = 7;

pub const DEFAULT_MSIZE: u32 = 65535;

/// Smallest msize a server agrees to.
pub const MIN_MSIZE: u32 = 256;

/// Most names a single Twalk may carry.
pub const MAX_WELEM: usize = 16;

pub const OREAD: u8 = 0;
pub const OWRITE: u8 = 1;
pub const ORDWR: u8 = 2;
pub const OEXEC: u8 = 3;
pub const OTRUNC: u8 = 0x10;
pub const ORCLOSE: u8 = 0x40;

pub const DMDIR: u32 = 0x8000_0000;

/// Bits of `Qid::qtype`.
pub const QTDIR: u8 = 0x80;
pub const QTAPPEND: u8 = 0x40;
pub const QTEXCL: u8 = 0x20;
pub const QTMOUNT: u8 = 0x10;
pub const QTAUTH: u8 = 0x08;
pub const QTTMP: u8 = 0x04;
pub const QTFILE: u8 = 0x00;

/// Wire-level type byte of every message kind.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgType {
    TVersion = 100,
    RVersion = 101,
    TAuth = 102,
    RAuth = 103,
    TAttach = 104,
    RAttach = 105,
    RError = 107,
    TFlush = 108,
    RFlush = 109,
    TWalk = 110,
    RWalk = 111,
    TOpen = 112,
    ROpen = 113,
    TCreate = 114,
    RCreate = 115,
    TRead = 116,
    RRead = 117,
    TWrite = 118,
    RWrite = 119,
    TClunk = 120,
    RClunk = 121,
    TRemove = 122,
    RRemove = 123,
    TStat = 124,
    RStat = 125,
    TWStat = 126,
    RWStat = 127,
}

impl MsgType {
    pub fn name(self) -> &'static str {
        match self {
            MsgType::TVersion => "Tversion",
            MsgType::RVersion => "Rversion",
            MsgType::TAuth => "Tauth",
            MsgType::RAuth => "Rauth",
            MsgType::TAttach => "Tattach",
            MsgType::RAttach => "Rattach",
            MsgType::RError => "Rerror",
            MsgType::TFlush => "Tflush",
            MsgType::RFlush => "Rflush",
            MsgType::TWalk => "Twalk",
            MsgType::RWalk => "Rwalk",
            MsgType::TOpen => "Topen",
            MsgType::ROpen => "Ropen",
            MsgType::TCreate => "Tcreate",
            MsgType::RCreate => "Rcreate",
            MsgType::TRead => "Tread",
            MsgType::RRead => "Rread",
            MsgType::TWrite => "Twrite",
            MsgType::RWrite => "Rwrite",
            MsgType::TClunk => "Tclunk",
            MsgType::RClunk => "Rclunk",
            MsgType::TRemove => "Tremove",
            MsgType::RRemove => "Rremove",
            MsgType::TStat => "Tstat",
            MsgType::RStat => "Rstat",
            MsgType::TWStat => "Twstat",
            MsgType::RWStat => "Rwstat",
        }
    }
}

impl TryFrom<u8> for MsgType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            100 => MsgType::TVersion,
            101 => MsgType::RVersion,
            102 => MsgType::TAuth,
            103 => MsgType::RAuth,
            104 => MsgType::TAttach,
            105 => MsgType::RAttach,
            107 => MsgType::RError,
            108 => MsgType::TFlush,
            109 => MsgType::RFlush,
            110 => MsgType::TWalk,
            111 => MsgType::RWalk,
            112 => MsgType::TOpen,
            113 => MsgType::ROpen,
            114 => MsgType::TCreate,
            115 => MsgType::RCreate,
            116 => MsgType::TRead,
            117 => MsgType::RRead,
            118 => MsgType::TWrite,
            119 => MsgType::RWrite,
            120 => MsgType::TClunk,
            121 => MsgType::RClunk,
            122 => MsgType::TRemove,
            123 => MsgType::RRemove,
            124 => MsgType::TStat,
            125 => MsgType::RStat,
            126 => MsgType::TWStat,
            127 => MsgType::RWStat,
            other => return Err(WireError::UnknownMessageType(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Qid identifies a file within a 9P server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Qid {
    pub qtype: u8,
    pub version: u32,
    pub path: u64,
}

impl Qid {
    /// type[1] version[4] path[8]
    pub const SIZE: usize = 13;

    pub fn is_dir(&self) -> bool {
        self.qtype & QTDIR != 0
    }
}

impl fmt::Display for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x} {} {:#04x})", self.path, self.version, self.qtype)
    }
}

/// Resource metadata as carried by Rstat and Twstat.
///
/// Times are seconds since the Unix epoch, as on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub kind: u16,
    pub dev: u32,
    pub qid: Qid,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub length: u64,
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub muid: String,
}

impl Stat {
    /// Encoded size excluding the leading size[2] field.
    pub fn body_size(&self) -> usize {
        // type[2] dev[4] qid[13] mode[4] atime[4] mtime[4] length[8]
        // plus four length-prefixed strings
        2 + 4
            + Qid::SIZE
            + 4
            + 4
            + 4
            + 8
            + [&self.name, &self.uid, &self.gid, &self.muid]
                .iter()
                .map(|s| 2 + s.len())
                .sum::<usize>()
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' '{}' '{}' '{}' q {} m {:#o} at {} mt {} l {} t {} d {}",
            self.name,
            self.uid,
            self.gid,
            self.muid,
            self.qid,
            self.mode,
            self.atime,
            self.mtime,
            self.length,
            self.kind,
            self.dev
        )
    }
}
