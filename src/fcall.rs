//! The 9P2000 message catalog.
//!
//! Every kind is a plain value struct whose fields appear in wire order.
//! [`Fcall`] is the closed union over all of them.

use std::fmt;

use crate::error::WireError;
use crate::message::{Decoder, Encoder};
use crate::protocol::{Fid, MsgType, Qid, Stat, Tag};

/// Field layout of a single message kind.
pub(crate) trait WireFormat: Sized {
    const TYPE: MsgType;

    fn tag(&self) -> Tag;

    /// Everything after the tag.
    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError>;

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError>;
}

/// size[4] Tversion tag[2] msize[4] version[s]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TVersion {
    pub tag: Tag,
    pub msize: u32,
    pub version: String,
}

/// size[4] Rversion tag[2] msize[4] version[s]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RVersion {
    pub tag: Tag,
    pub msize: u32,
    pub version: String,
}

/// size[4] Tauth tag[2] afid[4] uname[s] aname[s]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TAuth {
    pub tag: Tag,
    pub afid: Fid,
    pub uname: String,
    pub aname: String,
}

/// size[4] Rauth tag[2] aqid[13]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RAuth {
    pub tag: Tag,
    pub aqid: Qid,
}

/// size[4] Tattach tag[2] fid[4] afid[4] uname[s] aname[s]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TAttach {
    pub tag: Tag,
    pub fid: Fid,
    pub afid: Fid,
    pub uname: String,
    pub aname: String,
}

/// size[4] Rattach tag[2] qid[13]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RAttach {
    pub tag: Tag,
    pub qid: Qid,
}

/// size[4] Rerror tag[2] ename[s]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RError {
    pub tag: Tag,
    pub ename: String,
}

/// size[4] Tflush tag[2] oldtag[2]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TFlush {
    pub tag: Tag,
    pub oldtag: Tag,
}

/// size[4] Rflush tag[2]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RFlush {
    pub tag: Tag,
}

/// size[4] Twalk tag[2] fid[4] newfid[4] nwname[2] nwname*(wname[s])
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TWalk {
    pub tag: Tag,
    pub fid: Fid,
    pub newfid: Fid,
    pub wnames: Vec<String>,
}

/// size[4] Rwalk tag[2] nwqid[2] nwqid*(wqid[13])
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RWalk {
    pub tag: Tag,
    pub wqids: Vec<Qid>,
}

/// size[4] Topen tag[2] fid[4] mode[1]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TOpen {
    pub tag: Tag,
    pub fid: Fid,
    pub mode: u8,
}

/// size[4] Ropen tag[2] qid[13] iounit[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ROpen {
    pub tag: Tag,
    pub qid: Qid,
    pub iounit: u32,
}

/// size[4] Tcreate tag[2] fid[4] name[s] perm[4] mode[1]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TCreate {
    pub tag: Tag,
    pub fid: Fid,
    pub name: String,
    pub perm: u32,
    pub mode: u8,
}

/// size[4] Rcreate tag[2] qid[13] iounit[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RCreate {
    pub tag: Tag,
    pub qid: Qid,
    pub iounit: u32,
}

/// size[4] Tread tag[2] fid[4] offset[8] count[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TRead {
    pub tag: Tag,
    pub fid: Fid,
    pub offset: u64,
    pub count: u32,
}

/// size[4] Rread tag[2] count[4] data[count]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RRead {
    pub tag: Tag,
    pub data: Vec<u8>,
}

/// size[4] Twrite tag[2] fid[4] offset[8] count[4] data[count]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TWrite {
    pub tag: Tag,
    pub fid: Fid,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// size[4] Rwrite tag[2] count[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RWrite {
    pub tag: Tag,
    pub count: u32,
}

/// size[4] Tclunk tag[2] fid[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TClunk {
    pub tag: Tag,
    pub fid: Fid,
}

/// size[4] Rclunk tag[2]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RClunk {
    pub tag: Tag,
}

/// size[4] Tremove tag[2] fid[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TRemove {
    pub tag: Tag,
    pub fid: Fid,
}

/// size[4] Rremove tag[2]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RRemove {
    pub tag: Tag,
}

/// size[4] Tstat tag[2] fid[4]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TStat {
    pub tag: Tag,
    pub fid: Fid,
}

/// size[4] Rstat tag[2] stat[n]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RStat {
    pub tag: Tag,
    pub stat: Stat,
}

/// size[4] Twstat tag[2] fid[4] stat[n]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TWStat {
    pub tag: Tag,
    pub fid: Fid,
    pub stat: Stat,
}

/// size[4] Rwstat tag[2]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RWStat {
    pub tag: Tag,
}

fn push_count(enc: &mut Encoder, len: usize) -> Result<(), WireError> {
    let count = u16::try_from(len).map_err(|_| WireError::FieldTooBig(len))?;
    enc.push_u16(count);
    Ok(())
}

/// Rstat and Twstat wrap the stat record in one more 2-byte count.
fn push_stat_field(enc: &mut Encoder, stat: &Stat) -> Result<(), WireError> {
    let mut inner = Encoder::raw();
    inner.push_stat(stat)?;
    let bytes = inner.into_inner();
    push_count(enc, bytes.len())?;
    enc.push_bytes(&bytes);
    Ok(())
}

fn read_stat_field(dec: &mut Decoder<'_>) -> Result<Stat, WireError> {
    let nstat = dec.read_u16()? as usize;
    let mut inner = Decoder::new(dec.read_bytes(nstat)?);
    let stat = inner.read_stat()?;
    inner.finish()?;
    Ok(stat)
}

impl WireFormat for TVersion {
    const TYPE: MsgType = MsgType::TVersion;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.msize);
        enc.push_str(&self.version)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            msize: dec.read_u32()?,
            version: dec.read_str()?,
        })
    }
}

impl WireFormat for RVersion {
    const TYPE: MsgType = MsgType::RVersion;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.msize);
        enc.push_str(&self.version)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            msize: dec.read_u32()?,
            version: dec.read_str()?,
        })
    }
}

impl WireFormat for TAuth {
    const TYPE: MsgType = MsgType::TAuth;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.afid);
        enc.push_str(&self.uname)?;
        enc.push_str(&self.aname)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            afid: dec.read_u32()?,
            uname: dec.read_str()?,
            aname: dec.read_str()?,
        })
    }
}

impl WireFormat for RAuth {
    const TYPE: MsgType = MsgType::RAuth;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_qid(&self.aqid);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            aqid: dec.read_qid()?,
        })
    }
}

impl WireFormat for TAttach {
    const TYPE: MsgType = MsgType::TAttach;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_u32(self.afid);
        enc.push_str(&self.uname)?;
        enc.push_str(&self.aname)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            afid: dec.read_u32()?,
            uname: dec.read_str()?,
            aname: dec.read_str()?,
        })
    }
}

impl WireFormat for RAttach {
    const TYPE: MsgType = MsgType::RAttach;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_qid(&self.qid);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            qid: dec.read_qid()?,
        })
    }
}

impl WireFormat for RError {
    const TYPE: MsgType = MsgType::RError;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_str(&self.ename)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            ename: dec.read_str()?,
        })
    }
}

impl WireFormat for TFlush {
    const TYPE: MsgType = MsgType::TFlush;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u16(self.oldtag);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            oldtag: dec.read_u16()?,
        })
    }
}

impl WireFormat for RFlush {
    const TYPE: MsgType = MsgType::RFlush;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, _enc: &mut Encoder) -> Result<(), WireError> {
        Ok(())
    }

    fn decode_body(tag: Tag, _dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self { tag })
    }
}

impl WireFormat for TWalk {
    const TYPE: MsgType = MsgType::TWalk;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_u32(self.newfid);
        push_count(enc, self.wnames.len())?;
        for name in &self.wnames {
            enc.push_str(name)?;
        }
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let fid = dec.read_u32()?;
        let newfid = dec.read_u32()?;
        let nwname = dec.read_u16()? as usize;
        // every name needs at least its 2-byte length
        let mut wnames = Vec::with_capacity(nwname.min(dec.remaining() / 2));
        for _ in 0..nwname {
            wnames.push(dec.read_str()?);
        }
        Ok(Self {
            tag,
            fid,
            newfid,
            wnames,
        })
    }
}

impl WireFormat for RWalk {
    const TYPE: MsgType = MsgType::RWalk;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        push_count(enc, self.wqids.len())?;
        for qid in &self.wqids {
            enc.push_qid(qid);
        }
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let nwqid = dec.read_u16()? as usize;
        let mut wqids = Vec::with_capacity(nwqid.min(dec.remaining() / Qid::SIZE));
        for _ in 0..nwqid {
            wqids.push(dec.read_qid()?);
        }
        Ok(Self { tag, wqids })
    }
}

impl WireFormat for TOpen {
    const TYPE: MsgType = MsgType::TOpen;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_u8(self.mode);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            mode: dec.read_u8()?,
        })
    }
}

impl WireFormat for ROpen {
    const TYPE: MsgType = MsgType::ROpen;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_qid(&self.qid);
        enc.push_u32(self.iounit);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            qid: dec.read_qid()?,
            iounit: dec.read_u32()?,
        })
    }
}

impl WireFormat for TCreate {
    const TYPE: MsgType = MsgType::TCreate;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_str(&self.name)?;
        enc.push_u32(self.perm);
        enc.push_u8(self.mode);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            name: dec.read_str()?,
            perm: dec.read_u32()?,
            mode: dec.read_u8()?,
        })
    }
}

impl WireFormat for RCreate {
    const TYPE: MsgType = MsgType::RCreate;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_qid(&self.qid);
        enc.push_u32(self.iounit);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            qid: dec.read_qid()?,
            iounit: dec.read_u32()?,
        })
    }
}

impl WireFormat for TRead {
    const TYPE: MsgType = MsgType::TRead;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_u64(self.offset);
        enc.push_u32(self.count);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            offset: dec.read_u64()?,
            count: dec.read_u32()?,
        })
    }
}

impl WireFormat for RRead {
    const TYPE: MsgType = MsgType::RRead;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_data(&self.data)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            data: dec.read_data()?,
        })
    }
}

impl WireFormat for TWrite {
    const TYPE: MsgType = MsgType::TWrite;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        enc.push_u64(self.offset);
        enc.push_data(&self.data)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            offset: dec.read_u64()?,
            data: dec.read_data()?,
        })
    }
}

impl WireFormat for RWrite {
    const TYPE: MsgType = MsgType::RWrite;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.count);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            count: dec.read_u32()?,
        })
    }
}

impl WireFormat for TClunk {
    const TYPE: MsgType = MsgType::TClunk;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
        })
    }
}

impl WireFormat for RClunk {
    const TYPE: MsgType = MsgType::RClunk;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, _enc: &mut Encoder) -> Result<(), WireError> {
        Ok(())
    }

    fn decode_body(tag: Tag, _dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self { tag })
    }
}

impl WireFormat for TRemove {
    const TYPE: MsgType = MsgType::TRemove;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
        })
    }
}

impl WireFormat for RRemove {
    const TYPE: MsgType = MsgType::RRemove;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, _enc: &mut Encoder) -> Result<(), WireError> {
        Ok(())
    }

    fn decode_body(tag: Tag, _dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self { tag })
    }
}

impl WireFormat for TStat {
    const TYPE: MsgType = MsgType::TStat;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        Ok(())
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
        })
    }
}

impl WireFormat for RStat {
    const TYPE: MsgType = MsgType::RStat;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        push_stat_field(enc, &self.stat)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            stat: read_stat_field(dec)?,
        })
    }
}

impl WireFormat for TWStat {
    const TYPE: MsgType = MsgType::TWStat;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
        enc.push_u32(self.fid);
        push_stat_field(enc, &self.stat)
    }

    fn decode_body(tag: Tag, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            tag,
            fid: dec.read_u32()?,
            stat: read_stat_field(dec)?,
        })
    }
}

impl WireFormat for RWStat {
    const TYPE: MsgType = MsgType::RWStat;

    fn tag(&self) -> Tag {
        self.tag
    }

    fn encode_body(&self, _enc: &mut Encoder) -> Result<(), WireError> {
        Ok(())
    }

    fn decode_body(tag: Tag, _dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self { tag })
    }
}

/// Generates the closed union plus the plumbing that only forwards to the
/// per-kind [`WireFormat`] impls.
macro_rules! fcall_kinds {
    ($($kind:ident),+ $(,)?) => {
        /// Any 9P2000 message.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum Fcall {
            $($kind($kind),)+
        }

        impl Fcall {
            pub fn msg_type(&self) -> MsgType {
                match self {
                    $(Fcall::$kind(_) => <$kind as WireFormat>::TYPE,)+
                }
            }

            pub fn tag(&self) -> Tag {
                match self {
                    $(Fcall::$kind(m) => m.tag(),)+
                }
            }

            pub(crate) fn encode_body(&self, enc: &mut Encoder) -> Result<(), WireError> {
                match self {
                    $(Fcall::$kind(m) => m.encode_body(enc),)+
                }
            }

            pub(crate) fn decode_body(
                msg_type: MsgType,
                tag: Tag,
                dec: &mut Decoder<'_>,
            ) -> Result<Self, WireError> {
                match msg_type {
                    $(MsgType::$kind => {
                        <$kind as WireFormat>::decode_body(tag, dec).map(Fcall::$kind)
                    })+
                }
            }
        }

        $(
            impl From<$kind> for Fcall {
                fn from(msg: $kind) -> Self {
                    Fcall::$kind(msg)
                }
            }
        )+
    };
}

fcall_kinds!(
    TVersion, RVersion, TAuth, RAuth, TAttach, RAttach, RError, TFlush, RFlush, TWalk, RWalk,
    TOpen, ROpen, TCreate, RCreate, TRead, RRead, TWrite, RWrite, TClunk, RClunk, TRemove,
    RRemove, TStat, RStat, TWStat, RWStat,
);

impl fmt::Display for Fcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tag {}", self.msg_type(), self.tag())?;
        match self {
            Fcall::TVersion(m) => write!(f, " msize {} version '{}'", m.msize, m.version),
            Fcall::RVersion(m) => write!(f, " msize {} version '{}'", m.msize, m.version),
            Fcall::TAuth(m) => write!(
                f,
                " afid {} uname '{}' aname '{}'",
                m.afid, m.uname, m.aname
            ),
            Fcall::RAuth(m) => write!(f, " aqid {}", m.aqid),
            Fcall::TAttach(m) => write!(
                f,
                " fid {} afid {} uname '{}' aname '{}'",
                m.fid, m.afid as i32, m.uname, m.aname
            ),
            Fcall::RAttach(m) => write!(f, " qid {}", m.qid),
            Fcall::RError(m) => write!(f, " ename '{}'", m.ename),
            Fcall::TFlush(m) => write!(f, " oldtag {}", m.oldtag),
            Fcall::RFlush(_) => Ok(()),
            Fcall::TWalk(m) => write!(
                f,
                " fid {} newfid {} nwname {} {:?}",
                m.fid,
                m.newfid,
                m.wnames.len(),
                m.wnames
            ),
            Fcall::RWalk(m) => {
                write!(f, " nwqid {}", m.wqids.len())?;
                for qid in &m.wqids {
                    write!(f, " {qid}")?;
                }
                Ok(())
            }
            Fcall::TOpen(m) => write!(f, " fid {} mode {}", m.fid, m.mode),
            Fcall::ROpen(m) => write!(f, " qid {} iounit {}", m.qid, m.iounit),
            Fcall::TCreate(m) => write!(
                f,
                " fid {} name '{}' perm {:#o} mode {}",
                m.fid, m.name, m.perm, m.mode
            ),
            Fcall::RCreate(m) => write!(f, " qid {} iounit {}", m.qid, m.iounit),
            Fcall::TRead(m) => write!(f, " fid {} offset {} count {}", m.fid, m.offset, m.count),
            Fcall::RRead(m) => write!(f, " count {}", m.data.len()),
            Fcall::TWrite(m) => write!(
                f,
                " fid {} offset {} count {}",
                m.fid,
                m.offset,
                m.data.len()
            ),
            Fcall::RWrite(m) => write!(f, " count {}", m.count),
            Fcall::TClunk(m) => write!(f, " fid {}", m.fid),
            Fcall::RClunk(_) => Ok(()),
            Fcall::TRemove(m) => write!(f, " fid {}", m.fid),
            Fcall::RRemove(_) => Ok(()),
            Fcall::TStat(m) => write!(f, " fid {}", m.fid),
            Fcall::RStat(m) => write!(f, " stat {}", m.stat),
            Fcall::TWStat(m) => write!(f, " fid {} stat {}", m.fid, m.stat),
            Fcall::RWStat(_) => Ok(()),
        }
    }
}
