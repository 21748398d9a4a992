//! Primitive encoding and decoding of 9P wire fields.

use crate::error::WireError;
use crate::protocol::{MAX_STR_SIZE, MsgType, Qid, Stat, Tag};

/// 9P message encoder with size prefix.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Start a frame: size placeholder, type byte and tag.
    pub fn new(msg_type: MsgType, tag: Tag) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.push(msg_type as u8);
        buf.extend_from_slice(&tag.to_le_bytes());
        Self { buf }
    }

    /// An encoder with no frame header, for standalone fields.
    pub fn raw() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn push_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn push_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn push_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn push_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed string. Nothing is written if it is too long.
    pub fn push_str(&mut self, value: &str) -> Result<(), WireError> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STR_SIZE {
            return Err(WireError::StringTooBig(bytes.len()));
        }
        self.push_u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// count[4] followed by the bytes.
    pub fn push_data(&mut self, data: &[u8]) -> Result<(), WireError> {
        let count = u32::try_from(data.len()).map_err(|_| WireError::FieldTooBig(data.len()))?;
        self.push_u32(count);
        self.push_bytes(data);
        Ok(())
    }

    pub fn push_qid(&mut self, qid: &Qid) {
        self.push_u8(qid.qtype);
        self.push_u32(qid.version);
        self.push_u64(qid.path);
    }

    /// size[2] followed by the stat body.
    pub fn push_stat(&mut self, stat: &Stat) -> Result<(), WireError> {
        let size = stat.body_size();
        if size > u16::MAX as usize {
            return Err(WireError::FieldTooBig(size));
        }
        self.push_u16(size as u16);
        self.push_u16(stat.kind);
        self.push_u32(stat.dev);
        self.push_qid(&stat.qid);
        self.push_u32(stat.mode);
        self.push_u32(stat.atime);
        self.push_u32(stat.mtime);
        self.push_u64(stat.length);
        self.push_str(&stat.name)?;
        self.push_str(&stat.uid)?;
        self.push_str(&stat.gid)?;
        self.push_str(&stat.muid)?;
        Ok(())
    }

    /// Patch the size field and return the frame.
    pub fn finish(mut self) -> Result<Vec<u8>, WireError> {
        let size =
            u32::try_from(self.buf.len()).map_err(|_| WireError::FieldTooBig(self.buf.len()))?;
        self.buf[0..4].copy_from_slice(&size.to_le_bytes());
        Ok(self.buf)
    }

    /// Bytes accumulated so far, without patching any size field.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a bounded buffer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Take exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::BufferTooShort {
                wanted: len,
                got: self.remaining(),
            });
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_str(&mut self) -> Result<String, WireError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        let value = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
        Ok(value.to_string())
    }

    /// count[4] followed by that many bytes.
    pub fn read_data(&mut self) -> Result<Vec<u8>, WireError> {
        let count = self.read_u32()? as usize;
        Ok(self.read_bytes(count)?.to_vec())
    }

    pub fn read_qid(&mut self) -> Result<Qid, WireError> {
        let qtype = self.read_u8()?;
        let version = self.read_u32()?;
        let path = self.read_u64()?;
        Ok(Qid {
            qtype,
            version,
            path,
        })
    }

    /// size[2] then a stat body decoded from exactly that many bytes.
    pub fn read_stat(&mut self) -> Result<Stat, WireError> {
        let size = self.read_u16()? as usize;
        let mut body = Decoder::new(self.read_bytes(size)?);
        let stat = Stat {
            kind: body.read_u16()?,
            dev: body.read_u32()?,
            qid: body.read_qid()?,
            mode: body.read_u32()?,
            atime: body.read_u32()?,
            mtime: body.read_u32()?,
            length: body.read_u64()?,
            name: body.read_str()?,
            uid: body.read_str()?,
            gid: body.read_str()?,
            muid: body.read_str()?,
        };
        body.finish()?;
        Ok(stat)
    }

    /// Fail if any bytes were left unread.
    pub fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}

pub fn dump_hex(buf: &[u8]) -> String {
    let mut out = String::new();
    for (idx, byte) in buf.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
