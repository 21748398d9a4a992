//! Frame parsing and serialization.
//!
//! A frame is `size[4] type[1] tag[2] payload`, where `size` counts the
//! whole frame. The payload is always cut out of the stream in full before
//! any per-kind decoding starts, so a bad field can never read into the next
//! frame. [`P9Codec`] does the same for byte streams.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use log::debug;
use tokio_util::codec;

use crate::error::WireError;
use crate::fcall::Fcall;
use crate::message::{Decoder, Encoder, dump_hex};
use crate::protocol::{HEADER_SIZE, MsgType};

/// Serialize a message into a complete frame.
pub fn encode(msg: &Fcall) -> Result<Vec<u8>, WireError> {
    let mut enc = Encoder::new(msg.msg_type(), msg.tag());
    msg.encode_body(&mut enc)?;
    enc.finish()
}

/// Parse exactly one frame from `buf`.
pub fn decode(buf: &[u8]) -> Result<Fcall, WireError> {
    let mut dec = Decoder::new(buf);
    let size = dec.read_u32()?;
    check_size(size, u32::MAX)?;
    let body = dec.read_bytes(size as usize - 4)?;
    dec.finish()?;
    decode_body(body)
}

/// Decode `type[1] tag[2] payload`, the part of a frame after its size.
pub fn decode_body(body: &[u8]) -> Result<Fcall, WireError> {
    let mut dec = Decoder::new(body);
    let msg_type = MsgType::try_from(dec.read_u8()?)?;
    let tag = dec.read_u16()?;
    let msg = Fcall::decode_body(msg_type, tag, &mut dec)?;
    dec.finish()?;
    Ok(msg)
}

fn check_size(size: u32, max_size: u32) -> Result<(), WireError> {
    if size < HEADER_SIZE || size > max_size {
        return Err(WireError::BadFrameSize(size));
    }
    Ok(())
}

/// Largest frame a [`P9Codec`] accepts.
///
/// Shared between the codec and the engine so a negotiated msize applies to
/// the very next frame, even one whose read is already pending.
#[derive(Clone, Debug)]
pub struct FrameLimit(Arc<AtomicU32>);

impl FrameLimit {
    pub fn new(max_size: u32) -> Self {
        FrameLimit(Arc::new(AtomicU32::new(max_size)))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, max_size: u32) {
        self.0.store(max_size, Ordering::Release);
    }
}

/// Splits a byte stream into [`Fcall`] frames and serializes them back.
///
/// The size bound is checked as soon as a frame's size field has arrived.
/// A stream that ends between frames is a clean end; one that ends inside a
/// frame is `BufferTooShort`.
#[derive(Clone, Debug)]
pub struct P9Codec {
    limit: FrameLimit,
}

impl P9Codec {
    pub fn new(limit: FrameLimit) -> Self {
        P9Codec { limit }
    }
}

impl Default for P9Codec {
    /// A codec that accepts frames of any size.
    fn default() -> Self {
        P9Codec::new(FrameLimit::new(u32::MAX))
    }
}

impl codec::Decoder for P9Codec {
    type Item = Fcall;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Fcall>, WireError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let size = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        check_size(size, self.limit.get())?;

        let size = size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }
        let frame = src.split_to(size);
        let body = &frame[4..];
        decode_body(body).map(Some).inspect_err(|err| {
            debug!("undecodable frame ({err}): {}", dump_hex(body));
        })
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Fcall>, WireError> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        match src.len() {
            0 => Ok(None),
            got @ 1..4 => Err(WireError::BufferTooShort { wanted: 4, got }),
            got => {
                let size = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
                Err(WireError::BufferTooShort {
                    wanted: size - 4,
                    got: got - 4,
                })
            }
        }
    }
}

impl codec::Encoder<Fcall> for P9Codec {
    type Error = WireError;

    fn encode(&mut self, msg: Fcall, dst: &mut BytesMut) -> Result<(), WireError> {
        // encode fully first so a failure leaves nothing half written
        let frame = encode(&msg)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcall::*;
    use crate::protocol::{MAX_STR_SIZE, NO_FID, NO_TAG, Qid, Stat};
    use futures::{SinkExt, StreamExt};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn qid(n: u64) -> Qid {
        Qid {
            qtype: (n % 256) as u8,
            version: n as u32 * 3,
            path: n * 1_000_003,
        }
    }

    fn stat() -> Stat {
        Stat {
            kind: 1,
            dev: 2,
            qid: qid(3),
            mode: 0o755 | crate::protocol::DMDIR,
            atime: 1_700_000_000,
            mtime: 1_700_000_100,
            length: 4096,
            name: String::from("notes"),
            uid: String::from("glenda"),
            gid: String::from("sys"),
            muid: String::new(),
        }
    }

    fn every_kind() -> Vec<Fcall> {
        vec![
            TVersion {
                tag: NO_TAG,
                msize: 8192,
                version: String::from("9P2000"),
            }
            .into(),
            RVersion {
                tag: NO_TAG,
                msize: 8192,
                version: String::new(),
            }
            .into(),
            TAuth {
                tag: 1,
                afid: 7,
                uname: String::from("glenda"),
                aname: String::new(),
            }
            .into(),
            RAuth { tag: 1, aqid: qid(1) }.into(),
            TAttach {
                tag: 2,
                fid: 0,
                afid: NO_FID,
                uname: String::new(),
                aname: String::from("."),
            }
            .into(),
            RAttach { tag: 2, qid: qid(2) }.into(),
            RError {
                tag: 3,
                ename: String::from("uh oh ").repeat(60),
            }
            .into(),
            TFlush { tag: 4, oldtag: 3 }.into(),
            RFlush { tag: 4 }.into(),
            TWalk {
                tag: 5,
                fid: 0,
                newfid: 1,
                wnames: vec![String::from("a"), String::new(), String::from("ccc")],
            }
            .into(),
            RWalk {
                tag: 5,
                wqids: vec![qid(4), qid(5)],
            }
            .into(),
            TOpen {
                tag: 6,
                fid: 1,
                mode: crate::protocol::ORDWR | crate::protocol::OTRUNC,
            }
            .into(),
            ROpen {
                tag: 6,
                qid: qid(6),
                iounit: 8168,
            }
            .into(),
            TCreate {
                tag: 7,
                fid: 1,
                name: String::from("new.md"),
                perm: 0o644,
                mode: crate::protocol::OWRITE,
            }
            .into(),
            RCreate {
                tag: 7,
                qid: qid(7),
                iounit: 0,
            }
            .into(),
            TRead {
                tag: 8,
                fid: 1,
                offset: u64::MAX,
                count: u32::MAX,
            }
            .into(),
            RRead {
                tag: 8,
                data: vec![2, 4],
            }
            .into(),
            TWrite {
                tag: 9,
                fid: 1,
                offset: 12,
                data: b"hello".to_vec(),
            }
            .into(),
            RWrite { tag: 9, count: 5 }.into(),
            TClunk { tag: 10, fid: 1 }.into(),
            RClunk { tag: 10 }.into(),
            TRemove { tag: 11, fid: 2 }.into(),
            RRemove { tag: 11 }.into(),
            TStat { tag: 12, fid: 0 }.into(),
            RStat { tag: 12, stat: stat() }.into(),
            TWStat {
                tag: 13,
                fid: 0,
                stat: Stat::default(),
            }
            .into(),
            RWStat { tag: 0xFFFF }.into(),
        ]
    }

    #[test]
    fn every_kind_round_trips() {
        let msgs = every_kind();
        assert_eq!(msgs.len(), 27);
        for msg in msgs {
            let frame = encode(&msg).unwrap();
            assert_eq!(frame[4], msg.msg_type() as u8);
            assert_eq!(
                u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize,
                frame.len()
            );
            assert_eq!(decode(&frame).unwrap(), msg, "{msg}");
        }
    }

    #[test]
    fn empty_fields_round_trip() {
        let msgs: Vec<Fcall> = vec![
            TWalk {
                tag: 1,
                fid: 1,
                newfid: 1,
                wnames: Vec::new(),
            }
            .into(),
            RWalk {
                tag: 1,
                wqids: Vec::new(),
            }
            .into(),
            RRead {
                tag: 1,
                data: Vec::new(),
            }
            .into(),
            TWrite {
                tag: 1,
                fid: 0,
                offset: 0,
                data: Vec::new(),
            }
            .into(),
            RError {
                tag: 1,
                ename: String::new(),
            }
            .into(),
            TAttach {
                tag: 1,
                fid: 0,
                afid: 0,
                uname: String::new(),
                aname: String::new(),
            }
            .into(),
        ];
        for msg in msgs {
            assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);
        }
    }

    #[test]
    fn version_request_fields_survive() {
        let msg: Fcall = TVersion {
            tag: 1,
            msize: 65535,
            version: String::from("9P2000"),
        }
        .into();
        let frame = encode(&msg).unwrap();
        // size[4] type[1] tag[2] msize[4] len[2] "9P2000"
        assert_eq!(frame.len(), 4 + 1 + 2 + 4 + 2 + 6);
        match decode(&frame).unwrap() {
            Fcall::TVersion(v) => {
                assert_eq!(v.tag, 1);
                assert_eq!(v.msize, 65535);
                assert_eq!(v.version, "9P2000");
            }
            other => panic!("decoded {other}"),
        }
    }

    #[test]
    fn walk_qid_counts_are_preserved() {
        for n in [0usize, 5] {
            let msg = Fcall::RWalk(RWalk {
                tag: 9,
                wqids: (0..n as u64).map(qid).collect(),
            });
            let frame = encode(&msg).unwrap();
            assert_eq!(frame.len(), 7 + 2 + n * Qid::SIZE);
            match decode(&frame).unwrap() {
                Fcall::RWalk(r) => assert_eq!(r.wqids.len(), n),
                other => panic!("decoded {other}"),
            }
        }
    }

    #[test]
    fn longest_string_in_a_message() {
        let msg: Fcall = RError {
            tag: 1,
            ename: "e".repeat(MAX_STR_SIZE),
        }
        .into();
        assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);

        let too_big: Fcall = RError {
            tag: 1,
            ename: "e".repeat(MAX_STR_SIZE + 1),
        }
        .into();
        assert!(matches!(encode(&too_big), Err(WireError::StringTooBig(65536))));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut frame = encode(&TClunk { tag: 1, fid: 1 }.into()).unwrap();
        for byte in [0u8, 106, 200] {
            frame[4] = byte;
            assert!(matches!(
                decode(&frame),
                Err(WireError::UnknownMessageType(b)) if b == byte
            ));
        }
    }

    #[test]
    fn truncated_frames_are_too_short() {
        let frame = encode(&TRead {
            tag: 1,
            fid: 2,
            offset: 3,
            count: 4,
        }
        .into())
        .unwrap();
        for cut in 0..frame.len() {
            let err = decode(&frame[..cut]).unwrap_err();
            assert!(
                matches!(err, WireError::BufferTooShort { .. }),
                "cut at {cut}: {err}"
            );
        }
    }

    #[test]
    fn size_field_smaller_than_fields_is_too_short() {
        // Tclunk header claims a frame with no room for the fid
        let frame = [7u8, 0, 0, 0, 120, 1, 0];
        assert!(matches!(
            decode(&frame),
            Err(WireError::BufferTooShort { wanted: 4, got: 0 })
        ));
    }

    #[test]
    fn bad_sizes_and_trailing_bytes() {
        assert!(matches!(
            decode(&[3, 0, 0, 0]),
            Err(WireError::BadFrameSize(3))
        ));

        let mut frame = encode(&RFlush { tag: 1 }.into()).unwrap();
        frame.push(0);
        assert!(matches!(decode(&frame), Err(WireError::TrailingBytes(1))));

        // size covers an extra byte the Rflush layout does not use
        frame[0] += 1;
        assert!(matches!(decode(&frame), Err(WireError::TrailingBytes(1))));
    }

    #[test]
    fn walk_with_lying_count_is_too_short() {
        // Twalk claiming 300 names but carrying none
        let mut enc = Encoder::new(MsgType::TWalk, 1);
        enc.push_u32(0);
        enc.push_u32(1);
        enc.push_u16(300);
        let frame = enc.finish().unwrap();
        assert!(matches!(
            decode(&frame),
            Err(WireError::BufferTooShort { .. })
        ));
    }

    fn frames(bytes: &[u8], limit: FrameLimit) -> FramedRead<&[u8], P9Codec> {
        FramedRead::new(bytes, P9Codec::new(limit))
    }

    #[tokio::test]
    async fn stream_reads_frames_then_clean_eof() {
        let msgs = every_kind();
        let mut bytes = Vec::new();
        for msg in &msgs {
            bytes.extend(encode(msg).unwrap());
        }
        let mut reader = frames(&bytes, FrameLimit::new(u32::MAX));
        for msg in &msgs {
            let got = reader.next().await.unwrap().unwrap();
            assert_eq!(&got, msg);
        }
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_truncated_mid_frame() {
        let frame = encode(&TStat { tag: 1, fid: 1 }.into()).unwrap();

        let mut reader = frames(&frame[..2], FrameLimit::new(u32::MAX));
        assert!(matches!(
            reader.next().await,
            Some(Err(WireError::BufferTooShort { wanted: 4, got: 2 }))
        ));

        let mut reader = frames(&frame[..frame.len() - 1], FrameLimit::new(u32::MAX));
        assert!(matches!(
            reader.next().await,
            Some(Err(WireError::BufferTooShort { wanted: 7, got: 6 }))
        ));
    }

    #[tokio::test]
    async fn stream_rejects_oversized_frames() {
        let frame = encode(&RRead {
            tag: 1,
            data: vec![0; 100],
        }
        .into())
        .unwrap();
        let mut reader = frames(&frame, FrameLimit::new(64));
        assert!(matches!(
            reader.next().await,
            Some(Err(WireError::BadFrameSize(111)))
        ));
    }

    #[tokio::test]
    async fn lowered_limit_applies_to_the_next_frame() {
        let mut bytes = encode(&TClunk { tag: 1, fid: 0 }.into()).unwrap();
        bytes.extend(encode(&TClunk { tag: 2, fid: 0 }.into()).unwrap());
        let limit = FrameLimit::new(u32::MAX);
        let mut reader = frames(&bytes, limit.clone());

        assert!(matches!(reader.next().await, Some(Ok(Fcall::TClunk(_)))));
        limit.set(8);
        assert!(matches!(
            reader.next().await,
            Some(Err(WireError::BadFrameSize(11)))
        ));
    }

    #[tokio::test]
    async fn sink_writes_encoded_frames() {
        let msg: Fcall = RAttach { tag: 2, qid: qid(1) }.into();
        let mut writer = FramedWrite::new(Vec::new(), P9Codec::default());
        writer.send(msg.clone()).await.unwrap();
        assert_eq!(writer.get_ref(), &encode(&msg).unwrap());
    }

    #[tokio::test]
    async fn sink_encoding_failure_writes_nothing() {
        let mut writer = FramedWrite::new(Vec::new(), P9Codec::default());
        let too_big: Fcall = RError {
            tag: 1,
            ename: "e".repeat(MAX_STR_SIZE + 1),
        }
        .into();
        assert!(matches!(
            writer.send(too_big).await,
            Err(WireError::StringTooBig(_))
        ));
        writer.send(RFlush { tag: 1 }.into()).await.unwrap();
        assert_eq!(writer.get_ref(), &encode(&RFlush { tag: 1 }.into()).unwrap());
    }

    /// Sink that stops accepting bytes after `limit`.
    struct Stingy {
        limit: usize,
    }

    impl AsyncWrite for Stingy {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.limit -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn short_write_is_reported() {
        let msg: Fcall = TClunk { tag: 1, fid: 2 }.into();
        let mut writer = FramedWrite::new(Stingy { limit: 5 }, P9Codec::default());
        assert!(matches!(
            writer.send(msg).await,
            Err(WireError::CouldNotWriteAll)
        ));
    }
}
