//! Per-connection dispatch engine.
//!
//! Every connection runs three stages joined by bounded queues:
//!
//! * the reader decodes frames off the transport and records their tags,
//! * the handler feeds requests to the [`Server`] one at a time,
//! * the writer serializes responses and retires their tags.
//!
//! A full queue stalls the stage feeding it, so a slow backend eventually
//! stops the socket reads. Framing and protocol errors end the connection;
//! backend errors become Rerror responses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::config::ServeConfig;
use crate::error::{Error, Result, WireError};
use crate::fcall::{Fcall, RError, RVersion};
use crate::parse::{FrameLimit, P9Codec};
use crate::protocol::{Fid, HEADER_SIZE, MAX_WELEM, MsgType, NO_FID, Tag, VERSION_UNKNOWN};
use crate::server::Server;

/// A request whose response has not been written yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InFlight {
    kind: MsgType,
    flushed: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    fids: HashSet<Fid>,
    tags: HashMap<Tag, InFlight>,
}

/// Fid and tag tables of one connection, plus its frame size bound.
///
/// Shared by the three stages; every access goes through one lock, which is
/// never held across an await point.
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
    limit: FrameLimit,
}

impl Session {
    /// A session accepting frames of up to `max_frame_size` bytes until a
    /// version is negotiated.
    pub fn new(max_frame_size: u32) -> Self {
        Session {
            state: Mutex::new(SessionState::default()),
            limit: FrameLimit::new(max_frame_size),
        }
    }

    /// Record a freshly read request. Returns false if the tag was already
    /// in flight.
    pub fn begin(&self, tag: Tag, kind: MsgType) -> bool {
        let entry = InFlight {
            kind,
            flushed: false,
        };
        self.state.lock().tags.insert(tag, entry).is_none()
    }

    /// Mark `oldtag` as abandoned by the client. Returns the kind of the
    /// request if it was still outstanding.
    pub fn flush(&self, oldtag: Tag) -> Option<MsgType> {
        let mut state = self.state.lock();
        let entry = state.tags.get_mut(&oldtag)?;
        entry.flushed = true;
        Some(entry.kind)
    }

    pub fn is_flushed(&self, tag: Tag) -> bool {
        self.state
            .lock()
            .tags
            .get(&tag)
            .is_some_and(|entry| entry.flushed)
    }

    /// Retire a tag once its response is on the wire.
    pub fn finish(&self, tag: Tag) {
        self.state.lock().tags.remove(&tag);
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().tags.len()
    }

    pub fn add_fid(&self, fid: Fid) {
        self.state.lock().fids.insert(fid);
    }

    pub fn remove_fid(&self, fid: Fid) {
        self.state.lock().fids.remove(&fid);
    }

    pub fn live_fids(&self) -> usize {
        self.state.lock().fids.len()
    }

    /// Apply a version response: fids are forgotten and, if a version was
    /// agreed on, its msize bounds later frames.
    fn negotiated(&self, resp: &RVersion) {
        self.state.lock().fids.clear();
        if resp.version != VERSION_UNKNOWN {
            self.limit.set(resp.msize.max(HEADER_SIZE));
        }
    }

    /// Largest frame the reader accepts right now.
    pub fn max_frame_size(&self) -> u32 {
        self.limit.get()
    }

    fn codec(&self) -> P9Codec {
        P9Codec::new(self.limit.clone())
    }

    /// Reject requests that name fids this connection does not have, or
    /// that would overwrite a live one.
    fn check_fids(&self, msg: &Fcall) -> std::result::Result<(), String> {
        let state = self.state.lock();
        let known = |fid: Fid| {
            if state.fids.contains(&fid) {
                Ok(())
            } else {
                Err(format!("unknown fid {fid}"))
            }
        };
        let unused = |fid: Fid| {
            if state.fids.contains(&fid) {
                Err(format!("fid {fid} already in use"))
            } else {
                Ok(())
            }
        };
        match msg {
            Fcall::TAuth(req) => unused(req.afid),
            Fcall::TAttach(req) => {
                unused(req.fid)?;
                if req.afid != NO_FID {
                    known(req.afid)?;
                }
                Ok(())
            }
            Fcall::TWalk(req) => {
                known(req.fid)?;
                if req.newfid != req.fid {
                    unused(req.newfid)?;
                }
                if req.wnames.len() > MAX_WELEM {
                    return Err(format!(
                        "walk of {} names exceeds the limit of {MAX_WELEM}",
                        req.wnames.len()
                    ));
                }
                Ok(())
            }
            Fcall::TOpen(req) => known(req.fid),
            Fcall::TCreate(req) => known(req.fid),
            Fcall::TRead(req) => known(req.fid),
            Fcall::TWrite(req) => known(req.fid),
            Fcall::TClunk(req) => known(req.fid),
            Fcall::TRemove(req) => known(req.fid),
            Fcall::TStat(req) => known(req.fid),
            Fcall::TWStat(req) => known(req.fid),
            _ => Ok(()),
        }
    }
}

/// Serve one connection until the peer hangs up or a fatal error occurs.
///
/// A clean end of stream lets queued requests finish and their responses
/// drain before this returns `Ok`.
pub async fn serve_connection<S, R, W>(
    server: Arc<S>,
    reader: R,
    writer: W,
    config: &ServeConfig,
) -> Result<()>
where
    S: Server,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let conn = Arc::new(server.connect());
    let session = Arc::new(Session::new(config.max_frame_size));
    let shutdown = CancellationToken::new();
    let depth = config.queue_depth.max(1);
    let (request_tx, request_rx) = mpsc::channel(depth);
    let (response_tx, response_rx) = mpsc::channel(depth);

    let handler = tokio::spawn(handle_requests(
        server.clone(),
        conn.clone(),
        session.clone(),
        request_rx,
        response_tx,
        shutdown.clone(),
    ));
    let writer = tokio::spawn(write_responses(
        writer,
        session.clone(),
        response_rx,
        shutdown.clone(),
    ));

    let read_result = read_requests(reader, &session, request_tx, &shutdown).await;
    if read_result.is_err() {
        shutdown.cancel();
    }

    let handle_result = handler.await.map_err(|err| Error::Io(std::io::Error::other(err)));
    let write_result = writer.await.map_err(|err| Error::Io(std::io::Error::other(err)));
    debug!(
        "connection done with {} live fids and {} unanswered requests",
        session.live_fids(),
        session.in_flight()
    );
    server.disconnect(&conn);

    read_result?;
    handle_result??;
    write_result??;
    Ok(())
}

async fn read_requests<R>(
    reader: R,
    session: &Session,
    requests: mpsc::Sender<Fcall>,
    shutdown: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, session.codec());
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = frames.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            None => {
                debug!("peer closed the connection");
                return Ok(());
            }
            Some(Err(err)) => {
                error!("Reading fcall: {err}");
                return Err(err.into());
            }
        };
        debug!("<- {msg}");

        let tag = msg.tag();
        if !session.begin(tag, msg.msg_type()) {
            warn!("tag {tag} reused while its request is still in flight");
        }
        if let Fcall::TFlush(flush) = &msg {
            if let Some(kind) = session.flush(flush.oldtag) {
                debug!("{kind} tag {} flushed while outstanding", flush.oldtag);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            sent = requests.send(msg) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_requests<S: Server>(
    server: Arc<S>,
    conn: Arc<S::Conn>,
    session: Arc<Session>,
    mut requests: mpsc::Receiver<Fcall>,
    responses: mpsc::Sender<Fcall>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            msg = requests.recv() => match msg {
                Some(msg) => msg,
                None => return Ok(()),
            },
        };

        let tag = msg.tag();
        if session.is_flushed(tag) {
            debug!("tag {tag} was flushed, answering it anyway");
        }
        let response = match dispatch(server.as_ref(), &conn, &session, msg).await {
            Ok(response) => response,
            Err(err) => {
                error!("Handling fcall: {err}");
                shutdown.cancel();
                return Err(err);
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            sent = responses.send(response) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Run one request through the backend.
///
/// Only a message that is not a request fails here; backend errors come
/// back as an Rerror for the request's tag.
async fn dispatch<S: Server>(
    server: &S,
    conn: &S::Conn,
    session: &Session,
    msg: Fcall,
) -> Result<Fcall> {
    let tag = msg.tag();
    if let Err(ename) = session.check_fids(&msg) {
        debug!("tag {tag}: {ename}");
        return Ok(RError { tag, ename }.into());
    }

    let result = match msg {
        Fcall::TVersion(req) => {
            let resp = server.version(conn, req).await;
            if let Ok(resp) = &resp {
                session.negotiated(resp);
            }
            resp.map(Fcall::from)
        }
        Fcall::TAuth(req) => {
            let afid = req.afid;
            let resp = server.auth(conn, req).await;
            if resp.is_ok() {
                session.add_fid(afid);
            }
            resp.map(Fcall::from)
        }
        Fcall::TAttach(req) => {
            let fid = req.fid;
            let resp = server.attach(conn, req).await;
            if resp.is_ok() {
                session.add_fid(fid);
            }
            resp.map(Fcall::from)
        }
        Fcall::TWalk(req) => {
            let (newfid, nwname) = (req.newfid, req.wnames.len());
            let resp = server.walk(conn, req).await;
            if let Ok(resp) = &resp {
                // a partial walk leaves newfid untouched
                if resp.wqids.len() == nwname {
                    session.add_fid(newfid);
                }
            }
            resp.map(Fcall::from)
        }
        Fcall::TOpen(req) => server.open(conn, req).await.map(Fcall::from),
        Fcall::TCreate(req) => server.create(conn, req).await.map(Fcall::from),
        Fcall::TRead(req) => server.read(conn, req).await.map(Fcall::from),
        Fcall::TWrite(req) => server.write(conn, req).await.map(Fcall::from),
        Fcall::TClunk(req) => {
            let fid = req.fid;
            let resp = server.clunk(conn, req).await;
            session.remove_fid(fid);
            resp.map(Fcall::from)
        }
        Fcall::TRemove(req) => {
            let fid = req.fid;
            let resp = server.remove(conn, req).await;
            session.remove_fid(fid);
            resp.map(Fcall::from)
        }
        Fcall::TStat(req) => server.stat(conn, req).await.map(Fcall::from),
        Fcall::TWStat(req) => server.wstat(conn, req).await.map(Fcall::from),
        Fcall::TFlush(req) => server.flush(conn, req).await.map(Fcall::from),
        resp @ (Fcall::RVersion(_)
        | Fcall::RAuth(_)
        | Fcall::RAttach(_)
        | Fcall::RError(_)
        | Fcall::RFlush(_)
        | Fcall::RWalk(_)
        | Fcall::ROpen(_)
        | Fcall::RCreate(_)
        | Fcall::RRead(_)
        | Fcall::RWrite(_)
        | Fcall::RClunk(_)
        | Fcall::RRemove(_)
        | Fcall::RStat(_)
        | Fcall::RWStat(_)) => {
            return Err(Error::Protocol(format!("server received {resp}")));
        }
    };

    Ok(result.unwrap_or_else(|err| {
        info!("tag {tag}: {err}");
        RError {
            tag,
            ename: err.to_string(),
        }
        .into()
    }))
}

async fn write_responses<W>(
    writer: W,
    session: Arc<Session>,
    mut responses: mpsc::Receiver<Fcall>,
    shutdown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedWrite::new(writer, session.codec());
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            msg = responses.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let (tag, kind) = (msg.tag(), msg.msg_type());
        debug!("-> {msg}");
        let sent = match frames.send(msg).await {
            Err(err @ (WireError::StringTooBig(_) | WireError::FieldTooBig(_))) => {
                error!("Error serializing response for tag {tag}: {err}");
                let fallback = RError {
                    tag,
                    ename: format!("could not encode {kind}: {err}"),
                };
                frames.send(Fcall::from(fallback)).await
            }
            sent => sent,
        };

        if let Err(err) = sent {
            error!("Could not write response for tag {tag}: {err}");
            shutdown.cancel();
            return Err(Error::Io(match err {
                WireError::Io(io) => io,
                other => std::io::Error::other(other),
            }));
        }
        session.finish(tag);
    }

    if let Err(err) = frames.close().await {
        debug!("closing transport: {err}");
    }
    Ok(())
}
