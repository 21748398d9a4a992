//! A [`Server`] that exports a host directory.
//!
//! Only the verbs needed to attach and inspect the export root are backed by
//! the host filesystem; the rest answer with [`Error::Unimplemented`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::fcall::*;
use crate::protocol::{
    DMDIR, Fid, MIN_MSIZE, NO_FID, NO_TAG, QTDIR, QTFILE, Qid, Stat, VERSION_9P2000,
    VERSION_UNKNOWN,
};
use crate::server::Server;

/// A path relative to the export root, in normalized `a/b/c` form.
///
/// The empty path is the root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServedPath(String);

impl ServedPath {
    /// Normalize a client-supplied path. Empty and `.` components are
    /// dropped; `..` is refused so a client can never leave the root.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(Error::application(format!(
                        "path `{raw}` leaves the export root"
                    )));
                }
                name => parts.push(name),
            }
        }
        Ok(ServedPath(parts.join("/")))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last component, or `/` for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("/")
    }

    fn on_host(&self, root: &Path) -> PathBuf {
        if self.is_root() {
            root.to_path_buf()
        } else {
            root.join(&self.0)
        }
    }
}

impl fmt::Display for ServedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Hands out Qids, one per served path for the life of the process.
///
/// Paths are numbered from 1 in the order they are first seen.
#[derive(Debug, Default)]
pub struct QidTable {
    inner: Mutex<QidTableInner>,
}

#[derive(Debug, Default)]
struct QidTableInner {
    issued: u64,
    qids: HashMap<ServedPath, Qid>,
}

impl QidTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qid_for(&self, path: &ServedPath, is_dir: bool) -> Qid {
        let mut inner = self.inner.lock();
        if let Some(qid) = inner.qids.get(path) {
            return *qid;
        }
        inner.issued += 1;
        let qid = Qid {
            qtype: if is_dir { QTDIR } else { QTFILE },
            version: 0,
            path: inner.issued,
        };
        inner.qids.insert(path.clone(), qid);
        qid
    }
}

/// Per-connection state of a [`DirServer`].
#[derive(Debug, Default)]
pub struct DirConn {
    unames: Mutex<Vec<String>>,
    fids: Mutex<HashMap<Fid, ServedPath>>,
}

impl DirConn {
    fn path_of(&self, fid: Fid) -> Result<ServedPath> {
        self.fids
            .lock()
            .get(&fid)
            .cloned()
            .ok_or_else(|| Error::application(format!("unknown fid {fid}")))
    }

    /// Uname this connection attached under, if any.
    pub fn uname(&self) -> Option<String> {
        self.unames.lock().last().cloned()
    }
}

/// Exports the directory tree below `root`.
#[derive(Debug)]
pub struct DirServer {
    root: PathBuf,
    msize: u32,
    qids: QidTable,
    attached: Mutex<HashSet<String>>,
}

impl DirServer {
    /// Serve `root`, offering at most `msize` bytes per message.
    pub fn new(root: impl Into<PathBuf>, msize: u32) -> Result<Self> {
        let root = root.into();
        if msize < MIN_MSIZE {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("msize {msize} is below the minimum of {MIN_MSIZE}"),
            )));
        }
        let meta = std::fs::metadata(&root).map_err(|err| {
            Error::Io(io::Error::new(
                err.kind(),
                format!("couldn't open directory `{}`: {err}", root.display()),
            ))
        })?;
        if !meta.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("`{}` is not a directory", root.display()),
            )));
        }
        info!("exporting {}", root.display());
        Ok(Self {
            root,
            msize,
            qids: QidTable::new(),
            attached: Mutex::new(HashSet::new()),
        })
    }

    async fn metadata(&self, path: &ServedPath) -> Option<Metadata> {
        tokio::fs::metadata(path.on_host(&self.root)).await.ok()
    }

    fn stat_of(&self, path: &ServedPath, meta: &Metadata, owner: &str) -> Stat {
        let qid = self.qids.qid_for(path, meta.is_dir());
        let mtime = meta.modified().map_or(0, unix_seconds);
        let atime = meta.accessed().map_or(mtime, unix_seconds);
        let mut mode = permission_bits(meta);
        if meta.is_dir() {
            mode |= DMDIR;
        }
        Stat {
            kind: 0,
            dev: 0,
            qid,
            mode,
            atime,
            mtime,
            length: if meta.is_dir() { 0 } else { meta.len() },
            name: path.name().to_string(),
            uid: owner.to_string(),
            gid: owner.to_string(),
            muid: String::new(),
        }
    }
}

fn unix_seconds(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[async_trait]
impl Server for DirServer {
    type Conn = DirConn;

    fn connect(&self) -> DirConn {
        DirConn::default()
    }

    fn disconnect(&self, conn: &DirConn) {
        let unames = std::mem::take(&mut *conn.unames.lock());
        let mut attached = self.attached.lock();
        for uname in unames {
            debug!("releasing uname {uname}");
            attached.remove(&uname);
        }
    }

    async fn version(&self, conn: &DirConn, req: TVersion) -> Result<RVersion> {
        if req.tag != NO_TAG {
            warn!("version tag should be {NO_TAG}, got {}", req.tag);
        }
        conn.fids.lock().clear();

        if req.msize < MIN_MSIZE {
            return Err(Error::application(format!(
                "msize {} is below the minimum of {MIN_MSIZE}",
                req.msize
            )));
        }
        let msize = req.msize.min(self.msize);
        let speaks_9p2000 = req.version == VERSION_9P2000
            || req
                .version
                .strip_prefix(VERSION_9P2000)
                .is_some_and(|ext| ext.starts_with('.'));
        let version = if speaks_9p2000 {
            VERSION_9P2000
        } else {
            debug!("refusing protocol version {:?}", req.version);
            VERSION_UNKNOWN
        };
        Ok(RVersion {
            tag: req.tag,
            msize,
            version: version.to_string(),
        })
    }

    async fn auth(&self, _conn: &DirConn, _req: TAuth) -> Result<RAuth> {
        Err(Error::Unimplemented("auth"))
    }

    async fn attach(&self, conn: &DirConn, req: TAttach) -> Result<RAttach> {
        if req.afid != NO_FID {
            return Err(Error::application(
                "this server does not support authentication",
            ));
        }
        let path = ServedPath::parse(&req.aname)?;
        let meta = self.metadata(&path).await.ok_or_else(|| {
            Error::application(format!("requested path `{}` not found", req.aname))
        })?;

        if !self.attached.lock().insert(req.uname.clone()) {
            return Err(Error::application(format!(
                "duplicate uname `{}`: already attached",
                req.uname
            )));
        }
        conn.unames.lock().push(req.uname.clone());

        let qid = self.qids.qid_for(&path, meta.is_dir());
        info!("{} attached to {path} as fid {}", req.uname, req.fid);
        conn.fids.lock().insert(req.fid, path);
        Ok(RAttach { tag: req.tag, qid })
    }

    async fn walk(&self, _conn: &DirConn, _req: TWalk) -> Result<RWalk> {
        Err(Error::Unimplemented("walk"))
    }

    async fn open(&self, _conn: &DirConn, _req: TOpen) -> Result<ROpen> {
        Err(Error::Unimplemented("open"))
    }

    async fn create(&self, _conn: &DirConn, _req: TCreate) -> Result<RCreate> {
        Err(Error::Unimplemented("create"))
    }

    async fn read(&self, _conn: &DirConn, _req: TRead) -> Result<RRead> {
        Err(Error::Unimplemented("read"))
    }

    async fn write(&self, _conn: &DirConn, _req: TWrite) -> Result<RWrite> {
        Err(Error::Unimplemented("write"))
    }

    async fn clunk(&self, conn: &DirConn, req: TClunk) -> Result<RClunk> {
        match conn.fids.lock().remove(&req.fid) {
            Some(_) => Ok(RClunk { tag: req.tag }),
            None => Err(Error::application(format!("unknown fid {}", req.fid))),
        }
    }

    async fn remove(&self, conn: &DirConn, req: TRemove) -> Result<RRemove> {
        // remove clunks the fid even when it fails
        conn.fids.lock().remove(&req.fid);
        Err(Error::Unimplemented("remove"))
    }

    async fn stat(&self, conn: &DirConn, req: TStat) -> Result<RStat> {
        let path = conn.path_of(req.fid)?;
        let meta = self
            .metadata(&path)
            .await
            .ok_or_else(|| Error::application(format!("{path} no longer exists")))?;
        let owner = conn.uname().unwrap_or_default();
        Ok(RStat {
            tag: req.tag,
            stat: self.stat_of(&path, &meta, &owner),
        })
    }

    async fn wstat(&self, _conn: &DirConn, _req: TWStat) -> Result<RWStat> {
        Err(Error::Unimplemented("wstat"))
    }

    async fn flush(&self, _conn: &DirConn, req: TFlush) -> Result<RFlush> {
        debug!("flush of tag {}", req.oldtag);
        Ok(RFlush { tag: req.tag })
    }
}
