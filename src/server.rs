//! The contract a 9P backend implements.

use async_trait::async_trait;

use crate::error::Result;
use crate::fcall::*;

/// Filesystem backend served by the dispatch engine.
///
/// There is one method per protocol verb. Each receives the per-connection
/// state created by [`connect`](Self::connect) and the typed request, and
/// returns the matching typed response. Any `Err` is sent to the client as
/// an Rerror carrying the request's tag; the connection carries on.
///
/// Backends own the mapping from fids to their resources. The engine only
/// tracks which fids are live so it can reject requests naming unknown or
/// reused fids before they reach the backend.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Per-connection bookkeeping.
    type Conn: Send + Sync + 'static;

    /// Called once for every accepted connection, before any request.
    fn connect(&self) -> Self::Conn;

    /// Called once the connection's pipeline has stopped.
    fn disconnect(&self, _conn: &Self::Conn) {}

    async fn version(&self, conn: &Self::Conn, req: TVersion) -> Result<RVersion>;

    async fn auth(&self, conn: &Self::Conn, req: TAuth) -> Result<RAuth>;

    async fn attach(&self, conn: &Self::Conn, req: TAttach) -> Result<RAttach>;

    async fn walk(&self, conn: &Self::Conn, req: TWalk) -> Result<RWalk>;

    async fn open(&self, conn: &Self::Conn, req: TOpen) -> Result<ROpen>;

    async fn create(&self, conn: &Self::Conn, req: TCreate) -> Result<RCreate>;

    async fn read(&self, conn: &Self::Conn, req: TRead) -> Result<RRead>;

    async fn write(&self, conn: &Self::Conn, req: TWrite) -> Result<RWrite>;

    /// The engine forgets the fid whatever this returns.
    async fn clunk(&self, conn: &Self::Conn, req: TClunk) -> Result<RClunk>;

    /// The engine forgets the fid whatever this returns.
    async fn remove(&self, conn: &Self::Conn, req: TRemove) -> Result<RRemove>;

    async fn stat(&self, conn: &Self::Conn, req: TStat) -> Result<RStat>;

    async fn wstat(&self, conn: &Self::Conn, req: TWStat) -> Result<RWStat>;

    /// Requests queued before the flush are still answered first.
    async fn flush(&self, conn: &Self::Conn, req: TFlush) -> Result<RFlush>;
}
