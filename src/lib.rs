//! 9P2000 server protocol stack.
//!
//! [`parse`] turns byte streams into typed [`Fcall`] messages and back,
//! [`session`] runs the per-connection reader/handler/writer pipeline over
//! any [`Server`] backend, and [`fs`] provides a backend that exports a
//! host directory.

pub mod config;
pub mod error;
pub mod fcall;
pub mod fs;
pub mod message;
pub mod parse;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ExportArgs, ServeConfig};
pub use error::{Error, Result, WireError};
pub use fcall::Fcall;
pub use fs::DirServer;
pub use server::Server;
pub use session::serve_connection;
