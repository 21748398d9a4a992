//! Runtime configuration for the engine and the export tool.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use clap::builder::RangedU64ValueParser;

use crate::protocol::DEFAULT_MSIZE;

/// Depth of the queues between the reader, handler and writer stages.
pub const DEFAULT_QUEUE_DEPTH: usize = 10;

/// Largest frame accepted before version negotiation has settled on one.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1 << 20;

/// Tuning for one connection pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeConfig {
    pub queue_depth: usize,
    pub max_frame_size: u32,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Export a directory over 9P2000.
#[derive(Clone, Debug, Parser)]
#[command(name = "p9export", version, about)]
pub struct ExportArgs {
    /// Port to serve on
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// Directory to export
    #[arg(long)]
    pub directory: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub address: IpAddr,

    /// Largest message size offered during version negotiation
    #[arg(long, default_value_t = DEFAULT_MSIZE)]
    pub msize: u32,

    /// Depth of the per-connection request and response queues
    #[arg(
        long,
        default_value_t = DEFAULT_QUEUE_DEPTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub queue_depth: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl ExportArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn serve_config(&self) -> ServeConfig {
        ServeConfig {
            queue_depth: self.queue_depth,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE.max(self.msize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = ExportArgs::try_parse_from(["p9export", "--directory", "/srv"]).unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.directory, Some(PathBuf::from("/srv")));
        assert_eq!(args.listen_addr().to_string(), "0.0.0.0:9000");
        assert_eq!(args.msize, 65535);
        assert_eq!(args.serve_config(), ServeConfig::default());
    }

    #[test]
    fn overrides() {
        let args = ExportArgs::try_parse_from([
            "p9export",
            "--port",
            "5640",
            "--directory",
            "notes",
            "--address",
            "127.0.0.1",
            "--queue-depth",
            "2",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.listen_addr().to_string(), "127.0.0.1:5640");
        assert_eq!(args.serve_config().queue_depth, 2);
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn directory_is_optional_at_parse_time() {
        let args = ExportArgs::try_parse_from(["p9export"]).unwrap();
        assert!(args.directory.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ExportArgs::try_parse_from(["p9export", "--port", "nope"]).is_err());
        assert!(ExportArgs::try_parse_from(["p9export", "--queue-depth", "0"]).is_err());
    }
}
