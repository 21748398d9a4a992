//! Export a directory over 9P2000.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use p9srv::{DirServer, ExportArgs, transport};

#[tokio::main]
async fn main() -> ExitCode {
    let args = ExportArgs::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&args.log_level),
    )
    .init();

    let Some(directory) = args.directory.clone() else {
        eprintln!("choose a directory to serve\n");
        let _ = ExportArgs::command().write_help(&mut std::io::stderr());
        return ExitCode::FAILURE;
    };

    let server = match DirServer::new(directory, args.msize) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            error!("Couldn't create file server: {err}");
            return ExitCode::FAILURE;
        }
    };

    let addr = args.listen_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Couldn't listen on {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            on_signal.cancel();
        }
    });

    match transport::serve(listener, server, args.serve_config(), shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
