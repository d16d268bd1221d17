use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use args::Args;
use clap::Parser;
use config::Config;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = args.config()?;
    let warnings = config.validate();

    for warning in &warnings {
        log::warn!("{warning}");
    }

    if args.check {
        if warnings.is_empty() {
            log::info!("Configuration at {} is valid", args.config.display());
        }

        return Ok(());
    }

    let shutdown_signal = CancellationToken::new();

    tokio::spawn({
        let shutdown_signal = shutdown_signal.clone();

        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Shutdown requested"),
                Err(e) => log::error!("Failed to listen for the shutdown signal: {e}"),
            }

            shutdown_signal.cancel();
        }
    });

    if let Err(e) = server::serve(serve_config(&args, config, shutdown_signal)).await {
        log::error!("Server failed to start: {e}");
        std::process::exit(1);
    }

    Ok(())
}

fn serve_config(args: &Args, config: Config, shutdown_signal: CancellationToken) -> ServeConfig {
    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8000)));

    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
    }
}
