//! emberworld: a line-protocol game server for a classic 2D world.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

mod action;
mod cache;
mod conditions;
mod error;
mod exchange;
mod handlers;
mod items;
mod map;
mod model;
mod progression;
mod repository;
mod server;
mod session;
mod stats;

#[cfg(test)]
mod e2e;

fn usage_and_exit() -> ! {
    eprintln!(
        "emberworld (game server)\n\n\
USAGE:\n  emberworld --id N [--addr HOST:PORT] [--timeout SECONDS] [--data PATH] [--market ID] [--debug]\n\n\
OPTIONS:\n  --id N            server id (required, >= 1)\n  --addr HOST:PORT  listen address; default 0.0.0.0:5555\n  --timeout SECS    connection timeout; default 1800\n  --data PATH       world seed file (JSON)\n  --market ID       system market id\n  --debug           verbose logging\n  -h, --help        print usage\n"
    );
    std::process::exit(2);
}

#[derive(Debug, Clone)]
struct Flags {
    id: i32,
    addr: String,
    timeout: Duration,
    data: Option<PathBuf>,
    market: Option<String>,
    debug: bool,
}

fn parse_args() -> Flags {
    let mut flags = Flags {
        id: 0,
        addr: "0.0.0.0:5555".to_string(),
        timeout: Duration::from_secs(30 * 60),
        data: None,
        market: None,
        debug: false,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--id" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                flags.id = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--addr" => {
                flags.addr = it.next().unwrap_or_else(|| usage_and_exit());
            }
            "--timeout" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                let secs: u64 = v.parse().unwrap_or_else(|_| usage_and_exit());
                flags.timeout = Duration::from_secs(secs);
            }
            "--data" => {
                flags.data = Some(PathBuf::from(it.next().unwrap_or_else(|| usage_and_exit())));
            }
            "--market" => {
                flags.market = Some(it.next().unwrap_or_else(|| usage_and_exit()));
            }
            "--debug" => flags.debug = true,
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    if flags.id < 1 {
        usage_and_exit();
    }

    flags
}

#[tokio::main]
async fn main() {
    let flags = parse_args();

    let default_filter = if flags.debug {
        "debug,emberworld=debug"
    } else {
        "info,emberworld=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(flags).await {
        let err = format!("{e:#}");
        error!(err = %err, "server exited with error");
        std::process::exit(1);
    }
}

async fn run(flags: Flags) -> anyhow::Result<()> {
    info!(id = flags.id, "initiating game server");

    let repo = match &flags.data {
        Some(path) => repository::Repository::load(path)?,
        None => repository::Repository::from_seed(repository::Seed::default()),
    };

    let server = Arc::new(
        server::Server::new(
            server::Config {
                id: flags.id,
                addr: flags.addr.clone(),
                conn_timeout: flags.timeout,
                ticket_dur: Duration::from_secs(20),
                system_market_id: flags.market.clone(),
            },
            repo,
        )
        .await?,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt signal");
            let _ = shutdown_tx.send(true);
        }
    });

    server.listen_and_serve(shutdown_rx).await
}
