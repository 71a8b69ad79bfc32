/*
 * main.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Raven, a multi-tenant IMAP4rev1 mail-access server.
 *
 * Raven is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Raven is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Raven.  If not, see <http://www.gnu.org/licenses/>.
 */

//! `raven-server`: binds the plaintext/STARTTLS and implicit-TLS listeners,
//! accepts connections, and hands each off to [`raven_core::run_connection`]
//! on its own task. One process serves every tenant; the store and identity
//! service distinguish them.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use raven_core::{load_server_config, Config, MemStore};

#[derive(Parser)]
#[command(name = "raven-server", about = "Raven IMAP4rev1 mail-access server")]
struct Args {
    /// Path to raven.yaml; overrides the built-in discovery search path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "raven_core=info,raven_server=info",
        1 => "raven_core=debug,raven_server=debug",
        _ => "raven_core=trace,raven_server=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    raven_core::install_crypto_provider();

    let config = Arc::new(match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    });

    let tls_acceptor = build_tls_acceptor(&config)?;
    let store = Arc::new(MemStore::new());

    let plain_listener = TcpListener::bind(config.listen.plain_addr.as_str()).await?;
    info!(addr = %config.listen.plain_addr, "listening for plaintext/STARTTLS connections");

    let tls_listener = if tls_acceptor.is_some() {
        let listener = TcpListener::bind(config.listen.tls_addr.as_str()).await?;
        info!(addr = %config.listen.tls_addr, "listening for implicit TLS connections");
        Some(listener)
    } else {
        warn!("no TLS certificate configured; implicit TLS listener disabled");
        None
    };

    let plain_task = tokio::spawn(accept_loop(
        plain_listener,
        store.clone(),
        config.clone(),
        tls_acceptor.clone(),
        false,
    ));

    if let Some(listener) = tls_listener {
        let tls_task = tokio::spawn(accept_loop(
            listener,
            store.clone(),
            config.clone(),
            tls_acceptor.clone(),
            true,
        ));
        tokio::select! {
            res = plain_task => res??,
            res = tls_task => res??,
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        }
    } else {
        tokio::select! {
            res = plain_task => res??,
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        }
    }

    Ok(())
}

fn build_tls_acceptor(config: &Config) -> anyhow::Result<Option<Arc<TlsAcceptor>>> {
    let (Some(cert), Some(key)) = (&config.listen.tls_cert_path, &config.listen.tls_key_path) else {
        return Ok(None);
    };
    let acceptor = load_server_config(cert, key)?;
    Ok(Some(Arc::new(acceptor)))
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<MemStore>,
    config: Arc<Config>,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
    implicit_tls: bool,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let store = store.clone();
        let config = config.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            let connection = if implicit_tls {
                let acceptor = tls_acceptor
                    .as_ref()
                    .expect("implicit TLS listener running without a configured acceptor");
                match raven_core::Connection::plain(socket).upgrade(acceptor).await {
                    Ok(c) => c,
                    Err(e) => {
                        error!(%peer, error = %e, "TLS handshake failed");
                        return;
                    }
                }
            } else {
                raven_core::Connection::plain(socket)
            };

            if let Err(e) = raven_core::run_connection(connection, store, config, tls_acceptor, peer).await {
                error!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}
