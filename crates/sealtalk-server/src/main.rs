//! SealTalk relay server
//!
//! Console driver: reads `<user_id> <name> <input>` lines from stdin and
//! writes one line per outbound action to stdout. Logs go to stderr.

use std::sync::Arc;

use clap::Parser;
use sealtalk_core::{CoreError, MemoryStore, Protocol, SharedStore, SystemEnv};
use sealtalk_server::{
    RedbStore, RelayService, ServerConfig, ServerError,
    console::{self, ConsoleInput},
    spawn_sweeper,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::parse();
    let protocol_config = config.protocol_config()?;
    tracing::info!(?config, "starting SealTalk relay");

    let store: SharedStore = if config.in_memory {
        Arc::new(MemoryStore::new(SystemEnv))
    } else {
        Arc::new(RedbStore::open(&config.database).map_err(CoreError::from)?)
    };
    let sweeper = spawn_sweeper(Arc::clone(&store), config.sweep_interval());

    let protocol =
        Protocol::new(store, SystemEnv, protocol_config, config.identity_secret.into_bytes());
    let service = RelayService::new(protocol);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match console::parse(&line) {
            ConsoleInput::Empty => {},
            ConsoleInput::Invalid { error } => {
                let _ = out_tx.send(format!("[error] {error}"));
            },
            ConsoleInput::Event(event) => {
                let service = service.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    for action in service.process_event(event).await {
                        let _ = out_tx.send(console::render(&action));
                    }
                });
            },
        }
    }

    tracing::info!("stdin closed, shutting down");
    service.protocol().listener.registry().shutdown().await;
    sweeper.abort();
    drop(out_tx);

    match writer.await {
        Ok(result) => result?,
        Err(e) => return Err(CoreError::TaskFailed(e.to_string()).into()),
    }
    Ok(())
}
