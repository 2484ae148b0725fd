//! TCP transport for rebroadcast sinks.
//!
//! Each sink gets one listener task. The task owns the receiving end of the
//! sink's queue and copies every chunk to each connected client through that
//! client's own bounded queue, so one slow or dead client never holds up the
//! others.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use basestation_core::config::SinkConfig;
use basestation_core::Dispatcher;

/// Chunks buffered per client before new ones are dropped for that client.
pub const CLIENT_QUEUE_DEPTH: usize = 1024;

struct Client {
    peer: SocketAddr,
    tx: mpsc::Sender<Vec<u8>>,
}

/// A sink whose listener is bound and registered with the dispatcher.
pub struct BoundSink {
    pub name: String,
    pub local_addr: SocketAddr,
    pub task: JoinHandle<()>,
}

/// Bind every configured sink, register it with `dispatcher`, and start
/// serving clients.
pub async fn bind_sinks(
    sinks: &[SinkConfig],
    queue_depth: usize,
    dispatcher: &Arc<Dispatcher>,
) -> Result<Vec<BoundSink>> {
    let mut bound = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let listener = TcpListener::bind(&sink.listen)
            .await
            .with_context(|| format!("binding sink {} on {}", sink.name, sink.listen))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(queue_depth);
        dispatcher.add_sink(sink.name.clone(), &sink.format, tx);

        info!(sink = %sink.name, format = %sink.format, addr = %local_addr, "sink listening");
        let task = tokio::spawn(serve_sink(
            sink.name.clone(),
            listener,
            rx,
            CLIENT_QUEUE_DEPTH,
        ));
        bound.push(BoundSink {
            name: sink.name.clone(),
            local_addr,
            task,
        });
    }
    Ok(bound)
}

/// Accept clients on `listener` and forward every chunk from `rx` to all of
/// them. Returns when the sink's queue is closed, i.e. the sink was removed.
pub async fn serve_sink(
    name: String,
    listener: TcpListener,
    mut rx: mpsc::Receiver<Vec<u8>>,
    client_queue: usize,
) {
    let mut clients: Vec<Client> = Vec::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(sink = %name, %peer, "client connected");
                    clients.push(spawn_client(&name, stream, peer, client_queue));
                }
                Err(e) => warn!(sink = %name, error = %e, "accept failed"),
            },
            chunk = rx.recv() => {
                let Some(chunk) = chunk else {
                    break;
                };
                clients.retain(|client| match client.tx.try_send(chunk.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        debug!(sink = %name, peer = %client.peer, "client queue full, chunk dropped");
                        true
                    }
                    Err(TrySendError::Closed(_)) => {
                        info!(sink = %name, peer = %client.peer, "client disconnected");
                        false
                    }
                });
            }
        }
    }

    info!(sink = %name, clients = clients.len(), "sink closed");
}

fn spawn_client(sink: &str, mut stream: TcpStream, peer: SocketAddr, depth: usize) -> Client {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(depth);
    let sink = sink.to_string();
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = stream.write_all(&chunk).await {
                warn!(sink = %sink, %peer, error = %e, "client write failed, dropping client");
                return;
            }
        }
    });
    Client { peer, tx }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
