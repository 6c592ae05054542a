//! WebSocket front of the relay.

use crate::relay::{ClientId, Outbox, Relay};
use futures_util::{SinkExt, StreamExt};
use poolcalc_core::{RelayEvent, RelayRequest};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;

/// Relay bookkeeping plus one outgoing queue per connected socket.
struct Broker {
    relay: Relay,
    outboxes: HashMap<ClientId, mpsc::UnboundedSender<RelayEvent>>,
}

impl Broker {
    fn deliver(&self, out: Outbox) {
        for (client, event) in out {
            if let Some(tx) = self.outboxes.get(&client) {
                // The receiver only goes away while its socket is shutting down.
                let _ = tx.send(event);
            }
        }
    }
}

type SharedBroker = Arc<RwLock<Broker>>;

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);
    serve(listener).await
}

/// Accept broker clients on an already bound listener.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    let broker = Arc::new(RwLock::new(Broker {
        relay: Relay::new(),
        outboxes: HashMap::new(),
    }));

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let broker = broker.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, broker).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    broker: SharedBroker,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<RelayEvent>();
    let client = {
        let mut b = broker.write().await;
        let client = b.relay.join();
        b.outboxes.insert(client, tx);
        client
    };

    tracing::debug!("New connection from {} as client {}", addr, client);

    let result = async {
        loop {
            tokio::select! {
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            tracing::debug!("WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                    };

                    match msg {
                        Message::Text(text) => {
                            let request: RelayRequest = match serde_json::from_str(&text) {
                                Ok(r) => r,
                                Err(e) => {
                                    tracing::warn!("Invalid message from {}: {}", addr, e);
                                    continue;
                                }
                            };
                            let mut b = broker.write().await;
                            let out = b.relay.handle(client, request);
                            b.deliver(out);
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                event = rx.recv() => {
                    let Some(event) = event else { break };
                    sink.send(Message::Text(serde_json::to_string(&event)?.into())).await?;
                }
            }
        }
        anyhow::Ok(())
    }
    .await;

    {
        let mut b = broker.write().await;
        b.outboxes.remove(&client);
        let out = b.relay.leave(client);
        b.deliver(out);
    }

    tracing::debug!("Connection closed: {}", addr);
    result
}
