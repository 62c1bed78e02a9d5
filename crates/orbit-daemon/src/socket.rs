use crate::core::CoreEvent;
use crate::BroadcastMessage;
use orbit_proto::protocol::{Broadcast, Command, DisplayState, Message, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
    display_rx: watch::Receiver<DisplayState>,
    event_tx: mpsc::Sender<CoreEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);

        let mut client_id = 0usize;

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let display_rx = display_rx.clone();
                    let evt_tx = event_tx.clone();
                    let bcast_rx = broadcast_tx.subscribe();
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            _ = handle_client(stream, display_rx, id, evt_tx, bcast_rx) => {}
                        }
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    display_rx: watch::Receiver<DisplayState>,
    client_id: usize,
    event_tx: mpsc::Sender<CoreEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Hello carries the current snapshot so the widget can render at once.
    if let Ok(encoded) = encode_hello(&display_rx) {
        if write_half.write_all(&encoded).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        for cmd in take_commands(&mut read_buf, client_id) {
                            info!("Client {} sent command: {:?}", client_id, cmd);

                            if event_tx.send(CoreEvent::ClientCommand(cmd)).await.is_err() {
                                warn!("CoreEvent channel closed");
                                return;
                            }

                            if let Ok(encoded) = encode_display(&display_rx) {
                                if write_half.write_all(&encoded).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(BroadcastMessage::DisplayUpdated) => {
                        if let Ok(encoded) = encode_display(&display_rx) {
                            if write_half.write_all(&encoded).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(BroadcastMessage::Log(message)) => {
                        let broadcast = Broadcast::Log { message };
                        if let Ok(encoded) = Message::Broadcast(broadcast).encode() {
                            let _ = write_half.write_all(&encoded).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        if let Ok(encoded) = encode_display(&display_rx) {
                            let _ = write_half.write_all(&encoded).await;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

/// Drain every complete frame from `read_buf`.  Frames that fail to parse
/// are dropped; a partial frame stays buffered for the next read.
fn take_commands(read_buf: &mut Vec<u8>, client_id: usize) -> Vec<Command> {
    let mut commands = Vec::new();
    while let Some(frame_len) = Message::frame_len(read_buf) {
        let decoded = Message::decode(&read_buf[..frame_len]);
        read_buf.drain(..frame_len);
        match decoded {
            Ok((Message::Command(cmd), _)) => commands.push(cmd),
            Ok((Message::Broadcast(_), _)) => {}
            Err(e) => warn!("Client {} sent a malformed frame: {}", client_id, e),
        }
    }
    commands
}

fn encode_hello(display_rx: &watch::Receiver<DisplayState>) -> anyhow::Result<Vec<u8>> {
    let display = display_rx.borrow().clone();
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        display,
    })
    .encode()
}

fn encode_display(display_rx: &watch::Receiver<DisplayState>) -> anyhow::Result<Vec<u8>> {
    let data = display_rx.borrow().clone();
    Message::Broadcast(Broadcast::Display { data }).encode()
}
