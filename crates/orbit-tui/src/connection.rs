use std::time::Duration;

use orbit_proto::protocol::{Command, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Reads length-prefixed `Message` frames off the daemon socket.
pub struct MessageReader<R> {
    inner: R,
    read_buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Next complete message, or `None` once the daemon closes the socket.
    /// A frame that fails to parse is skipped.
    pub async fn receive_message(&mut self) -> anyhow::Result<Option<Message>> {
        loop {
            if let Some(frame_len) = Message::frame_len(&self.read_buffer) {
                let decoded = Message::decode(&self.read_buffer[..frame_len]);
                self.read_buffer.drain(..frame_len);
                match decoded {
                    Ok((msg, _)) => return Ok(Some(msg)),
                    Err(e) => {
                        warn!("dropping malformed frame: {}", e);
                        continue;
                    }
                }
            }

            let mut buf = [0u8; 4096];
            let n = self.inner.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.read_buffer.extend_from_slice(&buf[..n]);
        }
    }
}

pub async fn send_command<W: AsyncWrite + Unpin>(writer: &mut W, cmd: Command) -> anyhow::Result<()> {
    let encoded = Message::Command(cmd).encode()?;
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Keep a connection to the daemon alive for the lifetime of the widget.
/// Incoming messages go to the app; commands issued while disconnected are
/// dropped.
pub async fn run(address: String, app_tx: mpsc::Sender<AppMessage>, mut cmd_rx: mpsc::Receiver<Command>) {
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!("connected to daemon at {}", address);
                if app_tx.send(AppMessage::Connected).await.is_err() {
                    return;
                }

                let (read_half, mut write_half) = stream.into_split();
                let mut reader = MessageReader::new(read_half);

                loop {
                    tokio::select! {
                        msg = reader.receive_message() => match msg {
                            Ok(Some(Message::Broadcast(broadcast))) => {
                                if app_tx.send(AppMessage::Daemon(broadcast)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(Some(Message::Command(_))) => {}
                            Ok(None) => {
                                info!("daemon closed the connection");
                                break;
                            }
                            Err(e) => {
                                warn!("daemon read error: {}", e);
                                break;
                            }
                        },
                        cmd = cmd_rx.recv() => match cmd {
                            Some(cmd) => {
                                debug!("sending {:?}", cmd);
                                if let Err(e) = send_command(&mut write_half, cmd).await {
                                    warn!("daemon write error: {}", e);
                                    break;
                                }
                            }
                            None => return,
                        },
                    }
                }

                if app_tx.send(AppMessage::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => debug!("daemon not reachable at {}: {}", address, e),
        }

        let retry = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut retry => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => debug!("not connected, dropping {:?}", cmd),
                    None => return,
                },
            }
        }
    }
}
