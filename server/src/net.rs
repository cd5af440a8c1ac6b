//! Connection layer: accepts transport connections, frames messages, and
//! routes traffic between clients and the engine.
//!
//! Each accepted connection gets its own read task (this module's
//! `handle_connection`) and a writer task draining the session's outbound
//! queue, so one stalled client can never hold up the tick clock or another
//! connection. Failures are local: a bad frame or broken socket tears down
//! exactly one session.

use crate::error::ServerError;
use crate::registry::{SharedRegistry, OUTBOUND_QUEUE};
use crate::sim::GameCommand;
use crate::tls::TLS_HANDSHAKE_BYTE;
use crate::world::PlayerId;
use log::{debug, info, warn};
use shared::protocol::{decode_client_line, encode_line, ClientMessage, ServerMessage};
use shared::Vec2;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_rustls::TlsAcceptor;

/// How long a fresh connection gets to present a valid join.
const JOIN_DEADLINE: Duration = Duration::from_secs(10);
/// A connection with no inbound traffic for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> ClientStream for T {}

/// Encryption policy for incoming connections. A failed handshake is either
/// refused or, when fallback is explicitly permitted, served plaintext —
/// never a silent downgrade.
#[derive(Clone)]
pub struct TlsPolicy {
    acceptor: Option<TlsAcceptor>,
    allow_plain: bool,
}

impl TlsPolicy {
    /// Plaintext only.
    pub fn disabled() -> Self {
        TlsPolicy {
            acceptor: None,
            allow_plain: false,
        }
    }

    /// TLS required; non-TLS clients are refused.
    pub fn required(acceptor: TlsAcceptor) -> Self {
        TlsPolicy {
            acceptor: Some(acceptor),
            allow_plain: false,
        }
    }

    /// TLS preferred, plaintext clients tolerated.
    pub fn with_fallback(acceptor: TlsAcceptor) -> Self {
        TlsPolicy {
            acceptor: Some(acceptor),
            allow_plain: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.acceptor.is_some()
    }
}

/// Accept loop. Each connection runs independently; its errors are logged
/// here and never propagate past its own task.
pub async fn run(
    listener: TcpListener,
    registry: SharedRegistry,
    commands: mpsc::Sender<GameCommand>,
    policy: TlsPolicy,
) -> io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        debug!("Accepted connection from {}", addr);

        let registry = registry.clone();
        let commands = commands.clone();
        let policy = policy.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, addr, registry, commands, policy).await {
                match e {
                    ServerError::CapacityExceeded => {
                        info!("Rejected join from {}: server is full", addr)
                    }
                    other => warn!("Connection {} closed: {}", addr, other),
                }
            }
        });
    }
}

/// Wraps the raw socket according to the TLS policy.
async fn negotiate(
    socket: TcpStream,
    addr: SocketAddr,
    policy: &TlsPolicy,
) -> Result<Box<dyn ClientStream>, ServerError> {
    let acceptor = match &policy.acceptor {
        None => return Ok(Box::new(socket)),
        Some(acceptor) => acceptor,
    };

    if policy.allow_plain {
        // A TLS client leads with a handshake record; anything else is a
        // plaintext peer we are allowed to serve directly.
        let mut probe = [0u8; 1];
        let n = socket.peek(&mut probe).await?;
        if n == 0 {
            return Err(ServerError::TransportFailure(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during negotiation",
            )));
        }
        if probe[0] != TLS_HANDSHAKE_BYTE {
            info!("Serving {} over plaintext (fallback permitted)", addr);
            return Ok(Box::new(socket));
        }
    }

    let stream = acceptor
        .accept(socket)
        .await
        .map_err(ServerError::TlsHandshakeFailure)?;
    debug!("TLS handshake complete with {}", addr);
    Ok(Box::new(stream))
}

/// Full lifecycle of one client connection: negotiate, join, pump messages,
/// clean up exactly once.
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    registry: SharedRegistry,
    commands: mpsc::Sender<GameCommand>,
    policy: TlsPolicy,
) -> Result<(), ServerError> {
    let stream = negotiate(socket, addr, &policy).await?;
    let (read_half, write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    let first = match timeout(JOIN_DEADLINE, lines.next_line()).await {
        Err(_) => {
            return Err(ServerError::ProtocolViolation(
                "no join within deadline".to_string(),
            ))
        }
        Ok(Ok(None)) => return Ok(()),
        Ok(Ok(Some(line))) => line,
        Ok(Err(e)) => return Err(ServerError::TransportFailure(e)),
    };
    let (name, color) = parse_join(&first)?;

    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let writer = tokio::spawn(write_frames(write_half, rx));

    let registered = registry
        .write()
        .await
        .register(name.clone(), color.clone(), tx.clone());
    let player_id = match registered {
        Ok(id) => id,
        Err(e) => {
            // Session was never created; tell the client why and hang up.
            if let Ok(frame) = encode_line(&ServerMessage::JoinReject {
                reason: e.to_string(),
            }) {
                let _ = tx.send(frame).await;
            }
            drop(tx);
            let _ = writer.await;
            return Err(e);
        }
    };

    if let Ok(frame) = encode_line(&ServerMessage::JoinAck { player_id }) {
        let _ = tx.send(frame).await;
    }

    if commands
        .send(GameCommand::Join {
            id: player_id,
            name: name.clone(),
            color,
        })
        .await
        .is_err()
    {
        // Simulation loop is gone; nothing to play on.
        registry.write().await.unregister(player_id);
        drop(tx);
        let _ = writer.await;
        return Ok(());
    }
    info!("Player {} ({}) joined from {}", player_id, name, addr);

    let result = read_frames(&mut lines, player_id, &registry).await;

    teardown(player_id, &registry, &commands).await;
    drop(tx);
    let _ = writer.await;
    result
}

/// Validates the handshake frame: must be a `join` with a non-empty name.
fn parse_join(line: &str) -> Result<(String, String), ServerError> {
    match decode_client_line(line) {
        Ok(ClientMessage::Join { name, color }) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                Err(ServerError::ProtocolViolation(
                    "join requires a non-empty name".to_string(),
                ))
            } else {
                Ok((name, color))
            }
        }
        Ok(_) => Err(ServerError::ProtocolViolation(
            "first message must be join".to_string(),
        )),
        Err(e) => Err(ServerError::ProtocolViolation(e.to_string())),
    }
}

/// Inbound pump for a joined player. Returns `Ok` for every orderly way a
/// client can go away (leave, EOF, idle timeout) and `Err` for violations
/// and transport failures; either way the caller tears the session down.
async fn read_frames<R>(
    lines: &mut Lines<BufReader<R>>,
    id: PlayerId,
    registry: &SharedRegistry,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = match timeout(IDLE_TIMEOUT, lines.next_line()).await {
            Err(_) => {
                debug!("Player {} idle timeout", id);
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(line))) => line,
            Ok(Err(e)) => return Err(ServerError::TransportFailure(e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode_client_line(&line) {
            Ok(ClientMessage::Input { dx, dy }) => {
                if !dx.is_finite() || !dy.is_finite() {
                    return Err(ServerError::ProtocolViolation(
                        "non-finite input heading".to_string(),
                    ));
                }
                registry.write().await.record_input(id, Vec2::new(dx, dy));
            }
            Ok(ClientMessage::Chat { text }) => {
                let reg = registry.read().await;
                let name = reg.name_of(id).unwrap_or("unknown").to_string();
                if let Ok(frame) = encode_line(&ServerMessage::ChatRelay {
                    player_id: id,
                    name,
                    text,
                }) {
                    reg.broadcast(&frame);
                }
            }
            Ok(ClientMessage::Leave) => return Ok(()),
            Ok(ClientMessage::Join { .. }) => {
                return Err(ServerError::ProtocolViolation(
                    "duplicate join".to_string(),
                ))
            }
            Err(e) => return Err(ServerError::ProtocolViolation(e.to_string())),
        }
    }
}

/// One-way, idempotent cleanup: unregister, detach the snake, tell everyone
/// else. Safe to reach from every exit path of `handle_connection`.
async fn teardown(id: PlayerId, registry: &SharedRegistry, commands: &mpsc::Sender<GameCommand>) {
    if !registry.write().await.unregister(id) {
        return;
    }
    let _ = commands.send(GameCommand::Leave { id }).await;
    if let Ok(frame) = encode_line(&ServerMessage::PlayerLeft { player_id: id }) {
        registry.read().await.broadcast(&frame);
    }
    info!("Player {} disconnected", id);
}

/// Writer task: drains one session's outbound queue onto the socket and
/// exits when the queue closes or the peer stops accepting bytes.
async fn write_frames<W>(mut sink: W, mut frames: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if sink.write_all(frame.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = sink.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_accepts_valid_handshake() {
        let line = encode_line(&ClientMessage::Join {
            name: "ferris".to_string(),
            color: "#ff8800".to_string(),
        })
        .unwrap();

        let (name, color) = parse_join(&line).unwrap();
        assert_eq!(name, "ferris");
        assert_eq!(color, "#ff8800");
    }

    #[test]
    fn test_parse_join_trims_and_rejects_empty_names() {
        let line = encode_line(&ClientMessage::Join {
            name: "  padded  ".to_string(),
            color: "red".to_string(),
        })
        .unwrap();
        assert_eq!(parse_join(&line).unwrap().0, "padded");

        let blank = encode_line(&ClientMessage::Join {
            name: "   ".to_string(),
            color: "red".to_string(),
        })
        .unwrap();
        assert!(matches!(
            parse_join(&blank),
            Err(ServerError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_parse_join_rejects_other_messages() {
        let input = encode_line(&ClientMessage::Input { dx: 1.0, dy: 0.0 }).unwrap();
        assert!(matches!(
            parse_join(&input),
            Err(ServerError::ProtocolViolation(_))
        ));

        assert!(matches!(
            parse_join("garbage"),
            Err(ServerError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_tls_policy_flags() {
        let policy = TlsPolicy::disabled();
        assert!(!policy.is_enabled());
        assert!(!policy.allow_plain);
    }

    #[tokio::test]
    async fn test_write_frames_delivers_and_stops_on_close() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);

        let writer = tokio::spawn(write_frames(server, rx));

        tx.send("one\n".to_string()).await.unwrap();
        tx.send("two\n".to_string()).await.unwrap();
        drop(tx);
        writer.await.unwrap();

        let mut received = String::new();
        use tokio::io::AsyncReadExt;
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_read_frames_records_last_input() {
        use crate::registry::SessionRegistry;
        use std::sync::Arc;
        use tokio::sync::RwLock;

        let registry: SharedRegistry = Arc::new(RwLock::new(SessionRegistry::new(4)));
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE);
        let id = registry
            .write()
            .await
            .register("a".to_string(), "red".to_string(), tx)
            .unwrap();

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut lines = BufReader::new(server_read).lines();

        let (mut client_write, _client_read) = {
            let (r, w) = tokio::io::split(client);
            (w, r)
        };
        let pump = tokio::spawn(async move {
            for frame in [
                encode_line(&ClientMessage::Input { dx: 1.0, dy: 0.0 }).unwrap(),
                encode_line(&ClientMessage::Input { dx: 0.0, dy: 1.0 }).unwrap(),
                encode_line(&ClientMessage::Leave).unwrap(),
            ] {
                client_write.write_all(frame.as_bytes()).await.unwrap();
            }
        });

        let result = read_frames(&mut lines, id, &registry).await;
        pump.await.unwrap();
        assert!(result.is_ok());

        let inputs = registry.write().await.take_inputs();
        assert_eq!(inputs, vec![(id, Vec2::new(0.0, 1.0))]);
    }

    #[tokio::test]
    async fn test_read_frames_rejects_garbage() {
        use crate::registry::SessionRegistry;
        use std::sync::Arc;
        use tokio::sync::RwLock;

        let registry: SharedRegistry = Arc::new(RwLock::new(SessionRegistry::new(4)));
        let (client, server) = tokio::io::duplex(1024);
        let (server_read, _server_write) = tokio::io::split(server);
        let mut lines = BufReader::new(server_read).lines();

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"{{{not json\n").await.unwrap();

        let result = read_frames(&mut lines, 1, &registry).await;
        assert!(matches!(result, Err(ServerError::ProtocolViolation(_))));
    }
}
