//! Transporte WebSocket até o controlador.
//!
//! Uma [`Connection`] é só um par de channels: frames recebidos chegam em
//! ordem por `inbound`, textos de controle saem por `outbound`. Quem fala
//! com o socket de verdade é uma task de bombeamento por conexão; descartar
//! a `Connection` fecha o socket.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// Mensagens pendentes por direção antes de aplicar backpressure.
pub const CHANNEL_CAPACITY: usize = 64;

/// Limite para o handshake; um host inalcançável não pode segurar o
/// estado `Connecting` indefinidamente.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao conectar em {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Tempo esgotado conectando em {url}")]
    Timeout { url: String },
}

/// Evento vindo do dispositivo, na ordem do transporte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Binary(Vec<u8>),
    Text(String),
    /// Fechamento limpo, com o motivo enviado pelo dispositivo se houver
    Closed(Option<String>),
    /// Falha de transporte; o socket já está morto
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
}

/// Lado do cliente de um socket aberto.
#[derive(Debug)]
pub struct Connection {
    outbound: Sender<Outbound>,
    inbound: Receiver<Inbound>,
}

/// Lado oposto: a task de bombeamento (ou um dispositivo falso nos testes).
#[derive(Debug)]
pub struct Peer {
    pub outbound: Receiver<Outbound>,
    pub inbound: Sender<Inbound>,
}

impl Connection {
    pub fn channel(capacity: usize) -> (Connection, Peer) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Connection {
                outbound: out_tx,
                inbound: in_rx,
            },
            Peer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Envia um texto sem bloquear. `false` se o socket morreu ou a fila encheu.
    pub fn send_text(&self, text: &str) -> bool {
        match self.outbound.try_send(Outbound::Text(text.to_owned())) {
            Ok(()) => true,
            Err(e) => {
                debug!("Envio de texto descartado: {e}");
                false
            }
        }
    }

    /// Próximo evento. `None` quando a task de bombeamento terminou.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// Abre conexões com o dispositivo.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, TransportError>>;
}

// ──────────────────────────────────────────────
// WebSocket real (tokio-tungstenite)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout { url: url.clone() })?
                .map_err(|e| TransportError::Connect {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

            info!("WebSocket aberto em {url}");
            let (connection, peer) = Connection::channel(CHANNEL_CAPACITY);
            tokio::spawn(pump(ws, peer));
            Ok(connection)
        })
    }
}

type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn pump(ws: DeviceSocket, mut peer: Peer) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Binary(data))) => Inbound::Binary(data),
                    Some(Ok(Message::Text(text))) => Inbound::Text(text),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = peer.inbound.send(Inbound::Closed(reason)).await;
                        break;
                    }
                    // Ping/pong de protocolo: o tungstenite responde sozinho.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Erro no WebSocket: {e}");
                        let _ = peer.inbound.send(Inbound::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = peer.inbound.send(Inbound::Closed(None)).await;
                        break;
                    }
                };
                if peer.inbound.send(event).await.is_err() {
                    // Conexão descartada do lado do cliente.
                    let _ = sink.close().await;
                    break;
                }
            }
            out = peer.outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = peer.inbound.send(Inbound::Error(e.to_string())).await;
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }

    debug!("Task do WebSocket encerrada");
}

#[cfg(test)]
mod tests {
    use super::*;
    use brew_core::{BrewSnapshot, BrewState, encode_frame};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn frame() -> Vec<u8> {
        encode_frame(&BrewSnapshot {
            weight: 36.5,
            flow_rate: 2.1,
            target: 40.0,
            elapsed_ms: 18_000,
            state: BrewState::Brewing,
            is_active: true,
            is_scale_connected: true,
            received_at: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn delivers_frames_and_control_words() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Binary(frame())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg == Message::Text("ping".into()) {
                    ws.send(Message::Text("pong".into())).await.unwrap();
                    ws.close(None).await.unwrap();
                }
            }
        });

        let mut conn = WsTransport.connect(&format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(conn.recv().await, Some(Inbound::Binary(frame())));
        assert!(conn.send_text("ping"));
        assert_eq!(conn.recv().await, Some(Inbound::Text("pong".into())));
        assert!(matches!(conn.recv().await, Some(Inbound::Closed(_))));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_connection_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            matches!(ws.next().await, Some(Ok(Message::Close(_))) | None)
        });

        let conn = WsTransport.connect(&format!("ws://{addr}/ws")).await.unwrap();
        drop(conn);
        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsTransport.connect(&format!("ws://{addr}/ws")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
