//! # Brew Sim
//!
//! Emula o controlador da máquina de café: aceita clientes WebSocket,
//! transmite frames de status de 19 bytes e responde `"ping"` com `"pong"`.
//!
//! ## Uso
//! ```bash
//! brew_sim                        # bind do config.toml (0.0.0.0:8765)
//! brew_sim --bind 127.0.0.1:9000
//! brew_sim --mute-pong            # não responde ping (testa o heartbeat)
//! ```

mod profile;

use brew_core::protocol::{PING, PONG, encode_frame};
use brew_core::AppConfig;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};

/// Um log de status a cada N frames por cliente.
const LOG_EVERY: u64 = 50;

#[derive(Debug, Clone)]
struct SimSettings {
    path: String,
    frame_interval: Duration,
    target: f32,
    mute_pong: bool,
}

#[tokio::main]
async fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let args: Vec<String> = std::env::args().collect();
    let config_path = arg_value(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let sim = &config.simulator;
    let bind = arg_value(&args, "--bind").unwrap_or_else(|| sim.bind.clone());
    let settings = Arc::new(SimSettings {
        path: config.device.path.clone(),
        frame_interval: Duration::from_millis(sim.frame_interval_ms.max(1)),
        target: sim.target_grams,
        mute_pong: args.iter().any(|a| a == "--mute-pong"),
    });

    // ── Socket ──
    let listener = match TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Falha ao bind em {bind}: {e}");
            return;
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ☕ BREW SIM – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Endpoint:  ws://{bind}{}", settings.path);
    println!("  Intervalo: {} ms", settings.frame_interval.as_millis());
    println!("  Alvo:      {:.1} g", settings.target);
    println!(
        "  Ciclo:     {:.1}s",
        profile::cycle_length(settings.target).as_secs_f32()
    );
    if settings.mute_pong {
        println!("  Heartbeat: SEM PONG");
    }
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(serve_client(stream, addr, Arc::clone(&settings)));
            }
            Err(e) => {
                warn!("Erro no accept: {e}");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

async fn serve_client(stream: TcpStream, addr: SocketAddr, settings: Arc<SimSettings>) {
    let mut path = String::new();
    let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        path = req.uri().path().to_owned();
        Ok(resp)
    };
    let ws = match accept_hdr_async(stream, record_path).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake falhou com {addr}: {e}");
            return;
        }
    };
    if path != settings.path {
        warn!("Cliente {addr} usou caminho {path} (esperado {})", settings.path);
    }
    info!("Cliente conectado: {addr}");

    let (mut tx, mut rx) = ws.split();
    let mut ticker = tokio::time::interval(settings.frame_interval);
    let started = Instant::now();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = profile::snapshot_at(started.elapsed(), settings.target);
                let frame = match encode_frame(&snapshot) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("{e}");
                        break;
                    }
                };
                if tx.send(Message::Binary(frame)).await.is_err() {
                    break;
                }
                frames += 1;
                if frames % LOG_EVERY == 0 {
                    info!(
                        "→ {addr} | [{}] {:.1} g | {:.2} g/s | {:.1}s",
                        snapshot.state.label(),
                        snapshot.weight,
                        snapshot.flow_rate,
                        f64::from(snapshot.elapsed_ms) / 1000.0
                    );
                }
            }
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) if text == PING => {
                    if settings.mute_pong {
                        debug!("Ping de {addr} sem resposta (--mute-pong)");
                    } else if tx.send(Message::Text(PONG.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => debug!("Texto ignorado de {addr}: {text:?}"),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Erro no WebSocket de {addr}: {e}");
                    break;
                }
            },
        }
    }

    info!("Cliente {addr} desconectado após {frames} frames");
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
