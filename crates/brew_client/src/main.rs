//! # Brew Monitor
//!
//! Consumidor headless da telemetria: conecta no controlador e registra no
//! log cada mudança de estado e o snapshot mais recente.
//!
//! ## Uso
//! ```bash
//! brew_monitor                          # host do config.toml
//! brew_monitor --host 192.168.4.1:8765  # sobrescreve o host
//! brew_monitor --config ./brew.toml
//! ```
//!
//! Cada linha digitada conta como atividade do usuário. Comandos:
//! `retry`, `hide`, `show`, `offline`, `online`.

use brew_client::{BrewDataStore, ConnectionManager, SignalSender, WsTransport, signal_channel};
use brew_core::{AppConfig, LiveStatus};
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Intervalo de leitura do channel de atualizações (como o repaint da UI).
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let args: Vec<String> = std::env::args().collect();
    let config_path = arg_value(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    if let Some(host) = arg_value(&args, "--host") {
        config.device.host = host;
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Runtime single-thread: um loop, sem paralelismo ──
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Falha ao criar runtime: {e}");
            return;
        }
    };

    runtime.block_on(run(config));
    // A leitura do stdin fica presa numa thread bloqueante; não espera por ela.
    runtime.shutdown_timeout(Duration::from_millis(500));
}

async fn run(config: AppConfig) {
    let store = BrewDataStore::new();
    let updates = store.subscribe_channel(64);
    let (signals, env) = signal_channel();

    info!("Monitor conectando em {}", config.device.endpoint_url());
    let handle = ConnectionManager::spawn(&config, WsTransport, env, store);
    handle.activate();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut last = LiveStatus::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C recebido – encerrando");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if line.trim() == "retry" {
                        handle.retry();
                    }
                    apply_command(&signals, line.trim());
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin indisponível: {e}");
                    stdin_open = false;
                }
            },
            _ = poll.tick() => poll_updates(&updates, &mut last),
        }
    }

    handle.shutdown().await;
}

/// Linha digitada = presença do usuário, mais os comandos de simulação de ambiente.
fn apply_command(signals: &SignalSender, command: &str) {
    signals.activity();
    match command {
        "hide" => {
            signals.visibility(false);
        }
        "show" => {
            signals.visibility(true);
        }
        "offline" => {
            signals.offline();
        }
        "online" => {
            signals.online();
        }
        _ => {}
    }
}

/// Drena o channel, registra mudanças de conexão e o snapshot mais recente.
fn poll_updates(updates: &Receiver<LiveStatus>, last: &mut LiveStatus) {
    let mut latest = None;
    for status in updates.try_iter() {
        if status.connection != last.connection {
            info!("Conexão: {}", status.connection);
        }
        *last = status;
        latest = Some(status);
    }

    if let Some(status) = latest.filter(|s| s.connection.is_live() && !s.snapshot.is_default()) {
        let s = status.snapshot;
        info!(
            "[{}] {:.1}/{:.1} g | {:.2} g/s | {:.1}s | ativo={} balança={}",
            s.state.label(),
            s.weight,
            s.target,
            s.flow_rate,
            f64::from(s.elapsed_ms) / 1000.0,
            s.is_active,
            s.is_scale_connected
        );
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
