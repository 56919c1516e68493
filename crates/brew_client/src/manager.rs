//! Gerenciador de conexão com o controlador.
//!
//! Um único loop (`select!`) consome todos os eventos: comandos do dono,
//! sinais do ambiente, resultado da tentativa de conexão, frames do socket,
//! heartbeat, inatividade e o timer de reconexão. Só este loop escreve o
//! [`ConnectionState`] e a [`BrewDataStore`].
//!
//! ```text
//! Disconnected ──activate──▶ Connecting ──open──▶ Connected
//!      ▲                        │  ▲                 │ │
//!      │ deactivate             │  │ 1s / retomada   │ │ close, erro,
//!      │ (qualquer estado)      ▼  │                 │ │ heartbeat
//!      └────────────────── Reconnecting ◀────────────┘ │
//!                                                      │ ocioso
//!                          Suspended ◀─────────────────┘ (qualquer estado)
//!                              └── atividade/foco/online/visível ──▶ Connecting
//! ```

use crate::activity::ActivityWatcher;
use crate::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::signals::{EnvSignal, EnvironmentSignals};
use crate::store::BrewDataStore;
use crate::transport::{Connection, Inbound, Transport, TransportError};
use brew_core::protocol::{ControlWord, PING, classify_text, decode_frame};
use brew_core::{AppConfig, ConnectionState, TimingConfig};
use futures_util::future::BoxFuture;
use std::future::pending;
use std::pin::Pin;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Activate,
    Deactivate,
    Retry,
    Shutdown,
}

/// Socket aberto + heartbeat. Descartar a sessão fecha o socket e cancela
/// os timers dela.
struct Session {
    id: u64,
    connection: Connection,
    heartbeat: HeartbeatMonitor,
}

enum Event {
    Command(Option<Command>),
    Signal(Option<EnvSignal>),
    Opened(Result<Connection, TransportError>),
    Inbound(Option<Inbound>),
    Heartbeat(HeartbeatEvent),
    Idle,
    ReconnectDue,
}

type ConnectAttempt = BoxFuture<'static, Result<Connection, TransportError>>;

pub struct ConnectionManager<T: Transport> {
    url: String,
    timing: TimingConfig,
    transport: T,
    store: BrewDataStore,
    commands: UnboundedReceiver<Command>,
    signals: Option<EnvironmentSignals>,

    state: ConnectionState,
    consumer_active: bool,
    backgrounded: bool,

    attempt: Option<ConnectAttempt>,
    session: Option<Session>,
    activity: ActivityWatcher,
    reconnect_timer: Option<Pin<Box<Sleep>>>,

    next_session_id: u64,
    failed_attempts: u32,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        config: &AppConfig,
        transport: T,
        signals: EnvironmentSignals,
        store: BrewDataStore,
    ) -> (Self, ConnectionHandle) {
        let (tx, rx) = unbounded_channel();
        let handle = ConnectionHandle {
            commands: tx,
            store: store.clone(),
            task: None,
        };
        let manager = Self {
            url: config.device.endpoint_url(),
            timing: config.timing.clone(),
            transport,
            store,
            commands: rx,
            signals: Some(signals),
            state: ConnectionState::Disconnected,
            consumer_active: false,
            backgrounded: false,
            attempt: None,
            session: None,
            activity: ActivityWatcher::new(),
            reconnect_timer: None,
            next_session_id: 1,
            failed_attempts: 0,
        };
        (manager, handle)
    }

    /// Cria o gerenciador e roda o loop numa task do runtime atual.
    pub fn spawn(
        config: &AppConfig,
        transport: T,
        signals: EnvironmentSignals,
        store: BrewDataStore,
    ) -> ConnectionHandle {
        let (manager, mut handle) = Self::new(config, transport, signals, store);
        handle.task = Some(tokio::spawn(manager.run()));
        handle
    }

    /// Loop principal. Termina em `shutdown` ou quando todos os handles somem.
    pub async fn run(mut self) {
        info!("Gerenciador de conexão iniciado – endpoint {}", self.url);
        self.store.reset(ConnectionState::Disconnected);

        loop {
            let event = self.next_event().await;
            if !self.handle(event) {
                break;
            }
        }

        self.consumer_active = false;
        self.activity.stop();
        self.teardown(ConnectionState::Disconnected);
        info!("Gerenciador de conexão encerrado");
    }

    async fn next_event(&mut self) -> Event {
        let Self {
            commands,
            signals,
            attempt,
            session,
            activity,
            reconnect_timer,
            ..
        } = self;
        let (connection, heartbeat) = match session {
            Some(s) => (Some(&mut s.connection), Some(&mut s.heartbeat)),
            None => (None, None),
        };

        tokio::select! {
            biased;
            cmd = commands.recv() => Event::Command(cmd),
            signal = recv_signal(signals) => Event::Signal(signal),
            opened = finish_attempt(attempt) => Event::Opened(opened),
            // Frames antes do heartbeat: um "pong" já enfileirado vence o timeout.
            inbound = recv_inbound(connection) => Event::Inbound(inbound),
            beat = heartbeat_event(heartbeat) => Event::Heartbeat(beat),
            () = activity.idle() => Event::Idle,
            () = wait_timer(reconnect_timer) => Event::ReconnectDue,
        }
    }

    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(None) => {
                debug!("Todos os handles descartados");
                return false;
            }
            Event::Command(Some(Command::Shutdown)) => return false,
            Event::Command(Some(Command::Activate)) => self.activate(),
            Event::Command(Some(Command::Deactivate)) => self.deactivate(),
            Event::Command(Some(Command::Retry)) => self.resume("retry"),
            Event::Signal(None) => {
                debug!("Fonte de sinais do ambiente encerrada");
                self.signals = None;
            }
            Event::Signal(Some(signal)) => self.on_signal(signal),
            Event::Opened(result) => self.on_opened(result),
            Event::Inbound(inbound) => self.on_inbound(inbound),
            Event::Heartbeat(beat) => self.on_heartbeat(beat),
            Event::Idle => self.on_idle(),
            Event::ReconnectDue => self.on_reconnect_due(),
        }
        true
    }

    // ── Comandos ──

    fn activate(&mut self) {
        self.consumer_active = true;
        if !self.activity.is_running() {
            self.activity.start(self.timing.idle_threshold());
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("Já {}: ativação ignorada", self.state);
            }
            _ => {
                // Vindo de Suspended o watcher está ocioso e sem timer.
                if self.activity.is_idle() {
                    self.activity.touch();
                }
                self.begin_connect();
            }
        }
    }

    fn deactivate(&mut self) {
        if !self.consumer_active {
            return;
        }
        info!("Consumidor inativo – desconectando");
        self.consumer_active = false;
        self.activity.stop();
        self.teardown(ConnectionState::Disconnected);
    }

    /// Dica de retomada (retry explícito, foco, rede, visibilidade, atividade).
    fn resume(&mut self, reason: &str) {
        if !self.consumer_active {
            debug!("Retomada ({reason}) ignorada: consumidor inativo");
            return;
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            ConnectionState::Suspended
            | ConnectionState::Reconnecting
            | ConnectionState::Disconnected => {
                info!("Retomando conexão ({reason})");
                if self.activity.is_idle() {
                    self.activity.touch();
                }
                self.begin_connect();
            }
        }
    }

    // ── Sinais do ambiente ──

    fn on_signal(&mut self, signal: EnvSignal) {
        match signal {
            EnvSignal::UserActivity => {
                if self.activity.touch() && self.state == ConnectionState::Suspended {
                    self.resume("atividade do usuário");
                }
            }
            EnvSignal::Visibility(visible) => {
                self.backgrounded = !visible;
                if visible {
                    self.resume("visível");
                } else {
                    debug!("Em segundo plano");
                }
            }
            EnvSignal::FocusGained => self.resume("foco"),
            EnvSignal::NetworkOnline => self.resume("rede online"),
            EnvSignal::NetworkOffline => info!("Rede offline"),
        }
    }

    // ── Ciclo de vida do socket ──

    fn begin_connect(&mut self) {
        // Single-flight: no máximo uma tentativa ou sessão viva.
        if self.attempt.is_some() || self.session.is_some() {
            return;
        }
        self.reconnect_timer = None;
        self.transition(ConnectionState::Connecting);
        debug!("Tentativa de conexão #{} em {}", self.failed_attempts + 1, self.url);
        self.attempt = Some(self.transport.connect(&self.url));
    }

    fn on_opened(&mut self, result: Result<Connection, TransportError>) {
        self.attempt = None;
        match result {
            Ok(connection) => {
                let id = self.next_session_id;
                self.next_session_id += 1;

                let mut heartbeat = HeartbeatMonitor::new(
                    self.timing.heartbeat_interval(),
                    self.timing.heartbeat_timeout(),
                );
                heartbeat.arm();
                self.session = Some(Session {
                    id,
                    connection,
                    heartbeat,
                });
                if self.failed_attempts > 0 {
                    info!("Conectado após {} tentativas falhas", self.failed_attempts);
                }
                self.failed_attempts = 0;
                self.transition(ConnectionState::Connected);
                info!("Sessão #{id} aberta");
            }
            Err(e) => {
                self.failed_attempts += 1;
                warn!("{e}");
                self.connection_lost();
            }
        }
    }

    fn on_inbound(&mut self, inbound: Option<Inbound>) {
        match inbound {
            Some(Inbound::Binary(data)) => self.on_frame(&data),
            Some(Inbound::Text(text)) => match classify_text(&text) {
                ControlWord::Pong => {
                    if let Some(session) = self.session.as_mut() {
                        session.heartbeat.on_probe_ack();
                    }
                }
                ControlWord::Ping | ControlWord::Other => {
                    debug!("Texto ignorado: {text:?}");
                }
            },
            Some(Inbound::Closed(reason)) => {
                info!("Dispositivo fechou a conexão ({})", reason.as_deref().unwrap_or("sem motivo"));
                self.connection_lost();
            }
            Some(Inbound::Error(e)) => {
                warn!("Erro de transporte: {e}");
                self.connection_lost();
            }
            None => {
                info!("Socket encerrado");
                self.connection_lost();
            }
        }
    }

    fn on_frame(&mut self, data: &[u8]) {
        if self.session.is_none() {
            return;
        }
        match decode_frame(data) {
            Ok(snapshot) => {
                self.store.update(snapshot.received(Instant::now().into_std()));
            }
            Err(e) => {
                self.store.record_decode_error();
                warn!("Frame descartado: {e}");
            }
        }
    }

    fn on_heartbeat(&mut self, beat: HeartbeatEvent) {
        match beat {
            HeartbeatEvent::Probe => {
                if let Some(session) = self.session.as_ref() {
                    if !session.connection.send_text(PING) {
                        debug!("Sessão #{}: ping não enviado", session.id);
                    }
                }
            }
            HeartbeatEvent::TimedOut => {
                warn!("Heartbeat sem resposta – conexão presumida morta");
                self.teardown(ConnectionState::Reconnecting);
                self.schedule_reconnect();
            }
        }
    }

    /// Fechamento inesperado ou erro: em segundo plano espera uma retomada
    /// para não disputar o dispositivo com outras instâncias.
    fn connection_lost(&mut self) {
        self.teardown(ConnectionState::Reconnecting);
        if self.backgrounded {
            info!("Em segundo plano – aguardando retomada para reconectar");
        } else {
            self.schedule_reconnect();
        }
    }

    fn on_idle(&mut self) {
        if self.state == ConnectionState::Suspended {
            return;
        }
        info!(
            "Sem atividade por {}s – suspendendo conexão",
            self.timing.idle_threshold().as_secs()
        );
        self.teardown(ConnectionState::Suspended);
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.timing.reconnect_delay();
        debug!("Reconectando em {} ms", delay.as_millis());
        self.reconnect_timer = Some(Box::pin(sleep(delay)));
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_timer = None;
        if self.consumer_active && self.state == ConnectionState::Reconnecting {
            self.begin_connect();
        }
    }

    /// Sai de `Connected`/`Connecting` numa única etapa: desarma heartbeat,
    /// fecha o socket e zera a store antes de qualquer outro evento.
    fn teardown(&mut self, next: ConnectionState) {
        if let Some(mut session) = self.session.take() {
            session.heartbeat.disarm();
            info!("Sessão #{} encerrada", session.id);
        }
        self.attempt = None;
        self.reconnect_timer = None;

        if self.state != next {
            info!("Conexão: {} → {}", self.state, next);
        }
        self.state = next;
        self.store.reset(next);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Conexão: {} → {}", self.state, next);
        }
        self.state = next;
        self.store.set_connection(next);
    }
}

async fn recv_signal(signals: &mut Option<EnvironmentSignals>) -> Option<EnvSignal> {
    match signals {
        Some(signals) => signals.recv().await,
        None => pending().await,
    }
}

async fn finish_attempt(attempt: &mut Option<ConnectAttempt>) -> Result<Connection, TransportError> {
    match attempt {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn recv_inbound(connection: Option<&mut Connection>) -> Option<Inbound> {
    match connection {
        Some(connection) => connection.recv().await,
        None => pending().await,
    }
}

async fn heartbeat_event(heartbeat: Option<&mut HeartbeatMonitor>) -> HeartbeatEvent {
    match heartbeat {
        Some(heartbeat) => heartbeat.next_event().await,
        None => pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

// ──────────────────────────────────────────────
// Handle do dono
// ──────────────────────────────────────────────

/// Controle do gerenciador para quem o criou. Descartar o handle encerra o
/// loop; [`ConnectionHandle::shutdown`] encerra e espera.
#[derive(Debug)]
pub struct ConnectionHandle {
    commands: UnboundedSender<Command>,
    store: BrewDataStore,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// O consumidor da telemetria ficou ativo (tela montada).
    pub fn activate(&self) {
        self.send(Command::Activate);
    }

    /// O consumidor saiu (tela desmontada).
    pub fn deactivate(&self) {
        self.send(Command::Deactivate);
    }

    /// Retry explícito do usuário.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    pub fn state(&self) -> ConnectionState {
        self.store.connection()
    }

    pub fn store(&self) -> &BrewDataStore {
        &self.store
    }

    /// Cancela timers, fecha o socket e espera o loop terminar.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Task do gerenciador terminou com erro: {e}");
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Gerenciador já encerrado, comando {command:?} ignorado");
        }
    }
}
