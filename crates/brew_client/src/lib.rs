//! # Brew Client
//!
//! Cliente de telemetria em tempo real do controlador da máquina de café.
//! Mantém um WebSocket com o dispositivo, decodifica os frames de status e
//! publica o snapshot mais recente para a UI.
//!
//! ## Módulos
//! - [`store`] – Último snapshot + estado da conexão, com assinantes
//! - [`heartbeat`] – Sonda `"ping"`/`"pong"` e detecção de conexão morta
//! - [`activity`] – Detector de inatividade do usuário
//! - [`signals`] – Sinais do ambiente (visibilidade, foco, rede, presença)
//! - [`transport`] – WebSocket (tokio-tungstenite) atrás de um trait
//! - [`manager`] – Máquina de estados da conexão

pub mod activity;
pub mod heartbeat;
pub mod manager;
pub mod signals;
pub mod store;
pub mod transport;

pub use manager::{ConnectionHandle, ConnectionManager};
pub use signals::{EnvSignal, EnvironmentSignals, SignalSender, signal_channel};
pub use store::{BrewDataStore, Subscription};
pub use transport::{Transport, WsTransport};
