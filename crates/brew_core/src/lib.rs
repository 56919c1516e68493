//! # Brew Core
//!
//! Crate compartilhada com os tipos, o layout binário do frame de status e a
//! configuração TOML do cliente de telemetria da máquina de café.
//!
//! ## Módulos
//! - [`types`] – Snapshot da extração e estado da conexão
//! - [`protocol`] – Decode/encode do frame de 19 bytes e palavras de controle
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use types::{BrewSnapshot, BrewState, ConnectionState, LiveStatus};
pub use protocol::{decode_frame, encode_frame, ProtocolError, FRAME_LEN};
pub use config::{AppConfig, DeviceConfig, TimingConfig, SimulatorConfig};
