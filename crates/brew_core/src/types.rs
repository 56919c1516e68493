//! Tipos de dados da telemetria da máquina de café.
//!
//! O [`BrewSnapshot`] é um valor imutável: cada frame decodificado gera um
//! snapshot novo que substitui o anterior por inteiro.

use serde::{Deserialize, Serialize};
use std::time::Instant;

// ──────────────────────────────────────────────
// Fase da extração
// ──────────────────────────────────────────────

/// Fase atual reportada pelo controlador (1 byte no fio).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrewState {
    #[default]
    Idle,
    Preinfusion,
    Brewing,
    Dripping,
    /// Byte fora de `0..=3`. Preservado para que peso/fluxo continuem visíveis
    /// com firmwares mais novos.
    Unknown(u8),
}

impl BrewState {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Idle,
            1 => Self::Preinfusion,
            2 => Self::Brewing,
            3 => Self::Dripping,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Preinfusion => 1,
            Self::Brewing => 2,
            Self::Dripping => 3,
            Self::Unknown(other) => other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preinfusion => "preinfusion",
            Self::Brewing => "brewing",
            Self::Dripping => "dripping",
            Self::Unknown(_) => "unknown",
        }
    }
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Estado pontual do controlador, decodificado de um frame de 19 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrewSnapshot {
    /// Peso na balança (g)
    pub weight: f32,
    /// Fluxo instantâneo (g/s)
    pub flow_rate: f32,
    /// Rendimento alvo definido pelo operador (g)
    pub target: f32,
    /// Tempo desde o início da fase atual (ms)
    pub elapsed_ms: u32,
    pub state: BrewState,
    /// Extração em andamento
    pub is_active: bool,
    /// Balança do próprio dispositivo reportando
    pub is_scale_connected: bool,
    /// Instante de recebimento no cliente. Não vai no fio.
    #[serde(skip)]
    pub received_at: Option<Instant>,
}

impl BrewSnapshot {
    /// `true` se todos os campos transmitidos estão no valor padrão.
    pub fn is_default(&self) -> bool {
        Self {
            received_at: None,
            ..*self
        } == Self::default()
    }

    /// Copia o snapshot carimbando o instante de recebimento.
    pub fn received(self, at: Instant) -> Self {
        Self {
            received_at: Some(at),
            ..self
        }
    }
}

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Estado da conexão com o dispositivo. Só o gerenciador de conexão escreve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Desconexão voluntária por inatividade do usuário.
    Suspended,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        self == Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// O que a store publica para os consumidores: snapshot + estado da conexão.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveStatus {
    pub snapshot: BrewSnapshot,
    pub connection: ConnectionState,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
