//! Protocolo de status do controlador.
//!
//! Cada mensagem WebSocket binária carrega exatamente um frame de 19 bytes,
//! little-endian:
//!
//! ```text
//! ┌───────────┬─────────────┬───────────┬───────────────┬──────────┬────────────┬───────────┐
//! │ weight(4) │ flowRate(4) │ target(4) │ elapsedMs(4)  │ state(1) │ active(1)  │ scale(1)  │
//! │   f32     │    f32      │   f32     │     u32       │   u8     │  u8 (≠0)   │  u8 (≠0)  │
//! └───────────┴─────────────┴───────────┴───────────────┴──────────┴────────────┴───────────┘
//! ```
//!
//! Mensagens de texto são só de controle: o cliente manda `"ping"` e o
//! dispositivo responde `"pong"`. Qualquer outro texto é ignorado.
//!
//! O layout é serializado com bincode (config legada: inteiros de largura
//! fixa, little-endian, sem prefixos), que produz exatamente a tabela acima.

use crate::types::{BrewSnapshot, BrewState};
use serde::{Deserialize, Serialize};

/// Tamanho exato de um frame de status.
pub const FRAME_LEN: usize = 19;

/// Sonda de heartbeat enviada pelo cliente.
pub const PING: &str = "ping";

/// Resposta do dispositivo à sonda.
pub const PONG: &str = "pong";

/// Erros do protocolo. Os de decodificação nunca são fatais para a conexão.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame muito curto ({len} bytes, esperado {FRAME_LEN})")]
    TooShort { len: usize },

    #[error("Frame malformado: {0}")]
    Malformed(String),

    #[error("Erro ao codificar frame: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// `true` para erros vindos de um frame recebido.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::TooShort { .. } | Self::Malformed(_))
    }
}

/// Representação no fio, campo a campo na ordem dos offsets.
#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    weight: f32,
    flow_rate: f32,
    target: f32,
    elapsed_ms: u32,
    state: u8,
    is_active: u8,
    is_scale_connected: u8,
}

/// Decodifica um frame binário em [`BrewSnapshot`].
///
/// Bytes além do 19º são ignorados. `received_at` fica `None`; quem recebe
/// o frame é que carimba o instante.
pub fn decode_frame(data: &[u8]) -> Result<BrewSnapshot, ProtocolError> {
    if data.len() < FRAME_LEN {
        return Err(ProtocolError::TooShort { len: data.len() });
    }

    let wire: WireFrame = bincode::deserialize(&data[..FRAME_LEN])
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    Ok(BrewSnapshot {
        weight: wire.weight,
        flow_rate: wire.flow_rate,
        target: wire.target,
        elapsed_ms: wire.elapsed_ms,
        state: BrewState::from_byte(wire.state),
        is_active: wire.is_active != 0,
        is_scale_connected: wire.is_scale_connected != 0,
        received_at: None,
    })
}

/// Codifica um snapshot no layout de 19 bytes (usado pelo simulador).
pub fn encode_frame(snapshot: &BrewSnapshot) -> Result<Vec<u8>, ProtocolError> {
    let wire = WireFrame {
        weight: snapshot.weight,
        flow_rate: snapshot.flow_rate,
        target: snapshot.target,
        elapsed_ms: snapshot.elapsed_ms,
        state: snapshot.state.as_byte(),
        is_active: u8::from(snapshot.is_active),
        is_scale_connected: u8::from(snapshot.is_scale_connected),
    };
    let frame = bincode::serialize(&wire).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    debug_assert_eq!(frame.len(), FRAME_LEN);
    Ok(frame)
}

/// Palavra de controle recebida num frame de texto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Ping,
    Pong,
    /// Reservado para comandos futuros; ignorado.
    Other,
}

pub fn classify_text(text: &str) -> ControlWord {
    match text {
        PING => ControlWord::Ping,
        PONG => ControlWord::Pong,
        _ => ControlWord::Other,
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Monta o frame à mão, sem passar pelo encoder.
    fn raw_frame(
        weight: f32,
        flow: f32,
        target: f32,
        elapsed: u32,
        state: u8,
        active: u8,
        scale: u8,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_LEN);
        buf.extend_from_slice(&weight.to_le_bytes());
        buf.extend_from_slice(&flow.to_le_bytes());
        buf.extend_from_slice(&target.to_le_bytes());
        buf.extend_from_slice(&elapsed.to_le_bytes());
        buf.push(state);
        buf.push(active);
        buf.push(scale);
        buf
    }

    #[test]
    fn decodes_brewing_frame() {
        let frame = raw_frame(36.5, 2.1, 40.0, 18_000, 2, 1, 1);
        let s = decode_frame(&frame).unwrap();
        assert_eq!(s.weight, 36.5);
        assert_eq!(s.flow_rate, 2.1);
        assert_eq!(s.target, 40.0);
        assert_eq!(s.elapsed_ms, 18_000);
        assert_eq!(s.state, BrewState::Brewing);
        assert!(s.is_active);
        assert!(s.is_scale_connected);
        assert!(s.received_at.is_none());
    }

    #[test]
    fn encoder_matches_wire_layout() {
        let snapshot = BrewSnapshot {
            weight: 18.25,
            flow_rate: 1.5,
            target: 36.0,
            elapsed_ms: 7_250,
            state: BrewState::Preinfusion,
            is_active: true,
            is_scale_connected: false,
            received_at: None,
        };
        let encoded = encode_frame(&snapshot).unwrap();
        assert_eq!(encoded, raw_frame(18.25, 1.5, 36.0, 7_250, 1, 1, 0));
        assert_eq!(decode_frame(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn decode_inverts_encode_across_edge_values() {
        let subnormal = f32::MIN_POSITIVE / 2.0;
        let cases = [
            (BrewState::Idle, 0.0, 0.0, 0.0, 0),
            (BrewState::Preinfusion, 1.8, 0.3, 40.0, 6_000),
            (BrewState::Brewing, 36.5, 2.1, 40.0, 18_000),
            (BrewState::Dripping, 40.0, 0.0, 40.0, u32::MAX),
            (BrewState::Unknown(4), -0.7, -1.25, 18.0, 1),
            (BrewState::Unknown(255), subnormal, -subnormal, -0.0, u32::MAX - 1),
            (BrewState::Brewing, f32::MAX, f32::MIN, f32::MIN_POSITIVE, 42),
        ];

        for (state, weight, flow_rate, target, elapsed_ms) in cases {
            let flags = [(false, false), (true, false), (false, true), (true, true)];
            for (is_active, is_scale_connected) in flags {
                let snapshot = BrewSnapshot {
                    weight,
                    flow_rate,
                    target,
                    elapsed_ms,
                    state,
                    is_active,
                    is_scale_connected,
                    received_at: None,
                };
                let frame = encode_frame(&snapshot).unwrap();
                assert_eq!(frame.len(), FRAME_LEN);

                let decoded = decode_frame(&frame).unwrap();
                assert_eq!(decoded.weight.to_bits(), weight.to_bits(), "{snapshot:?}");
                assert_eq!(decoded.flow_rate.to_bits(), flow_rate.to_bits(), "{snapshot:?}");
                assert_eq!(decoded.target.to_bits(), target.to_bits(), "{snapshot:?}");
                assert_eq!(decoded.elapsed_ms, elapsed_ms);
                assert_eq!(decoded.state, state);
                assert_eq!(decoded.is_active, is_active);
                assert_eq!(decoded.is_scale_connected, is_scale_connected);
            }
        }
    }

    #[test]
    fn encode_and_decode_errors_are_distinct() {
        let short = decode_frame(&[0u8; 3]).unwrap_err();
        assert!(short.is_decode());
        assert!(ProtocolError::Malformed("eof".into()).is_decode());

        let encode = ProtocolError::Encode("size limit".into());
        assert!(!encode.is_decode());
        assert_eq!(encode.to_string(), "Erro ao codificar frame: size limit");
    }

    #[test]
    fn rejects_short_frames() {
        for len in 0..FRAME_LEN {
            let buf = vec![0u8; len];
            assert!(matches!(
                decode_frame(&buf),
                Err(ProtocolError::TooShort { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn nonzero_flag_bytes_are_true() {
        let frame = raw_frame(0.0, 0.0, 0.0, 0, 0, 0x7F, 0xFF);
        let s = decode_frame(&frame).unwrap();
        assert!(s.is_active);
        assert!(s.is_scale_connected);
    }

    #[test]
    fn unknown_state_is_preserved() {
        let frame = raw_frame(12.0, 0.8, 40.0, 500, 7, 1, 1);
        let s = decode_frame(&frame).unwrap();
        assert_eq!(s.state, BrewState::Unknown(7));
        assert_eq!(s.weight, 12.0);
        assert_eq!(s.flow_rate, 0.8);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut frame = raw_frame(3.0, 0.1, 40.0, 10, 3, 0, 1);
        frame.extend_from_slice(&[0xAA, 0xBB]);
        let s = decode_frame(&frame).unwrap();
        assert_eq!(s.state, BrewState::Dripping);
        assert_eq!(s.weight, 3.0);
    }

    #[test]
    fn control_words() {
        assert_eq!(classify_text("pong"), ControlWord::Pong);
        assert_eq!(classify_text("ping"), ControlWord::Ping);
        assert_eq!(classify_text("PONG"), ControlWord::Other);
        assert_eq!(classify_text("tare"), ControlWord::Other);
    }
}
