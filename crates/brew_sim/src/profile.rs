//! Curva de extração simulada.
//!
//! Ciclo fixo: repouso → pré-infusão → extração até perto do alvo →
//! gotejamento → repouso. O snapshot é função pura do tempo desde o início.

use brew_core::{BrewSnapshot, BrewState};
use std::time::Duration;

const IDLE_SECS: f32 = 5.0;
const PREINFUSION_SECS: f32 = 6.0;
const PREINFUSION_FLOW: f32 = 0.3;
const BREW_FLOW: f32 = 2.0;
const DRIP_SECS: f32 = 4.0;
/// Fluxo no início do gotejamento; cai linearmente até zero.
const DRIP_START_FLOW: f32 = 0.5;
/// Gramas que pingam depois que a bomba para.
const DRIP_GRAMS: f32 = DRIP_START_FLOW * DRIP_SECS / 2.0;

/// Duração de cada fase para o alvo informado (s).
fn phase_lengths(target: f32) -> [f32; 4] {
    let preinfusion_weight = PREINFUSION_FLOW * PREINFUSION_SECS;
    let brew_secs = ((target - DRIP_GRAMS - preinfusion_weight) / BREW_FLOW).max(0.0);
    [IDLE_SECS, PREINFUSION_SECS, brew_secs, DRIP_SECS]
}

pub fn cycle_length(target: f32) -> Duration {
    Duration::from_secs_f32(phase_lengths(target).iter().sum())
}

/// Estado do dispositivo `elapsed` após o início da simulação.
pub fn snapshot_at(elapsed: Duration, target: f32) -> BrewSnapshot {
    let [idle, pre, brew, drip] = phase_lengths(target);
    let cycle = idle + pre + brew + drip;
    let t = elapsed.as_secs_f32() % cycle;

    let preinfusion_weight = PREINFUSION_FLOW * pre;
    let brewed_weight = preinfusion_weight + BREW_FLOW * brew;

    let (state, weight, flow_rate, phase_secs) = if t < idle {
        (BrewState::Idle, 0.0, 0.0, t)
    } else if t < idle + pre {
        let tp = t - idle;
        (BrewState::Preinfusion, PREINFUSION_FLOW * tp, PREINFUSION_FLOW, tp)
    } else if t < idle + pre + brew {
        let tp = t - idle - pre;
        (BrewState::Brewing, preinfusion_weight + BREW_FLOW * tp, BREW_FLOW, tp)
    } else {
        let tp = (t - idle - pre - brew).min(drip);
        let slope = DRIP_START_FLOW / drip;
        let flow = (DRIP_START_FLOW - slope * tp).max(0.0);
        let weight = brewed_weight + DRIP_START_FLOW * tp - slope * tp * tp / 2.0;
        (BrewState::Dripping, weight, flow, tp)
    };

    BrewSnapshot {
        weight,
        flow_rate,
        target,
        elapsed_ms: (phase_secs * 1000.0) as u32,
        state,
        is_active: matches!(state, BrewState::Preinfusion | BrewState::Brewing),
        is_scale_connected: true,
        received_at: None,
    }
}
