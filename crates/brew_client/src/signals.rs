//! Sinais do ambiente (visibilidade, foco, rede, presença do usuário).
//!
//! Cada runtime fornece seu adaptador (navegador, janela nativa, stdin…) e
//! empurra os eventos num [`SignalSender`]. O gerenciador de conexão só vê
//! um stream uniforme de [`EnvSignal`].

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSignal {
    /// `true` = visível/primeiro plano, `false` = em segundo plano
    Visibility(bool),
    FocusGained,
    NetworkOnline,
    NetworkOffline,
    /// Mouse, tecla, toque…
    UserActivity,
}

impl EnvSignal {
    /// Sinais que justificam tentar reconectar imediatamente.
    pub fn is_resume_hint(self) -> bool {
        matches!(
            self,
            Self::Visibility(true) | Self::FocusGained | Self::NetworkOnline
        )
    }
}

/// Lado emissor, clonável. Enviar nunca bloqueia.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: UnboundedSender<EnvSignal>,
}

impl SignalSender {
    /// Retorna `false` se o gerenciador já foi encerrado.
    pub fn send(&self, signal: EnvSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn visibility(&self, visible: bool) -> bool {
        self.send(EnvSignal::Visibility(visible))
    }

    pub fn focus(&self) -> bool {
        self.send(EnvSignal::FocusGained)
    }

    pub fn online(&self) -> bool {
        self.send(EnvSignal::NetworkOnline)
    }

    pub fn offline(&self) -> bool {
        self.send(EnvSignal::NetworkOffline)
    }

    pub fn activity(&self) -> bool {
        self.send(EnvSignal::UserActivity)
    }
}

/// Lado receptor, de posse do gerenciador de conexão.
#[derive(Debug)]
pub struct EnvironmentSignals {
    rx: UnboundedReceiver<EnvSignal>,
}

impl EnvironmentSignals {
    /// `None` quando todos os emissores foram descartados.
    pub async fn recv(&mut self) -> Option<EnvSignal> {
        self.rx.recv().await
    }
}

pub fn signal_channel() -> (SignalSender, EnvironmentSignals) {
    let (tx, rx) = unbounded_channel();
    (SignalSender { tx }, EnvironmentSignals { rx })
}
