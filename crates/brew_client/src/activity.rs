//! Detector de inatividade do usuário.
//!
//! Não conhece a conexão: só responde "o usuário sumiu?". Cada sinal de
//! presença (mouse, tecla, toque) chega como [`ActivityWatcher::touch`].

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Sleep, sleep};
use tracing::debug;

#[derive(Debug, Default)]
pub struct ActivityWatcher {
    threshold: Duration,
    running: bool,
    idle: bool,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ActivityWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Começa a observar com o limiar informado (15 min no padrão).
    pub fn start(&mut self, threshold: Duration) {
        self.threshold = threshold;
        self.running = true;
        self.idle = false;
        self.timer = Some(Box::pin(sleep(threshold)));
    }

    /// Sinal de presença. Reinicia a janela de inatividade.
    ///
    /// Retorna `true` quando este toque encerra um período ocioso.
    pub fn touch(&mut self) -> bool {
        if !self.running {
            return false;
        }
        let resumed = std::mem::take(&mut self.idle);
        self.timer = Some(Box::pin(sleep(self.threshold)));
        if resumed {
            debug!("Atividade detectada após período ocioso");
        }
        resumed
    }

    /// Para de observar. Seguro mesmo sem `start` anterior.
    pub fn stop(&mut self) {
        self.running = false;
        self.idle = false;
        self.timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Resolve uma única vez por período ocioso. Cancel-safe.
    pub async fn idle(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().await,
            None => pending().await,
        }
        self.timer = None;
        self.idle = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, timeout};

    const THRESHOLD: Duration = Duration::from_secs(15 * 60);

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_threshold() {
        let mut watcher = ActivityWatcher::new();
        let start = Instant::now();
        watcher.start(THRESHOLD);

        watcher.idle().await;
        assert!(start.elapsed() >= THRESHOLD);
        assert!(watcher.is_idle());

        // Mesmo período ocioso: não dispara de novo.
        assert!(timeout(THRESHOLD * 2, watcher.idle()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_before_threshold_resets_window() {
        let mut watcher = ActivityWatcher::new();
        watcher.start(THRESHOLD);

        sleep(THRESHOLD - Duration::from_secs(1)).await;
        assert!(!watcher.touch());

        // A janela recomeçou: 14:59 depois do toque ainda não está ocioso.
        let touched = Instant::now();
        assert!(timeout(THRESHOLD - Duration::from_secs(1), watcher.idle()).await.is_err());
        watcher.idle().await;
        assert!(touched.elapsed() >= THRESHOLD);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_after_idle_reports_resume_and_rearms() {
        let mut watcher = ActivityWatcher::new();
        watcher.start(THRESHOLD);
        watcher.idle().await;

        assert!(watcher.touch());
        assert!(!watcher.is_idle());
        watcher.idle().await;
        assert!(watcher.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_safe_and_silences() {
        let mut watcher = ActivityWatcher::new();
        watcher.stop();
        assert!(!watcher.touch());

        watcher.start(THRESHOLD);
        watcher.stop();
        assert!(!watcher.is_running());
        assert!(timeout(THRESHOLD * 2, watcher.idle()).await.is_err());
    }
}
