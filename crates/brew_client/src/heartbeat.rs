//! Heartbeat da sessão: sonda `"ping"` periódica + timeout de resposta.
//!
//! O monitor não tem acesso ao socket. O loop da conexão aguarda
//! [`HeartbeatMonitor::next_event`] no mesmo `select!` dos frames e age
//! sobre o evento: envia a sonda em `Probe`, derruba a sessão em `TimedOut`.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};

/// O que o loop da conexão deve fazer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Hora de enviar `"ping"`. O timeout já está correndo.
    Probe,
    /// Nenhum `"pong"` dentro do prazo. O monitor já se desarmou.
    TimedOut,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    ticker: Option<Interval>,
    deadline: Option<Pin<Box<Sleep>>>,
}

enum Fired {
    Tick,
    Deadline,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ticker: None,
            deadline: None,
        }
    }

    /// Arma o par sonda/timeout. Rearmar descarta o par anterior.
    pub fn arm(&mut self) {
        self.disarm();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// `"pong"` recebido. Retorna `true` se havia sonda pendente.
    pub fn on_probe_ack(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Cancela intervalo e timeout. Idempotente.
    pub fn disarm(&mut self) {
        self.ticker = None;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn awaiting_ack(&self) -> bool {
        self.deadline.is_some()
    }

    /// Próximo evento do heartbeat. Fica pendente para sempre se desarmado.
    ///
    /// Cancel-safe: pode ser usado como ramo de `tokio::select!`.
    pub async fn next_event(&mut self) -> HeartbeatEvent {
        let fired = {
            let Some(ticker) = self.ticker.as_mut() else {
                return pending().await;
            };
            let deadline = &mut self.deadline;
            tokio::select! {
                biased;
                () = expire(deadline) => Fired::Deadline,
                _ = ticker.tick() => Fired::Tick,
            }
        };

        match fired {
            Fired::Deadline => {
                self.disarm();
                HeartbeatEvent::TimedOut
            }
            Fired::Tick => {
                // Um único timeout por vez: uma sonda sem resposta não é renovada.
                if self.deadline.is_none() {
                    self.deadline = Some(Box::pin(sleep(self.timeout)));
                }
                HeartbeatEvent::Probe
            }
        }
    }
}

async fn expire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
