//! Store do último snapshot + estado da conexão.
//!
//! Só o gerenciador de conexão escreve. Cada escrita substitui o
//! [`LiveStatus`] inteiro numa única operação e depois notifica os
//! assinantes (gauges, gráficos, UI).

use brew_core::{BrewSnapshot, ConnectionState, LiveStatus};
use crossbeam_channel::{Receiver, TrySendError, bounded};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::debug;

/// Retorna `false` quando o assinante deve ser removido.
type Listener = Arc<dyn Fn(&LiveStatus) -> bool + Send + Sync>;

struct Inner {
    status: RwLock<LiveStatus>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_id: AtomicU64,
    decode_errors: AtomicU64,
}

/// Handle clonável para a store compartilhada.
#[derive(Clone)]
pub struct BrewDataStore {
    inner: Arc<Inner>,
}

impl Default for BrewDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BrewDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrewDataStore")
            .field("status", &self.current())
            .field("decode_errors", &self.decode_errors())
            .finish()
    }
}

impl BrewDataStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                status: RwLock::new(LiveStatus::default()),
                listeners: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                decode_errors: AtomicU64::new(0),
            }),
        }
    }

    // ── Leitura ──

    pub fn current(&self) -> LiveStatus {
        match self.inner.status.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> BrewSnapshot {
        self.current().snapshot
    }

    pub fn connection(&self) -> ConnectionState {
        self.current().connection
    }

    pub fn decode_errors(&self) -> u64 {
        self.inner.decode_errors.load(Ordering::Relaxed)
    }

    // ── Escrita (só o gerenciador de conexão) ──

    /// Substitui o snapshot mantendo o estado da conexão.
    pub fn update(&self, snapshot: BrewSnapshot) {
        self.replace(|status| LiveStatus {
            snapshot,
            connection: status.connection,
        });
    }

    /// Troca o estado da conexão. Qualquer estado que não seja `Connected`
    /// zera o snapshot na mesma escrita.
    pub fn set_connection(&self, connection: ConnectionState) {
        self.replace(|status| LiveStatus {
            snapshot: if connection.is_live() {
                status.snapshot
            } else {
                BrewSnapshot::default()
            },
            connection,
        });
    }

    /// Snapshot padrão + estado informado, numa única escrita.
    pub fn reset(&self, connection: ConnectionState) {
        self.replace(|_| LiveStatus {
            snapshot: BrewSnapshot::default(),
            connection,
        });
    }

    /// Erro de protocolo não fatal. Não notifica assinantes.
    pub fn record_decode_error(&self) {
        self.inner.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn replace(&self, next: impl FnOnce(&LiveStatus) -> LiveStatus) {
        let published = {
            let mut guard = match self.inner.status.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let status = next(&guard);
            *guard = status;
            status
        };
        self.notify(&published);
    }

    fn notify(&self, status: &LiveStatus) {
        // Chama fora do lock: um listener pode assinar/cancelar sem deadlock.
        let listeners: Vec<(u64, Listener)> = self
            .lock_listeners()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        let dead: Vec<u64> = listeners
            .into_iter()
            .filter_map(|(id, listener)| (!listener(status)).then_some(id))
            .collect();

        if !dead.is_empty() {
            let mut map = self.lock_listeners();
            for id in dead {
                map.remove(&id);
            }
        }
    }

    // ── Assinaturas ──

    /// Registra um listener chamado a cada publicação. O listener fica ativo
    /// enquanto a [`Subscription`] retornada existir.
    #[must_use = "o listener é removido quando a Subscription é descartada"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LiveStatus) + Send + Sync + 'static,
    {
        let id = self.insert(Arc::new(move |status| {
            listener(status);
            true
        }));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Assinante via channel bounded, para threads de UI.
    ///
    /// Se o channel estiver cheio a atualização é descartada; quando o
    /// receiver é dropado o assinante sai sozinho.
    pub fn subscribe_channel(&self, capacity: usize) -> Receiver<LiveStatus> {
        let (tx, rx) = bounded::<LiveStatus>(capacity);
        self.insert(Arc::new(move |status| match tx.try_send(*status) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Channel do assinante cheio, descartando atualização");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }));
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn insert(&self, listener: Listener) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().insert(id, listener);
        id
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Listener>> {
        lock_listeners(&self.inner)
    }
}

fn lock_listeners(inner: &Inner) -> std::sync::MutexGuard<'_, BTreeMap<u64, Listener>> {
    match inner.listeners.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Guarda de uma assinatura. Drop ⇒ unsubscribe.
pub struct Subscription {
    store: Weak<Inner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            lock_listeners(&inner).remove(&self.id);
        }
    }
}
