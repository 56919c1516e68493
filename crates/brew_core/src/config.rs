//! Configuração unificada via TOML.
//!
//! Um único `config.toml` cobre o cliente (endpoint + tempos) e o simulador.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros ao persistir a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Endpoint do controlador. O host vem da camada CRUD (IP cadastrado).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host ou IP, opcionalmente com porta (ex: "192.168.4.1:8765")
    pub host: String,
    /// "ws" ou "wss"
    pub scheme: String,
    /// Caminho do WebSocket no dispositivo
    pub path: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".into(),
            scheme: "ws".into(),
            path: "/ws".into(),
        }
    }
}

impl DeviceConfig {
    /// URL completa: `scheme://host/ws`.
    pub fn endpoint_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host.trim(), self.path)
    }
}

/// Tempos do cliente. Os padrões são os do firmware e não devem mudar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Sem atividade do usuário por este tempo ⇒ conexão suspensa
    pub idle_threshold_ms: u64,
    /// Atraso fixo antes de reconectar (sem backoff exponencial)
    pub reconnect_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 5_000,
            idle_threshold_ms: 15 * 60 * 1_000,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl TimingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Configuração do simulador de dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Endereço de bind do servidor WebSocket
    pub bind: String,
    /// Intervalo entre frames de status (ms)
    pub frame_interval_ms: u64,
    /// Rendimento alvo simulado (g)
    pub target_grams: f32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8765".into(),
            frame_interval_ms: 100,
            target_grams: 40.0,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML. Em caso de erro usa os padrões.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml (ao lado do executável).
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let device = &self.device;
        let timing = &self.timing;

        if device.host.trim().is_empty() {
            errors.push("Host do dispositivo não pode ser vazio".into());
        }
        if device.scheme != "ws" && device.scheme != "wss" {
            errors.push(format!("Esquema inválido: {} (ws ou wss)", device.scheme));
        }
        if !device.path.starts_with('/') {
            errors.push(format!("Caminho deve começar com '/': {}", device.path));
        }

        for (name, value) in [
            ("heartbeat_interval_ms", timing.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", timing.heartbeat_timeout_ms),
            ("idle_threshold_ms", timing.idle_threshold_ms),
            ("reconnect_delay_ms", timing.reconnect_delay_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name} não pode ser 0"));
            }
        }
        if timing.heartbeat_timeout_ms >= timing.heartbeat_interval_ms {
            errors.push(format!(
                "Timeout do heartbeat ({} ms) deve ser menor que o intervalo ({} ms)",
                timing.heartbeat_timeout_ms, timing.heartbeat_interval_ms
            ));
        }

        if self.simulator.frame_interval_ms == 0 {
            errors.push("Intervalo de frames do simulador não pode ser 0".into());
        }

        errors
    }
}
