//! Configuración del engine desde variables de entorno.
//!
//! Convención `PROCFLOW_*`; el archivo `.env` se carga una sola vez. Todas las
//! variables son opcionales y un valor no parseable cae en el default.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Máximo de transiciones de step por llamada (execute/resume/rollback).
    pub max_transitions: usize,
    /// Retardo sugerido al cliente cuando un step pide auto-update sin indicar uno.
    pub auto_update_delay: Duration,
    /// Persistir un snapshot tras cada suspensión.
    pub persist_snapshots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_transitions: 1000,
               auto_update_delay: Duration::from_millis(500),
               persist_snapshots: true }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        let defaults = Self::default();
        let max_transitions = env::var("PROCFLOW_MAX_TRANSITIONS").ok()
                                                                  .and_then(|v| v.parse().ok())
                                                                  .unwrap_or(defaults.max_transitions);
        let auto_update_delay = env::var("PROCFLOW_AUTO_UPDATE_MS").ok()
                                                                   .and_then(|v| v.parse().ok())
                                                                   .map(Duration::from_millis)
                                                                   .unwrap_or(defaults.auto_update_delay);
        let persist_snapshots = env::var("PROCFLOW_PERSIST_SNAPSHOTS").ok()
                                                                      .and_then(|v| parse_bool(&v))
                                                                      .unwrap_or(defaults.persist_snapshots);
        Self { max_transitions,
               auto_update_delay,
               persist_snapshots }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
