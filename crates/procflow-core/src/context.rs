//! Contexto explícito de aplicación/sesión.
//!
//! Sustituye a los registros globales: todo lo compartido entre procesos
//! (coordinadores, store de entidades, configuración) viaja en un
//! `EngineContext` que el engine pasa a cada operación que lo necesita.

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::coordinator::{HistoryCoordinator, NoopCoordinator, TransactionCoordinator};
use crate::entity::{EntityStore, InMemoryEntityStore};

#[derive(Clone)]
pub struct EngineContext {
    pub transactions: Arc<dyn TransactionCoordinator>,
    pub history: Arc<dyn HistoryCoordinator>,
    pub entities: Arc<dyn EntityStore>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        Self { transactions: Arc::new(NoopCoordinator),
               history: Arc::new(NoopCoordinator),
               entities: Arc::new(InMemoryEntityStore::new()),
               config }
    }

    pub fn with_transactions(mut self, coordinator: Arc<dyn TransactionCoordinator>) -> Self {
        self.transactions = coordinator;
        self
    }

    pub fn with_history(mut self, coordinator: Arc<dyn HistoryCoordinator>) -> Self {
        self.history = coordinator;
        self
    }

    pub fn with_entities(mut self, entities: Arc<dyn EntityStore>) -> Self {
        self.entities = entities;
        self
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext").field("config", &self.config).finish_non_exhaustive()
    }
}
