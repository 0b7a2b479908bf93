//! Coordinadores externos de transacción e historial.
//!
//! El engine los invoca en los bordes de scope de cada step. Se comparten
//! entre procesos, por eso reciben `&self` y deben sincronizar internamente.

use uuid::Uuid;

use crate::errors::EntityError;

pub trait TransactionCoordinator: Send + Sync {
    fn begin(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
    fn commit(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
    fn rollback(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
}

pub trait HistoryCoordinator: Send + Sync {
    fn begin_group(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
    fn commit_group(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
    fn rollback_group(&self, process: Uuid, step: &str) -> Result<(), EntityError>;
}

/// Coordinador que no hace nada; default del engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCoordinator;

impl TransactionCoordinator for NoopCoordinator {
    fn begin(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
    fn commit(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
    fn rollback(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
}

impl HistoryCoordinator for NoopCoordinator {
    fn begin_group(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
    fn commit_group(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
    fn rollback_group(&self, _process: Uuid, _step: &str) -> Result<(), EntityError> {
        Ok(())
    }
}
