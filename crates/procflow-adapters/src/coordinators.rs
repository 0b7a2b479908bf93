//! Coordinador que registra las llamadas de scope.

use std::sync::Mutex;

use log::debug;
use procflow_core::{EntityError, HistoryCoordinator, TransactionCoordinator};
use uuid::Uuid;

/// Anota cada llamada como `<op>:<step>` en orden de llegada. Puede
/// configurarse para fallar en `commit`.
#[derive(Debug, Default)]
pub struct RecordingCoordinator {
    calls: Mutex<Vec<String>>,
    fail_commit: bool,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variante cuyo `commit` devuelve `EntityError::Transaction`.
    pub fn failing_commit() -> Self {
        Self { fail_commit: true,
               ..Self::default() }
    }

    pub fn calls(&self) -> Vec<String> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, op: &str, process: Uuid, step: &str) {
        debug!("coordinator:{} process_id={} step={}", op, process, step);
        let entry = format!("{op}:{step}");
        match self.calls.lock() {
            Ok(mut calls) => calls.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

impl TransactionCoordinator for RecordingCoordinator {
    fn begin(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("begin", process, step);
        Ok(())
    }

    fn commit(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("commit", process, step);
        if self.fail_commit {
            return Err(EntityError::Transaction(format!("commit rejected at step '{step}'")));
        }
        Ok(())
    }

    fn rollback(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("rollback", process, step);
        Ok(())
    }
}

impl HistoryCoordinator for RecordingCoordinator {
    fn begin_group(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("begin_group", process, step);
        Ok(())
    }

    fn commit_group(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("commit_group", process, step);
        Ok(())
    }

    fn rollback_group(&self, process: Uuid, step: &str) -> Result<(), EntityError> {
        self.record("rollback_group", process, step);
        Ok(())
    }
}
