use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::param::{ParamId, ParamKey};
use crate::step::EventKind;

/// Bandera de cancelación cooperativa. Se clona entre el handle del llamador
/// y el proceso; los steps largos la consultan en cada iteración.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Referencia del llamador a un proceso vivo.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: Uuid,
    cancel: CancellationFlag,
}

impl ProcessHandle {
    pub(crate) fn new(id: Uuid, cancel: CancellationFlag) -> Self {
        Self { id, cancel }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Pide la cancelación desde otro hilo mientras un step se ejecuta.
    pub fn request_cancel(&self) {
        self.cancel.raise();
    }

    pub fn cancellation_flag(&self) -> &CancellationFlag {
        &self.cancel
    }
}

/// Interacción entregada por la capa de UI: clave que cambió (o `None` para
/// continuar), tipo de evento y valores modificados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub key: Option<ParamId>,
    pub kind: EventKind,
    pub values: BTreeMap<ParamId, Value>,
}

impl Interaction {
    /// Continuar hacia el siguiente step.
    pub fn proceed() -> Self {
        Self { key: None,
               kind: EventKind::Action,
               values: BTreeMap::new() }
    }

    pub fn update<T>(key: &ParamKey<T>) -> Self {
        Self { key: Some(key.id().clone()),
               kind: EventKind::Update,
               values: BTreeMap::new() }
    }

    pub fn action<T>(key: &ParamKey<T>) -> Self {
        Self { key: Some(key.id().clone()),
               kind: EventKind::Action,
               values: BTreeMap::new() }
    }

    pub fn with_value<T>(mut self, key: &ParamKey<T>, value: impl Into<Value>) -> Self {
        self.values.insert(key.id().clone(), value.into());
        self
    }

    pub fn with_raw(mut self, id: ParamId, value: Value) -> Self {
        self.values.insert(id, value);
        self
    }
}
