//! `FragmentContext`: vista mutable que recibe cada callback de un fragment o
//! step. Agrupa el store del proceso, el layout del nodo que se está
//! ejecutando, el estado de ejecución del step y el `EngineContext`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::layout::{FragmentLayout, Validation};
use super::{Fragment, ValidationPhase};
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::entity::EntityStore;
use crate::errors::{ParamError, StepError};
use crate::param::{AnnotationKey, KeyFlags, ParamId, ParamKey, ParamList, ParameterStore};
use crate::process::CancellationFlag;
use crate::step::{EventKind, InteractionEvent, StepRuntime, Transition};

pub struct FragmentContext<'a> {
    pub(crate) process_id: Uuid,
    pub(crate) step: &'a str,
    pub(crate) fragment: &'a str,
    pub(crate) store: &'a mut ParameterStore,
    pub(crate) layout: &'a mut FragmentLayout,
    pub(crate) runtime: &'a mut StepRuntime,
    pub(crate) env: &'a EngineContext,
    pub(crate) cancel: &'a CancellationFlag,
}

impl<'a> FragmentContext<'a> {
    pub fn process_id(&self) -> Uuid {
        self.process_id
    }

    pub fn step_name(&self) -> &str {
        self.step
    }

    pub fn fragment_name(&self) -> &str {
        self.fragment
    }

    // ---- valores ----

    pub fn get<T: DeserializeOwned>(&self, key: &ParamKey<T>) -> Result<Option<T>, StepError> {
        Ok(self.store.get(key)?)
    }

    pub fn value_or<T: DeserializeOwned>(&self, key: &ParamKey<T>, fallback: T) -> Result<T, StepError> {
        Ok(self.store.get(key)?.unwrap_or(fallback))
    }

    /// Lectura de un valor obligatorio; su ausencia es un defecto de
    /// configuración del proceso.
    pub fn require<T: DeserializeOwned>(&self, key: &ParamKey<T>) -> Result<T, StepError> {
        self.store.get(key)?.ok_or_else(|| ParamError::Missing(key.id().clone()).into())
    }

    pub fn set<T: Serialize>(&mut self, key: &ParamKey<T>, value: T) -> Result<(), StepError> {
        Ok(self.store.set(key, value)?)
    }

    pub fn remove<T>(&mut self, key: &ParamKey<T>) -> Option<Value> {
        self.store.remove(key.id())
    }

    pub fn annotate<T: Serialize, A: Serialize>(&mut self,
                                                key: &ParamKey<T>,
                                                annotation: &AnnotationKey<A>,
                                                value: A)
                                                -> Result<(), StepError> {
        Ok(self.store.annotate(key, annotation, value)?)
    }

    pub fn set_property<T>(&mut self, key: &ParamKey<T>, name: &str, value: impl Into<Value>) {
        self.store.set_property(key.id(), name, value.into());
    }

    pub fn is_modified<T>(&self, key: &ParamKey<T>) -> bool {
        self.store.is_modified(key.id())
    }

    pub fn modified_params(&self) -> Vec<ParamId> {
        self.store.modified().cloned().collect()
    }

    pub fn store(&self) -> &ParameterStore {
        self.store
    }

    // ---- layout ----

    /// Registra un parámetro de sólo lectura para la interacción.
    pub fn add_interaction<T>(&mut self, key: &ParamKey<T>) {
        self.layout.add_interaction(key.id().clone());
    }

    /// Registra un parámetro editable por el usuario.
    pub fn add_input<T>(&mut self, key: &ParamKey<T>) {
        self.layout.add_input(key.id().clone());
    }

    /// Una interacción sobre esta clave no suspende: el proceso continúa
    /// hacia el siguiente step.
    pub fn continue_on_interaction<T>(&mut self, key: &ParamKey<T>) {
        self.layout.add_interaction(key.id().clone());
        self.layout.continuation.insert(key.id().clone());
    }

    pub fn remove_interaction<T>(&mut self, key: &ParamKey<T>) {
        self.layout.remove_interaction(key.id());
    }

    pub fn has_interaction_params(&self) -> bool {
        !self.layout.interaction.is_empty()
    }

    /// Reserva una clave temporal con nombre `<fragment>.<suffix>`. Se
    /// elimina del store cuando el fragment termina o aborta.
    pub fn temporary<T>(&mut self, suffix: &str) -> ParamKey<T> {
        let key = ParamKey::dynamic(format!("{}.{}", self.fragment, suffix), KeyFlags::NONE);
        if !self.layout.temporary.contains(key.id()) {
            self.layout.temporary.push(key.id().clone());
        }
        key
    }

    /// Registra una función de validación sobre `key`.
    pub fn validate<T, F>(&mut self, key: &ParamKey<T>, phase: ValidationPhase, check: F)
        where F: Fn(&ParameterStore) -> Option<String> + Send + Sync + 'static
    {
        self.layout.validations.push(Validation { param: key.id().clone(), phase, check: Box::new(check) });
    }

    /// Adjunta un fragment hijo bajo un parámetro `key_list`. El hijo se
    /// inicializa en cuanto termina el callback actual.
    pub fn attach(&mut self, parent: &ParamKey<ParamList>, fragment: impl Fragment + 'static) {
        self.layout.attach_queue.push((parent.id().clone(), Box::new(fragment)));
    }

    pub fn detach(&mut self, parent: &ParamKey<ParamList>) {
        self.layout.detach_queue.push(parent.id().clone());
    }

    // ---- ejecución ----

    pub fn interaction_event(&self) -> Option<&InteractionEvent> {
        self.runtime.event.as_ref()
    }

    pub fn is_action(&self, key: &ParamId) -> bool {
        matches!(&self.runtime.event, Some(e) if &e.key == key && e.kind == EventKind::Action)
    }

    /// Clave de continuación que provocó la ejecución actual, si la hay.
    pub fn continuation_cause(&self) -> Option<&ParamId> {
        self.runtime.continuation_cause.as_ref()
    }

    pub fn set_next_step(&mut self, step: impl Into<String>) {
        self.runtime.transition = Some(Transition::Step(step.into()));
    }

    pub fn finish_process(&mut self) {
        self.runtime.transition = Some(Transition::Finish);
    }

    /// Pide re-ejecutar el step tras `delay` sin esperar interacción.
    pub fn auto_update(&mut self, delay: Duration) {
        self.runtime.auto_update = Some(delay);
    }

    /// `auto_update` con el retardo configurado en el engine.
    pub fn request_auto_update(&mut self) {
        self.runtime.auto_update = Some(self.env.config.auto_update_delay);
    }

    pub fn stop_auto_update(&mut self) {
        self.runtime.auto_update = None;
    }

    /// Encola la creación de un proceso independiente.
    pub fn spawn(&mut self, definition: impl Into<String>) {
        self.runtime.spawn.push(definition.into());
    }

    pub fn entities(&self) -> &dyn EntityStore {
        self.env.entities.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.env.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_raised()
    }

    pub fn check_cancelled(&self) -> Result<(), StepError> {
        if self.cancel.is_raised() {
            return Err(StepError::Cancelled);
        }
        Ok(())
    }
}

/// Préstamos compartidos por todos los nodos de un step durante una
/// operación. Produce un `FragmentContext` por nodo.
pub(crate) struct StepEnv<'s> {
    pub(crate) process_id: Uuid,
    pub(crate) step: &'s str,
    pub(crate) store: &'s mut ParameterStore,
    pub(crate) runtime: &'s mut StepRuntime,
    pub(crate) env: &'s EngineContext,
    pub(crate) cancel: &'s CancellationFlag,
}

impl<'s> StepEnv<'s> {
    pub(crate) fn context<'a>(&'a mut self, fragment: &'a str, layout: &'a mut FragmentLayout) -> FragmentContext<'a> {
        FragmentContext { process_id: self.process_id,
                          step: self.step,
                          fragment,
                          store: &mut *self.store,
                          layout,
                          runtime: &mut *self.runtime,
                          env: self.env,
                          cancel: self.cancel }
    }
}
