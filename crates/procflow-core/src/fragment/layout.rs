use std::collections::BTreeSet;
use std::fmt;

use super::{Fragment, ValidationErrors, ValidationPhase};
use crate::param::annotation::check_builtin;
use crate::param::{ParamId, ParameterStore};

pub(crate) type ValidationFn = Box<dyn Fn(&ParameterStore) -> Option<String> + Send + Sync>;

pub(crate) struct Validation {
    pub(crate) param: ParamId,
    pub(crate) phase: ValidationPhase,
    pub(crate) check: ValidationFn,
}

/// Lo que un fragment declaró durante su inicialización.
#[derive(Default)]
pub struct FragmentLayout {
    pub(crate) interaction: Vec<ParamId>,
    pub(crate) input: BTreeSet<ParamId>,
    pub(crate) continuation: BTreeSet<ParamId>,
    pub(crate) validations: Vec<Validation>,
    pub(crate) temporary: Vec<ParamId>,
    pub(crate) attach_queue: Vec<(ParamId, Box<dyn Fragment>)>,
    pub(crate) detach_queue: Vec<ParamId>,
}

impl FragmentLayout {
    pub fn interaction_params(&self) -> &[ParamId] {
        &self.interaction
    }

    pub fn is_input(&self, id: &ParamId) -> bool {
        self.input.contains(id)
    }

    pub fn is_continuation(&self, id: &ParamId) -> bool {
        self.continuation.contains(id)
    }

    pub(crate) fn add_interaction(&mut self, id: ParamId) {
        if !self.interaction.contains(&id) {
            self.interaction.push(id);
        }
    }

    pub(crate) fn add_input(&mut self, id: ParamId) {
        self.add_interaction(id.clone());
        self.input.insert(id);
    }

    pub(crate) fn remove_interaction(&mut self, id: &ParamId) {
        self.interaction.retain(|p| p != id);
        self.input.remove(id);
        self.continuation.remove(id);
    }

    /// Evalúa las validaciones de este nodo. Con `on_interaction` sólo corren
    /// las continuas; en otro caso corren también las finales. Las anotaciones
    /// integradas de los parámetros de entrada cuentan como continuas.
    pub(crate) fn validate(&self, store: &ParameterStore, on_interaction: bool, errors: &mut ValidationErrors) {
        for id in self.interaction.iter().filter(|id| self.input.contains(*id)) {
            if let (Some(value), Some(annotations)) = (store.value(id), store.annotations(id)) {
                if let Some(reason) = check_builtin(value, annotations) {
                    errors.entry(id.clone()).or_insert(reason);
                }
            }
        }
        for v in &self.validations {
            if on_interaction && v.phase == ValidationPhase::Final {
                continue;
            }
            if let Some(reason) = (v.check)(store) {
                errors.entry(v.param.clone()).or_insert(reason);
            }
        }
    }
}

impl fmt::Debug for FragmentLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentLayout")
         .field("interaction", &self.interaction)
         .field("input", &self.input)
         .field("continuation", &self.continuation)
         .field("validations", &self.validations.len())
         .finish()
    }
}
