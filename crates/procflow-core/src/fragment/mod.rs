//! Fragments: nodos componibles que declaran y organizan los parámetros con
//! los que interactúa el usuario.
//!
//! Ciclo de vida: `Created → Setup → Initialized → Active → Aborted | Finished`.
//! Un fragment reacciona a un único evento de interacción a la vez; los hijos
//! se adjuntan bajo un parámetro `key_list` del padre cuyo valor es la lista de
//! parámetros del hijo.

mod context;
mod layout;
pub(crate) mod tree;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::StepError;
use crate::param::ParamId;

pub use context::FragmentContext;
pub(crate) use context::StepEnv;
pub use layout::FragmentLayout;

/// Resultado de validar: clave → motivo. Vacío significa éxito.
pub type ValidationErrors = BTreeMap<ParamId, String>;

/// Momento en el que se evalúa una validación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationPhase {
    /// En cada interacción.
    Continuous,
    /// Sólo al intentar la transición de step (o ante un parámetro de
    /// continuación).
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FragmentState {
    #[default]
    Created,
    Setup,
    Initialized,
    Active,
    Aborted,
    Finished,
}

pub trait Fragment: Send {
    /// Nombre estable; identifica al fragment dentro del árbol de su step.
    fn name(&self) -> &str;

    /// Reserva claves temporales antes de la inicialización.
    fn setup(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Declara parámetros de interacción, validaciones e hijos. Debe ser
    /// determinista: se vuelve a invocar al restaurar un proceso persistido.
    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError>;

    /// Reacciona a una interacción sobre una de sus claves.
    fn handle_interaction(&mut self, _key: &ParamId, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Refresca valores derivados antes de volver a presentar la interacción.
    fn prepare_interaction(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn abort(&mut self, _ctx: &mut FragmentContext<'_>) {}
}
