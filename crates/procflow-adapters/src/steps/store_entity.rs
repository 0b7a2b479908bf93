//! StoreEntityStep: edita una entidad con un `EntityForm` y la persiste.
//!
//! - El formulario se adjunta como fragment hijo bajo `ENTITY_FORM`.
//! - `execute` corre dentro de un scope de transacción propio (`Wrap`): si el
//!   store de entidades falla, el engine hace rollback del scope y el step no
//!   avanza.
//! - Con `load` el step busca una entidad existente al prepararse y rellena
//!   el formulario; el id encontrado se reutiliza al guardar (edición).

use log::debug;
use procflow_core::{Criteria, Fragment, FragmentContext, ParamKey, ParamList, Step, StepConfig, StepError,
                    TransactionMode};
use uuid::Uuid;

use crate::fragments::EntityForm;

pub const ENTITY_FORM: ParamKey<ParamList> = ParamKey::key_list("entity_form");

#[derive(Debug, Clone)]
pub struct StoreEntityStep {
    name: String,
    form: EntityForm,
    result: ParamKey<Uuid>,
    load: Option<Criteria>,
    next: Option<String>,
}

impl StoreEntityStep {
    /// `result` recibe el id de la entidad guardada.
    pub fn new(name: impl Into<String>, form: EntityForm, result: ParamKey<Uuid>) -> Self {
        Self { name: name.into(),
               form,
               result,
               load: None,
               next: None }
    }

    pub fn load(mut self, criteria: Criteria) -> Self {
        self.load = Some(criteria);
        self
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next = Some(step.into());
        self
    }
}

impl Fragment for StoreEntityStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.attach(&ENTITY_FORM, self.form.clone());
        Ok(())
    }
}

impl Step for StoreEntityStep {
    fn config(&self) -> StepConfig {
        let config = StepConfig::new().interactive()
                                      .rollback()
                                      .transaction(TransactionMode::Wrap);
        match &self.next {
            Some(next) => config.next(next.clone()),
            None => config,
        }
    }

    fn prepare_execution(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        let Some(criteria) = &self.load else {
            return Ok(());
        };
        let existing = ctx.entities().query(criteria).next();
        if let Some(entity) = existing {
            debug!("entity:load process_id={} step={} id={:?}", ctx.process_id(), self.name, entity.id);
            self.form.fill(ctx, &entity)?;
            if let Some(id) = entity.id {
                ctx.set(&self.result, id)?;
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        let mut entity = self.form.to_entity(ctx.store());
        entity.id = ctx.get(&self.result)?;
        let id = ctx.entities().store(&entity)?;
        debug!("entity:stored process_id={} step={} kind={} id={}", ctx.process_id(), self.name, entity.kind, id);
        ctx.set(&self.result, id)
    }
}
