//! ConfirmStep: pide una confirmación explícita antes de continuar.
//!
//! Muestra un texto (`CONFIRM_PROMPT`, sólo lectura) y una casilla
//! (`CONFIRMED`). La validación final exige la casilla marcada; una acción
//! sobre `CONFIRMED` continúa sin esperar un "siguiente" aparte.

use log::debug;
use procflow_core::{Fragment, FragmentContext, ParamKey, Step, StepConfig, StepError, ValidationPhase};

pub const CONFIRM_PROMPT: ParamKey<String> = ParamKey::new("confirm_prompt");
pub const CONFIRMED: ParamKey<bool> = ParamKey::new("confirmed").with_default(|| false);

#[derive(Debug, Clone)]
pub struct ConfirmStep {
    name: String,
    prompt: String,
    next: Option<String>,
}

impl ConfirmStep {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { name: name.into(),
               prompt: prompt.into(),
               next: None }
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next = Some(step.into());
        self
    }
}

impl Fragment for ConfirmStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.add_interaction(&CONFIRM_PROMPT);
        ctx.add_input(&CONFIRMED);
        ctx.continue_on_interaction(&CONFIRMED);
        ctx.validate(&CONFIRMED, ValidationPhase::Final, |store| match store.get(&CONFIRMED) {
               Ok(Some(true)) => None,
               _ => Some("confirmation required".to_string()),
           });
        Ok(())
    }
}

impl Step for ConfirmStep {
    fn config(&self) -> StepConfig {
        let config = StepConfig::new().interactive().rollback();
        match &self.next {
            Some(next) => config.next(next.clone()),
            None => config,
        }
    }

    fn prepare_execution(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.set(&CONFIRM_PROMPT, self.prompt.clone())?;
        ctx.set(&CONFIRMED, false)
    }

    fn prepare_continuation(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        debug!("confirm:continuation process_id={} step={}", ctx.process_id(), self.name);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        debug!("confirm:accepted process_id={} step={}", ctx.process_id(), self.name);
        Ok(())
    }
}
