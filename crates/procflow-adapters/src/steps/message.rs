//! MessageStep: muestra un texto de sólo lectura y continúa al confirmar.

use procflow_core::{Fragment, FragmentContext, ParamKey, Step, StepConfig, StepError};
use serde::{Deserialize, Serialize};

pub const MESSAGE: ParamKey<String> = ParamKey::new("message");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl MessageLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageStep {
    name: String,
    text: String,
    level: MessageLevel,
    next: Option<String>,
}

impl MessageStep {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(),
               text: text.into(),
               level: MessageLevel::Info,
               next: None }
    }

    pub fn level(mut self, level: MessageLevel) -> Self {
        self.level = level;
        self
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next = Some(step.into());
        self
    }
}

impl Fragment for MessageStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.add_interaction(&MESSAGE);
        Ok(())
    }
}

impl Step for MessageStep {
    fn config(&self) -> StepConfig {
        let config = StepConfig::new().interactive().rollback();
        match &self.next {
            Some(next) => config.next(next.clone()),
            None => config,
        }
    }

    fn prepare_execution(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.set(&MESSAGE, self.text.clone())?;
        ctx.set_property(&MESSAGE, "style", self.level.as_str());
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        Ok(())
    }
}
