//! QuestionnaireStep: recorre una lista de preguntas dentro de un único step.
//!
//! Cada respuesta ejecuta el step y, mientras queden preguntas, lo vuelve a
//! programar como siguiente. El propio step sabe volver a la pregunta anterior
//! (`rollback_to_previous_interaction`), así que un rollback dentro del
//! cuestionario no sale de él.

use log::debug;
use procflow_core::{Fragment, FragmentContext, ParamKey, ParameterStore, Step, StepConfig, StepError,
                    ValidationPhase};

pub const QUESTION: ParamKey<String> = ParamKey::new("question");
pub const ANSWER: ParamKey<String> = ParamKey::new("answer");
pub const ANSWERS: ParamKey<Vec<String>> = ParamKey::new("answers");

#[derive(Debug, Clone)]
pub struct QuestionnaireStep {
    name: String,
    questions: Vec<String>,
    next: Option<String>,
}

impl QuestionnaireStep {
    pub fn new(name: impl Into<String>, questions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { name: name.into(),
               questions: questions.into_iter().map(Into::into).collect(),
               next: None }
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.next = Some(step.into());
        self
    }

    fn answers(ctx: &FragmentContext<'_>) -> Result<Vec<String>, StepError> {
        ctx.value_or(&ANSWERS, Vec::new())
    }

    /// Publica la pregunta que corresponde al número de respuestas dadas.
    fn show_question(&self, ctx: &mut FragmentContext<'_>, answered: usize) -> Result<(), StepError> {
        if let Some(question) = self.questions.get(answered) {
            ctx.set(&QUESTION, question.clone())?;
            ctx.set_property(&QUESTION, "progress", format!("{}/{}", answered + 1, self.questions.len()));
        }
        Ok(())
    }
}

impl Fragment for QuestionnaireStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        ctx.add_interaction(&QUESTION);
        ctx.add_input(&ANSWER);
        ctx.add_interaction(&ANSWERS);
        ctx.validate(&ANSWER, ValidationPhase::Final, |store| match store.get(&ANSWER) {
               Ok(Some(answer)) if !answer.trim().is_empty() => None,
               _ => Some("an answer is required".to_string()),
           });
        Ok(())
    }
}

impl Step for QuestionnaireStep {
    fn config(&self) -> StepConfig {
        let config = StepConfig::new().interactive().rollback();
        match &self.next {
            Some(next) => config.next(next.clone()),
            None => config,
        }
    }

    fn prepare_execution(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        let answered = Self::answers(ctx)?.len();
        self.show_question(ctx, answered)
    }

    fn needs_interaction(&self, ctx: &FragmentContext<'_>) -> bool {
        !self.questions.is_empty() && ctx.has_interaction_params()
    }

    fn execute(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        if self.questions.is_empty() {
            return Ok(());
        }
        let mut answers = Self::answers(ctx)?;
        answers.push(ctx.require(&ANSWER)?);
        let answered = answers.len();
        ctx.set(&ANSWERS, answers)?;
        ctx.remove(&ANSWER);
        debug!("questionnaire:answered process_id={} step={} answered={}/{}",
               ctx.process_id(),
               self.name,
               answered,
               self.questions.len());
        if answered < self.questions.len() {
            ctx.set_next_step(self.name.clone());
        }
        Ok(())
    }

    fn can_rollback_to_previous_interaction(&self, store: &ParameterStore) -> bool {
        matches!(store.get(&ANSWERS), Ok(Some(answers)) if !answers.is_empty())
    }

    /// Vuelve a la última pregunta contestada con su respuesta como valor
    /// editable.
    fn rollback_to_previous_interaction(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        let mut answers = Self::answers(ctx)?;
        let last = answers.pop()
                          .ok_or_else(|| StepError::failed("no previous question to return to"))?;
        let answered = answers.len();
        ctx.set(&ANSWERS, answers)?;
        ctx.set(&ANSWER, last)?;
        self.show_question(ctx, answered)
    }
}
