#![allow(dead_code)]

use std::sync::{Arc, Mutex};

pub use procflow_adapters::RecordingCoordinator;
use procflow_core::{EngineContext, Fragment, FragmentContext, ParamId, ParameterStore, ProcessDefinition, ProcessEngine,
                    Step, StepConfig, StepError};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub type Hook = Box<dyn FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Step configurable con closures; registra cada hook invocado en `log`.
pub struct TestStep {
    name: String,
    config: StepConfig,
    log: CallLog,
    init: Option<Hook>,
    prepare: Option<Hook>,
    continuation: Option<Hook>,
    execute: Option<Hook>,
    rollback_to_previous: Option<Hook>,
}

impl TestStep {
    pub fn new(name: &str, config: StepConfig, log: &CallLog) -> Self {
        Self { name: name.to_string(),
               config,
               log: log.clone(),
               init: None,
               prepare: None,
               continuation: None,
               execute: None,
               rollback_to_previous: None }
    }

    pub fn on_init(mut self, f: impl FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn on_prepare(mut self, f: impl FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send + 'static) -> Self {
        self.prepare = Some(Box::new(f));
        self
    }

    pub fn on_continuation(mut self,
                           f: impl FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send + 'static)
                           -> Self {
        self.continuation = Some(Box::new(f));
        self
    }

    pub fn on_execute(mut self, f: impl FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send + 'static) -> Self {
        self.execute = Some(Box::new(f));
        self
    }

    pub fn on_rollback_to_previous(mut self,
                                   f: impl FnMut(&mut FragmentContext<'_>) -> Result<(), StepError> + Send + 'static)
                                   -> Self {
        self.rollback_to_previous = Some(Box::new(f));
        self
    }

    fn record(&self, what: &str) {
        self.log.lock().unwrap().push(format!("{what}:{}", self.name));
    }
}

fn run_hook(hook: &mut Option<Hook>, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
    match hook {
        Some(f) => f(ctx),
        None => Ok(()),
    }
}

impl Fragment for TestStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("init");
        run_hook(&mut self.init, ctx)
    }

    fn handle_interaction(&mut self, key: &ParamId, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.log.lock().unwrap().push(format!("handle:{}:{key}", self.name));
        Ok(())
    }

    fn abort(&mut self, _ctx: &mut FragmentContext<'_>) {
        self.record("abort");
    }
}

impl Step for TestStep {
    fn config(&self) -> StepConfig {
        self.config.clone()
    }

    fn prepare_execution(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("prepare_execution");
        run_hook(&mut self.prepare, ctx)
    }

    fn prepare_continuation(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("prepare_continuation");
        run_hook(&mut self.continuation, ctx)
    }

    fn execute(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("execute");
        run_hook(&mut self.execute, ctx)
    }

    fn rollback(&mut self, _ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("rollback");
        Ok(())
    }

    fn can_rollback_to_previous_interaction(&self, _store: &ParameterStore) -> bool {
        self.rollback_to_previous.is_some()
    }

    fn rollback_to_previous_interaction(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        self.record("rollback_to_previous");
        run_hook(&mut self.rollback_to_previous, ctx)
    }
}

pub fn engine_with<F>(context: EngineContext, id: &str, factory: F) -> ProcessEngine
    where F: Fn() -> ProcessDefinition + Send + Sync + 'static
{
    ProcessEngine::new().context(context).definition(id, factory).build().unwrap()
}

pub fn engine<F>(id: &str, factory: F) -> ProcessEngine
    where F: Fn() -> ProcessDefinition + Send + Sync + 'static
{
    engine_with(EngineContext::default(), id, factory)
}
