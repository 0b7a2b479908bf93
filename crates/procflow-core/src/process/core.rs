//! `Process`: instancia en ejecución de una `ProcessDefinition`.
//!
//! Un proceso avanza de forma síncrona: ejecuta steps mientras estén listos y
//! se suspende (devolviendo el control) en cuanto uno necesita interacción.
//! No es seguro para mutación concurrente; el engine lo opera siempre a
//! través de `&mut self`.
//!
//! Invariantes:
//! - Un fallo nunca avanza el puntero de step.
//! - Los scopes de transacción e historial anidan como paréntesis; cerrar uno
//!   sin abrir es `TransactionNesting`.
//! - Cada step ejecutado con éxito deja un `RollbackPoint` con el estado del
//!   store previo a su `execute`. Un step sin soporte de rollback corta el
//!   historial y deja sólo una barrera sin estado.
//! - Un fallo que deshizo scopes abiertos por steps anteriores bloquea el
//!   reintento hasta que un rollback vuelva a un punto fuera de esos scopes.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, error, warn};
use serde_json::json;
use uuid::Uuid;

use super::{CancellationFlag, Interaction, InteractionParam, ProcessDefinition, ProcessSnapshot, ProcessState,
            ProcessStatus, RollbackPoint};
use crate::constants::ENGINE_VERSION;
use crate::context::EngineContext;
use crate::errors::{ParamError, ProcessError};
use crate::event::ProcessEventKind;
use crate::fragment::tree::{self, CollectedParam, FragmentTree};
use crate::fragment::{FragmentState, StepEnv, ValidationErrors};
use crate::hashing::hash_value;
use crate::param::{KeyRegistry, ParamId, ParameterChanges, ParameterState, ParameterStore};
use crate::step::{EventKind, InteractionEvent, ScopeDepths, Step, StepPhase, StepRuntime, Transition};

pub(crate) struct StepSlot {
    pub(crate) step: Box<dyn Step>,
    pub(crate) tree: FragmentTree,
    pub(crate) phase: StepPhase,
    pub(crate) runtime: StepRuntime,
}

/// Préstamos disjuntos de un slot, complementarios al `StepEnv`.
struct SlotParts<'a> {
    step: &'a mut Box<dyn Step>,
    tree: &'a mut FragmentTree,
    phase: &'a mut StepPhase,
}

pub struct Process {
    id: Uuid,
    definition: String,
    store: ParameterStore,
    keys: KeyRegistry,
    slots: BTreeMap<String, StepSlot>,
    first_step: String,
    current: Option<String>,
    status: ProcessStatus,
    depths: ScopeDepths,
    /// Profundidad al empezar el step en curso: los scopes de steps previos.
    scope_base: ScopeDepths,
    retry_blocked: bool,
    history: Vec<RollbackPoint>,
    validation_errors: ValidationErrors,
    retry_after: Option<Duration>,
    spawn_requests: Vec<String>,
    spawned: Vec<Uuid>,
    cancel: CancellationFlag,
    journal: Vec<ProcessEventKind>,
}

impl Process {
    pub fn new(id: Uuid, definition: ProcessDefinition) -> Result<Self, ProcessError> {
        let (name, steps, key_infos) = definition.into_parts();
        let first_step = steps.first()
                              .map(|s| s.name().to_string())
                              .ok_or_else(|| ProcessError::InvalidState(format!("definition '{name}' has no steps")))?;
        let mut keys = KeyRegistry::new();
        for info in key_infos {
            keys.register_info(info)?;
        }
        let mut slots = BTreeMap::new();
        for step in steps {
            let step_name = step.name().to_string();
            if slots.contains_key(&step_name) {
                return Err(ProcessError::InvalidState(format!("step '{step_name}' declared twice in '{name}'")));
            }
            slots.insert(step_name,
                         StepSlot { step,
                                    tree: FragmentTree::default(),
                                    phase: StepPhase::NotPrepared,
                                    runtime: StepRuntime::default() });
        }
        Ok(Self { id,
                  journal: vec![ProcessEventKind::ProcessCreated { definition: name.clone() }],
                  definition: name,
                  store: ParameterStore::new(),
                  keys,
                  slots,
                  first_step,
                  current: None,
                  status: ProcessStatus::Created,
                  depths: ScopeDepths::default(),
                  scope_base: ScopeDepths::default(),
                  retry_blocked: false,
                  history: Vec::new(),
                  validation_errors: ValidationErrors::new(),
                  retry_after: None,
                  spawn_requests: Vec::new(),
                  spawned: Vec::new(),
                  cancel: CancellationFlag::new() })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn current_step(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_phase(&self) -> Option<StepPhase> {
        self.current.as_ref().and_then(|n| self.slots.get(n)).map(|s| s.phase)
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn depths(&self) -> ScopeDepths {
        self.depths
    }

    pub fn history(&self) -> &[RollbackPoint] {
        &self.history
    }

    pub fn cancellation_flag(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Enlaza el proceso con la bandera de un handle existente (tras
    /// restaurarlo, el proceso nace con una bandera nueva).
    pub(crate) fn share_cancellation(&mut self, flag: &CancellationFlag) {
        self.cancel = flag.clone();
    }

    pub fn take_changes(&mut self) -> ParameterChanges {
        self.store.take_changes()
    }

    pub(crate) fn take_journal(&mut self) -> Vec<ProcessEventKind> {
        std::mem::take(&mut self.journal)
    }

    pub(crate) fn take_spawn_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.spawn_requests)
    }

    pub(crate) fn record_spawned(&mut self, child: Uuid, definition: String) {
        self.spawned.push(child);
        self.journal.push(ProcessEventKind::ProcessSpawned { child, definition });
    }

    // ---- operaciones públicas ----

    /// Arranca el proceso (o reintenta el step que falló) y ejecuta steps
    /// hasta la siguiente suspensión. Sobre un proceso suspendido sólo actúa
    /// si el step pidió auto-update; en otro caso no cambia nada.
    pub fn execute(&mut self, ctx: &EngineContext) -> Result<(), ProcessError> {
        match self.status {
            ProcessStatus::Created => {
                self.current = Some(self.first_step.clone());
            }
            ProcessStatus::Failed => {
                let name = self.current_name()?;
                if self.retry_blocked {
                    return self.refuse(ProcessError::InvalidState(format!("step '{name}' failed inside a scope opened by an \
                                                                           earlier step; roll back before retrying")));
                }
                self.with_slot(&name, ctx, |parts, env| {
                        if parts.tree.state == FragmentState::Active {
                            tree::abort(parts.step.as_mut(), &name, parts.tree, env);
                        }
                        *parts.tree = FragmentTree::default();
                        *parts.phase = StepPhase::NotPrepared;
                        *env.runtime = StepRuntime::default();
                        Ok(())
                    })?;
            }
            ProcessStatus::Suspended if self.auto_update_pending() => {}
            _ => return Ok(()),
        }
        self.status = ProcessStatus::Running;
        self.retry_after = None;
        let result = self.run(ctx);
        self.conclude(result, ctx)
    }

    /// Entrega una interacción al step suspendido.
    ///
    /// - Sin clave: validación final y avance.
    /// - Clave de continuación: dispatch, validación final,
    ///   `prepare_continuation` y avance sin suspender.
    /// - Otra clave: dispatch, validación continua y re-preparación del step.
    pub fn resume(&mut self, interaction: Interaction, ctx: &EngineContext) -> Result<(), ProcessError> {
        if self.status != ProcessStatus::Suspended {
            return Err(ProcessError::InvalidState(format!("cannot resume process {} in status {:?}", self.id, self.status)));
        }
        let name = self.current_name()?;
        if self.cancel.is_raised() {
            return self.conclude(Err(ProcessError::Cancelled { step: name }), ctx);
        }
        let rejected = {
            let slot = self.slot(&name)?;
            if !slot.phase.is_suspended() {
                return Err(ProcessError::InvalidState(format!("step '{name}' is not awaiting interaction")));
            }
            interaction.values.iter().find_map(|(id, value)| {
                                          if !tree::is_writable(&slot.tree, id) {
                                              Some(ProcessError::NotWritable { step: name.clone(), param: id.clone() })
                                          } else if self.keys.flags(id).final_value
                                                    && self.store.value(id).is_some_and(|v| v != value)
                                          {
                                              Some(ParamError::FinalValue(id.clone()).into())
                                          } else {
                                              None
                                          }
                                      })
        };
        if let Some(err) = rejected {
            return self.refuse(err);
        }
        let Interaction { key, kind, values } = interaction;
        for (id, value) in values {
            let flags = self.keys.flags(&id);
            self.store.set_value(id, value, flags);
        }
        debug!("process:resume process_id={} step={} key={:?}", self.id, name, key);
        self.journal.push(ProcessEventKind::InteractionReceived { step: name.clone(), key: key.clone() });
        self.status = ProcessStatus::Running;
        self.retry_after = None;
        self.scope_base = self.depths;
        let result = self.resume_with(&name, key, kind, ctx);
        self.conclude(result, ctx)
    }

    /// Deshace el último step ejecutado (o delega en el step actual si
    /// soporta volver a su interacción previa).
    ///
    /// Si el último punto quedó dentro de un scope que ya no está abierto,
    /// retrocede hasta el step que abrió ese scope; todos los steps
    /// deshechos deben soportar rollback.
    pub fn rollback(&mut self, ctx: &EngineContext) -> Result<(), ProcessError> {
        if !matches!(self.status, ProcessStatus::Suspended | ProcessStatus::Failed) {
            return Err(ProcessError::InvalidState(format!("cannot roll back process {} in status {:?}", self.id, self.status)));
        }
        let name = self.current_name()?;
        self.scope_base = self.depths;
        if !self.retry_blocked && self.slot(&name)?.step.can_rollback_to_previous_interaction(&self.store) {
            let result = self.with_slot(&name, ctx, |parts, env| {
                                 let path = [name.clone()];
                                 tree::invoke(parts.step.as_mut(), &name, &path, parts.tree, env, |s, c| {
                                     s.rollback_to_previous_interaction(c)
                                 })?;
                                 *parts.phase = StepPhase::AwaitingInteraction;
                                 Ok(())
                             });
            if result.is_ok() {
                self.status = ProcessStatus::Suspended;
                self.validation_errors.clear();
                self.drop_points_of(&name);
                self.journal.push(ProcessEventKind::RolledBack { from: name.clone(), to: name });
            }
            return self.conclude(result, ctx);
        }
        let start = match self.rollback_start() {
            Ok(start) => start,
            Err(step) => return self.refuse(ProcessError::RollbackUnsupported { step: step.unwrap_or(name) }),
        };
        let result = self.rollback_to(start, &name, ctx);
        self.conclude(result, ctx)
    }

    /// Cancela el proceso: aborta el step actual y deshace los scopes
    /// abiertos. Cancelar un proceso ya terminado no tiene efecto.
    pub fn cancel(&mut self, ctx: &EngineContext) {
        if self.status.is_terminal() {
            return;
        }
        self.cancel.raise();
        self.abort_current(ctx);
        self.mark_cancelled(ctx);
    }

    pub fn state(&self) -> ProcessState {
        let mut params = Vec::new();
        let mut can_rollback = false;
        if let Some((name, slot)) = self.current.as_ref().and_then(|n| self.slots.get(n).map(|s| (n, s))) {
            let mut collected: Vec<CollectedParam> = Vec::new();
            tree::collect(name, &slot.tree, &mut collected);
            params = collected.into_iter()
                              .map(|c| {
                                  let value = self.store.value(&c.id).cloned();
                                  let properties = self.store.properties(&c.id).cloned().unwrap_or_default();
                                  let annotations = self.store.annotations(&c.id).cloned().unwrap_or_default();
                                  InteractionParam { id: c.id,
                                                     fragment: c.fragment,
                                                     value,
                                                     writable: c.writable,
                                                     properties,
                                                     annotations }
                              })
                              .collect();
            let delegated = !self.retry_blocked && slot.step.can_rollback_to_previous_interaction(&self.store);
            can_rollback = matches!(self.status, ProcessStatus::Suspended | ProcessStatus::Failed)
                           && (delegated || self.rollback_start().is_ok());
        }
        ProcessState { process_id: self.id,
                       definition: self.definition.clone(),
                       status: self.status,
                       step: self.current.clone(),
                       params,
                       validation_errors: self.validation_errors.clone(),
                       can_rollback,
                       retry_after_ms: self.retry_after.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                       spawned: self.spawned.clone() }
    }

    /// Forma persistible del proceso (sin entradas transitorias).
    pub fn snapshot(&self) -> Result<ProcessSnapshot, ProcessError> {
        let transient = self.store.transient_ids();
        ProcessSnapshot { id: self.id,
                          definition: self.definition.clone(),
                          status: self.status,
                          current_step: self.current.clone(),
                          phase: self.current_phase().unwrap_or_default(),
                          parameters: self.store.persistent_state(),
                          depths: self.depths,
                          history: self.history
                                       .iter()
                                       .map(|p| RollbackPoint { step: p.step.clone(),
                                                                state: p.state.without(transient),
                                                                depths: p.depths })
                                       .collect(),
                          validation_errors: self.validation_errors.clone(),
                          retry_after_ms: self.retry_after.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                          retry_blocked: self.retry_blocked,
                          spawned: self.spawned.clone(),
                          checksum: String::new() }.seal()
    }

    /// Reconstruye un proceso desde su snapshot: vuelve a inicializar el árbol
    /// del step actual y reaplica el estado persistido.
    pub fn restore(definition: ProcessDefinition,
                   snapshot: ProcessSnapshot,
                   ctx: &EngineContext)
                   -> Result<Self, ProcessError> {
        snapshot.verify()?;
        if definition.name() != snapshot.definition {
            return Err(ProcessError::InvalidState(format!("snapshot of '{}' cannot be restored as '{}'",
                                                          snapshot.definition,
                                                          definition.name())));
        }
        let mut process = Process::new(snapshot.id, definition)?;
        process.journal.clear();
        process.status = snapshot.status;
        process.current = snapshot.current_step.clone();
        process.depths = snapshot.depths;
        process.history = snapshot.history;
        process.validation_errors = snapshot.validation_errors;
        process.spawned = snapshot.spawned;
        process.retry_after = snapshot.retry_after_ms.map(Duration::from_millis);
        process.retry_blocked = snapshot.retry_blocked;
        // `init` ve el estado persistido; lo que escriba se descarta después.
        process.store.replace_state(snapshot.parameters.clone());
        if let Some(name) = snapshot.current_step {
            let phase = snapshot.phase;
            let auto_update = process.retry_after;
            process.with_slot(&name, ctx, |parts, env| {
                       if phase.is_suspended() || phase == StepPhase::ReEntered {
                           let path = [name.clone()];
                           tree::init(parts.step.as_mut(), &name, &path, parts.tree, env)?;
                       }
                       *parts.phase = phase;
                       env.runtime.auto_update = auto_update;
                       Ok(())
                   })?;
        }
        process.store.replace_state(snapshot.parameters);
        process.journal.push(ProcessEventKind::ProcessRestored { step: process.current.clone() });
        Ok(process)
    }

    // ---- ciclo de ejecución ----

    fn run(&mut self, ctx: &EngineContext) -> Result<(), ProcessError> {
        let mut transitions = 0usize;
        while let Some(name) = self.current.clone() {
            if self.cancel.is_raised() {
                return Err(ProcessError::Cancelled { step: name });
            }
            self.scope_base = self.depths;
            if !self.prepare_step(&name, ctx)? {
                self.suspend(&name, None);
                return Ok(());
            }
            if transitions >= ctx.config.max_transitions {
                return Err(ProcessError::TransitionLimit(ctx.config.max_transitions));
            }
            if !self.perform_and_advance(&name, ctx)? {
                return Ok(());
            }
            transitions += 1;
        }
        Ok(())
    }

    fn resume_with(&mut self,
                   name: &str,
                   key: Option<ParamId>,
                   kind: EventKind,
                   ctx: &EngineContext)
                   -> Result<(), ProcessError> {
        let Some(key) = key else {
            self.check_validation(name, false)?;
            return self.perform_then_run(name, ctx);
        };
        let continuation = tree::is_continuation(&self.slot(name)?.tree, &key);
        self.dispatch(name, InteractionEvent { key: key.clone(), kind }, ctx)?;
        if continuation {
            self.check_validation(name, false)?;
            self.with_slot(name, ctx, |parts, env| {
                    env.runtime.continuation_cause = Some(key);
                    let path = [name.to_string()];
                    tree::invoke(parts.step.as_mut(), name, &path, parts.tree, env, |s, c| s.prepare_continuation(c))
                })?;
            return self.perform_then_run(name, ctx);
        }
        self.check_validation(name, true)?;
        self.slot_mut(name)?.phase = StepPhase::ReEntered;
        self.run(ctx)
    }

    fn perform_then_run(&mut self, name: &str, ctx: &EngineContext) -> Result<(), ProcessError> {
        if self.perform_and_advance(name, ctx)? {
            self.run(ctx)
        } else {
            Ok(())
        }
    }

    /// Prepara el step. Devuelve `true` si puede ejecutarse sin interacción.
    fn prepare_step(&mut self, name: &str, ctx: &EngineContext) -> Result<bool, ProcessError> {
        let (phase, auto_update) = {
            let slot = self.slot(name)?;
            (slot.phase, slot.runtime.auto_update.is_some())
        };
        if phase == StepPhase::RolledBack {
            return Ok(true);
        }
        let light = auto_update || phase == StepPhase::ReEntered;
        if !light {
            let config = self.slot(name)?.step.config();
            if let Some(missing) = config.mandatory.iter().find(|k| !self.store.contains(k)) {
                return Err(ProcessError::MissingMandatoryParameter { step: name.to_string(),
                                                                     param: missing.clone() });
            }
        }
        self.with_slot(name, ctx, |parts, env| {
                let path = [name.to_string()];
                if light {
                    tree::prepare_interaction(parts.step.as_mut(), name, &path, parts.tree, env)?;
                    env.runtime.event = None;
                    env.runtime.auto_update = None;
                } else {
                    if parts.tree.state != FragmentState::Active {
                        tree::init(parts.step.as_mut(), name, &path, parts.tree, env)?;
                    }
                    tree::invoke(parts.step.as_mut(), name, &path, parts.tree, env, |s, c| s.prepare_execution(c))?;
                }
                *parts.phase = StepPhase::Prepared;
                let needs_interaction = {
                    let c = env.context(name, &mut parts.tree.layout);
                    parts.step.needs_interaction(&c)
                };
                if needs_interaction && !auto_update {
                    *parts.phase = StepPhase::AwaitingInteraction;
                    return Ok(false);
                }
                Ok(true)
            })
    }

    /// Ejecuta el step y avanza. Devuelve `false` si el step pidió
    /// auto-update y el proceso quedó suspendido con `retry_after`.
    fn perform_and_advance(&mut self, name: &str, ctx: &EngineContext) -> Result<bool, ProcessError> {
        let next = self.perform(name, ctx)?;
        if matches!(&next, Transition::Step(n) if n == name) {
            if let Some(delay) = self.slot(name)?.runtime.auto_update {
                self.suspend(name, Some(delay));
                return Ok(false);
            }
        }
        self.advance(name, next)?;
        Ok(true)
    }

    /// `execute` envuelto en sus scopes. Tras un éxito sin auto-update deja un
    /// punto de rollback, limpia el árbol y marca el step como `Done`.
    fn perform(&mut self, name: &str, ctx: &EngineContext) -> Result<Transition, ProcessError> {
        let config = self.slot(name)?.step.config();
        let (transaction, history) = config.effective_scopes();
        let before = self.store.state().clone();
        let depths_before = self.depths;
        debug!("step:start process_id={} step={}", self.id, name);
        self.journal.push(ProcessEventKind::StepStarted { step: name.to_string() });

        if history.opens() {
            ctx.history.begin_group(self.id, name).map_err(|e| coordinator_error(name, e))?;
            self.depths.history += 1;
        }
        if transaction.opens() {
            ctx.transactions.begin(self.id, name).map_err(|e| coordinator_error(name, e))?;
            self.depths.transaction += 1;
        }
        self.with_slot(name, ctx, |parts, env| {
                *parts.phase = StepPhase::Executing;
                let path = [name.to_string()];
                tree::invoke(parts.step.as_mut(), name, &path, parts.tree, env, |s, c| s.execute(c))
            })?;
        if transaction.closes() {
            if self.depths.transaction == 0 {
                return Err(ProcessError::TransactionNesting { step: name.to_string(),
                                                              scope: "transaction",
                                                              depth: 0 });
            }
            ctx.transactions.commit(self.id, name).map_err(|e| coordinator_error(name, e))?;
            self.depths.transaction -= 1;
        }
        if history.closes() {
            if self.depths.history == 0 {
                return Err(ProcessError::TransactionNesting { step: name.to_string(),
                                                              scope: "history",
                                                              depth: 0 });
            }
            ctx.history.commit_group(self.id, name).map_err(|e| coordinator_error(name, e))?;
            self.depths.history -= 1;
        }

        let (rerun, transition, spawn) = {
            let slot = self.slot_mut(name)?;
            (slot.runtime.auto_update.is_some(), slot.runtime.transition.take(), std::mem::take(&mut slot.runtime.spawn))
        };
        self.spawn_requests.extend(spawn);
        if rerun {
            self.slot_mut(name)?.phase = StepPhase::AwaitingInteraction;
            return Ok(Transition::Step(name.to_string()));
        }

        self.record_point(name, config.can_rollback, before, depths_before);
        self.with_slot(name, ctx, |parts, env| {
                let path = [name.to_string()];
                tree::invoke(parts.step.as_mut(), name, &path, parts.tree, env, |s, c| s.cleanup(c))?;
                tree::finish(parts.step.as_mut(), name, parts.tree, env)?;
                *parts.tree = FragmentTree::default();
                *env.runtime = StepRuntime::default();
                *parts.phase = StepPhase::Done;
                Ok(())
            })?;
        debug!("step:finished process_id={} step={}", self.id, name);
        self.journal.push(ProcessEventKind::StepFinished { step: name.to_string() });
        Ok(transition.unwrap_or(match config.next_step {
                                    Some(next) => Transition::Step(next),
                                    None => Transition::Finish,
                                }))
    }

    fn advance(&mut self, from: &str, next: Transition) -> Result<(), ProcessError> {
        match next {
            Transition::Finish => self.finish(from),
            Transition::Step(to) => {
                let slot = self.slots
                               .get_mut(&to)
                               .ok_or_else(|| ProcessError::UnknownStep(to.clone()))?;
                if slot.phase == StepPhase::Done {
                    slot.phase = StepPhase::NotPrepared;
                }
                self.current = Some(to);
                Ok(())
            }
        }
    }

    fn finish(&mut self, from: &str) -> Result<(), ProcessError> {
        if self.depths.transaction != 0 {
            return Err(ProcessError::TransactionNesting { step: from.to_string(),
                                                          scope: "transaction",
                                                          depth: self.depths.transaction });
        }
        if self.depths.history != 0 {
            return Err(ProcessError::TransactionNesting { step: from.to_string(),
                                                          scope: "history",
                                                          depth: self.depths.history });
        }
        let state = serde_json::to_value(self.store.persistent_state()).map_err(|e| ProcessError::InvalidState(e.to_string()))?;
        let fingerprint = hash_value(&json!({
                                         "engine_version": ENGINE_VERSION,
                                         "definition": self.definition,
                                         "state": state
                                     }));
        self.status = ProcessStatus::Finished;
        self.current = None;
        self.retry_after = None;
        debug!("process:finished process_id={} fingerprint={}", self.id, fingerprint);
        self.journal.push(ProcessEventKind::ProcessFinished { fingerprint });
        Ok(())
    }

    fn suspend(&mut self, name: &str, retry_after: Option<Duration>) {
        self.status = ProcessStatus::Suspended;
        self.retry_after = retry_after;
        let params = self.slot(name)
                         .map(|slot| slot.tree.layout.interaction_params().to_vec())
                         .unwrap_or_default();
        self.journal.push(ProcessEventKind::InteractionRequested { step: name.to_string(), params });
    }

    fn dispatch(&mut self, name: &str, event: InteractionEvent, ctx: &EngineContext) -> Result<(), ProcessError> {
        self.with_slot(name, ctx, |parts, env| {
                let key = event.key.clone();
                env.runtime.event = Some(event);
                let path = [name.to_string()];
                if !tree::dispatch(parts.step.as_mut(), name, &path, parts.tree, &key, env)? {
                    debug!("interaction:ignored step={} key={}", name, key);
                }
                Ok(())
            })
    }

    /// Valida el árbol del step. Con `on_interaction` sólo corren las
    /// validaciones continuas.
    fn check_validation(&mut self, name: &str, on_interaction: bool) -> Result<(), ProcessError> {
        let mut errors = ValidationErrors::new();
        tree::validate(&self.slot(name)?.tree, &self.store, on_interaction, &mut errors);
        if errors.is_empty() {
            self.validation_errors.clear();
            return Ok(());
        }
        self.slot_mut(name)?.runtime.event = None;
        self.validation_errors = errors.clone();
        self.journal.push(ProcessEventKind::ValidationFailed { step: name.to_string(),
                                                               params: errors.keys().cloned().collect() });
        Err(ProcessError::ValidationFailure { step: name.to_string(), errors })
    }

    /// Guarda el punto de rollback de un step recién ejecutado. Un step sin
    /// soporte de rollback deja los puntos previos inalcanzables: se
    /// sustituyen por una barrera sin estado. Un step que se repite a sí
    /// mismo sólo conserva su último punto.
    fn record_point(&mut self, step: &str, can_rollback: bool, state: ParameterState, depths: ScopeDepths) {
        if !can_rollback {
            self.history.clear();
            self.history.push(RollbackPoint { step: step.to_string(),
                                              state: ParameterState::default(),
                                              depths });
            return;
        }
        if self.history.last().is_some_and(|p| p.step == step) {
            self.history.pop();
        }
        self.history.push(RollbackPoint { step: step.to_string(), state, depths });
    }

    /// Quita los puntos finales del step, ya deshechos por el propio step.
    /// Una barrera se conserva.
    fn drop_points_of(&mut self, step: &str) {
        if !self.slots.get(step).is_some_and(|s| s.step.config().can_rollback) {
            return;
        }
        while self.history.last().is_some_and(|p| p.step == step) {
            self.history.pop();
        }
    }

    /// Índice del punto al que vuelve un rollback: el más reciente cuyos
    /// scopes siguen abiertos. `Err` lleva el step que impide el rollback,
    /// o `None` si no hay punto alcanzable.
    fn rollback_start(&self) -> Result<usize, Option<String>> {
        let start = self.history
                        .iter()
                        .rposition(|p| p.depths.is_within(self.depths))
                        .ok_or(None::<String>)?;
        for point in self.history[start..].iter().rev() {
            let supported = self.slots.get(&point.step).is_some_and(|s| s.step.config().can_rollback);
            if !supported {
                return Err(Some(point.step.clone()));
            }
        }
        Ok(start)
    }

    fn rollback_to(&mut self, start: usize, current: &str, ctx: &EngineContext) -> Result<(), ProcessError> {
        let mut undone = self.history.split_off(start).into_iter();
        let point = undone.next()
                          .ok_or_else(|| ProcessError::RollbackUnsupported { step: current.to_string() })?;
        let undone: Vec<RollbackPoint> = undone.collect();
        let target = point.step.clone();
        self.with_slot(current, ctx, |parts, env| {
                if parts.tree.state == FragmentState::Active {
                    tree::abort(parts.step.as_mut(), current, parts.tree, env);
                }
                *parts.tree = FragmentTree::default();
                *parts.phase = StepPhase::NotPrepared;
                *env.runtime = StepRuntime::default();
                Ok(())
            })?;
        for skipped in undone.iter().rev() {
            let path = [skipped.step.clone()];
            self.with_slot(&skipped.step, ctx, |parts, env| {
                    tree::invoke(parts.step.as_mut(), &skipped.step, &path, parts.tree, env, |s, c| s.rollback(c))
                })?;
        }
        let path = [target.clone()];
        self.with_slot(&target, ctx, |parts, env| {
                tree::invoke(parts.step.as_mut(), &target, &path, parts.tree, env, |s, c| s.rollback(c))
            })?;
        self.unwind_scopes(point.depths, &target, ctx);
        self.store.replace_state(point.state.clone());
        self.with_slot(&target, ctx, |parts, env| tree::init(parts.step.as_mut(), &target, &path, parts.tree, env))?;
        self.store.replace_state(point.state);
        let interactive = self.with_slot(&target, ctx, |parts, env| {
                                  let c = env.context(&target, &mut parts.tree.layout);
                                  Ok(parts.step.needs_interaction(&c))
                              })?;
        self.slot_mut(&target)?.phase = if interactive {
            StepPhase::AwaitingInteraction
        } else {
            StepPhase::RolledBack
        };
        debug!("process:rollback process_id={} from={} to={}", self.id, current, target);
        self.journal.push(ProcessEventKind::RolledBack { from: current.to_string(), to: target.clone() });
        self.current = Some(target);
        self.status = ProcessStatus::Suspended;
        self.retry_blocked = false;
        self.validation_errors.clear();
        self.retry_after = None;
        Ok(())
    }

    /// Cierra con rollback los scopes abiertos por encima de `target`.
    fn unwind_scopes(&mut self, target: ScopeDepths, step: &str, ctx: &EngineContext) {
        while self.depths.transaction > target.transaction {
            if let Err(e) = ctx.transactions.rollback(self.id, step) {
                warn!("scope:rollback_failed process_id={} step={} scope=transaction error={}", self.id, step, e);
            }
            self.depths.transaction -= 1;
        }
        while self.depths.history > target.history {
            if let Err(e) = ctx.history.rollback_group(self.id, step) {
                warn!("scope:rollback_failed process_id={} step={} scope=history error={}", self.id, step, e);
            }
            self.depths.history -= 1;
        }
    }

    fn abort_current(&mut self, ctx: &EngineContext) {
        let Some(name) = self.current.clone() else {
            return;
        };
        let aborted = self.with_slot(&name, ctx, |parts, env| {
                              if parts.tree.state == FragmentState::Active {
                                  tree::abort(parts.step.as_mut(), &name, parts.tree, env);
                              }
                              *parts.tree = FragmentTree::default();
                              *env.runtime = StepRuntime::default();
                              Ok(())
                          });
        if let Err(e) = aborted {
            warn!("process:abort_failed process_id={} step={} error={}", self.id, name, e);
        }
    }

    fn mark_cancelled(&mut self, ctx: &EngineContext) {
        let step = self.current.clone().unwrap_or_default();
        self.unwind_scopes(ScopeDepths::default(), &step, ctx);
        self.status = ProcessStatus::Cancelled;
        self.retry_after = None;
        debug!("process:cancelled process_id={} step={}", self.id, step);
        self.journal.push(ProcessEventKind::ProcessCancelled { step: self.current.clone() });
    }

    /// Cierra una operación pública: traduce el error en el estado del
    /// proceso. Las validaciones dejan el proceso suspendido, una cancelación
    /// lo cancela y cualquier otro fallo deshace los scopes abiertos y lo
    /// marca como `Failed` sin mover el puntero de step.
    fn conclude(&mut self, result: Result<(), ProcessError>, ctx: &EngineContext) -> Result<(), ProcessError> {
        let err = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        match &err {
            ProcessError::Cancelled { .. } => {
                self.abort_current(ctx);
                self.mark_cancelled(ctx);
            }
            e if e.is_recoverable() => {
                self.status = ProcessStatus::Suspended;
            }
            _ => {
                let step = err.step()
                              .map(str::to_string)
                              .or_else(|| self.current.clone())
                              .unwrap_or_default();
                error!("process:failed process_id={} step={} error={}", self.id, step, err);
                if !self.scope_base.is_balanced() {
                    warn!("process:retry_blocked process_id={} step={} depths={:?}", self.id, step, self.scope_base);
                    self.retry_blocked = true;
                }
                self.unwind_scopes(ScopeDepths::default(), &step, ctx);
                self.status = ProcessStatus::Failed;
                self.journal.push(ProcessEventKind::StepFailed { step, error: err.to_string() });
            }
        }
        Err(err)
    }

    /// Rechaza una petición sin tocar el estado; queda registrada en el log y
    /// en el journal igual que un fallo.
    fn refuse(&mut self, err: ProcessError) -> Result<(), ProcessError> {
        let step = err.step()
                      .map(str::to_string)
                      .or_else(|| self.current.clone())
                      .unwrap_or_default();
        error!("process:refused process_id={} step={} error={}", self.id, step, err);
        self.journal.push(ProcessEventKind::StepFailed { step, error: err.to_string() });
        Err(err)
    }

    // ---- acceso a slots ----

    fn current_name(&self) -> Result<String, ProcessError> {
        self.current
            .clone()
            .ok_or_else(|| ProcessError::InvalidState(format!("process {} has no current step", self.id)))
    }

    fn auto_update_pending(&self) -> bool {
        self.current
            .as_ref()
            .and_then(|n| self.slots.get(n))
            .is_some_and(|s| s.runtime.auto_update.is_some())
    }

    fn slot(&self, name: &str) -> Result<&StepSlot, ProcessError> {
        self.slots.get(name).ok_or_else(|| ProcessError::UnknownStep(name.to_string()))
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut StepSlot, ProcessError> {
        self.slots.get_mut(name).ok_or_else(|| ProcessError::UnknownStep(name.to_string()))
    }

    fn with_slot<R>(&mut self,
                    name: &str,
                    ctx: &EngineContext,
                    f: impl FnOnce(SlotParts<'_>, &mut StepEnv<'_>) -> Result<R, ProcessError>)
                    -> Result<R, ProcessError> {
        let Process { id, store, slots, cancel, .. } = self;
        let slot = slots.get_mut(name).ok_or_else(|| ProcessError::UnknownStep(name.to_string()))?;
        let StepSlot { step, tree, phase, runtime } = slot;
        let mut env = StepEnv { process_id: *id,
                                step: name,
                                store,
                                runtime,
                                env: ctx,
                                cancel };
        f(SlotParts { step, tree, phase }, &mut env)
    }
}

fn coordinator_error(step: &str, source: crate::errors::EntityError) -> ProcessError {
    ProcessError::Coordinator { step: step.to_string(), source }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
         .field("id", &self.id)
         .field("definition", &self.definition)
         .field("status", &self.status)
         .field("current", &self.current)
         .field("depths", &self.depths)
         .finish_non_exhaustive()
    }
}
