//! Core ProcessEngine implementation

use std::collections::HashMap;

use log::{debug, error, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::engine::registry::DefinitionRegistry;
use crate::engine::EngineBuilderInit;
use crate::errors::ProcessError;
use crate::event::{EventStore, InMemoryEventStore, ProcessEvent, ProcessEventKind};
use crate::param::ParameterChanges;
use crate::process::{Interaction, Process, ProcessDefinition, ProcessHandle, ProcessState, ProcessStatus};
use crate::repo::{InMemoryProcessRepository, ProcessRepository};

/// Motor de procesos interactivos.
///
/// Mantiene los procesos vivos en memoria, vuelca sus eventos de auditoría al
/// `EventStore` y persiste un snapshot cada vez que uno queda suspendido. Un
/// proceso desalojado de memoria se reconstruye desde el repositorio en el
/// siguiente acceso.
pub struct ProcessEngine<E = InMemoryEventStore, R = InMemoryProcessRepository>
    where E: EventStore,
          R: ProcessRepository
{
    context: EngineContext,
    registry: DefinitionRegistry,
    event_store: E,
    repository: R,
    processes: HashMap<Uuid, Process>,
}

impl<E, R> ProcessEngine<E, R>
    where E: EventStore,
          R: ProcessRepository
{
    /// Crea un nuevo builder con las stores indicadas.
    #[inline]
    pub fn builder(event_store: E, repository: R) -> EngineBuilderInit<E, R> {
        EngineBuilderInit { event_store, repository }
    }

    pub fn new_with_stores(event_store: E, repository: R, context: EngineContext) -> Self {
        Self { context,
               registry: DefinitionRegistry::new(),
               event_store,
               repository,
               processes: HashMap::new() }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut DefinitionRegistry {
        &mut self.registry
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> Result<(), ProcessError>
        where F: Fn() -> ProcessDefinition + Send + Sync + 'static
    {
        self.registry.register(id, Box::new(factory))
    }

    /// Instancia un proceso nuevo (estado `Created`, sin ejecutar).
    pub fn create_process(&mut self, definition: &str) -> Result<ProcessHandle, ProcessError> {
        let mut process = Process::new(Uuid::new_v4(), self.registry.instantiate(definition)?)?;
        let handle = ProcessHandle::new(process.id(), process.cancellation_flag().clone());
        debug!("process:create process_id={} definition={}", process.id(), definition);
        self.flush(&mut process);
        self.processes.insert(process.id(), process);
        Ok(handle)
    }

    /// Handle de un proceso en memoria (p.ej. uno creado con `spawn`).
    pub fn handle(&self, id: Uuid) -> Option<ProcessHandle> {
        self.processes
            .get(&id)
            .map(|p| ProcessHandle::new(p.id(), p.cancellation_flag().clone()))
    }

    pub fn execute(&mut self, handle: &ProcessHandle) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |p, ctx| p.execute(ctx))
    }

    pub fn resume(&mut self, handle: &ProcessHandle, interaction: Interaction) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |p, ctx| p.resume(interaction, ctx))
    }

    pub fn rollback(&mut self, handle: &ProcessHandle) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |p, ctx| p.rollback(ctx))
    }

    pub fn cancel(&mut self, handle: &ProcessHandle) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |p, ctx| {
                p.cancel(ctx);
                Ok(())
            })
    }

    /// Estado actual para la capa de presentación.
    pub fn state(&mut self, handle: &ProcessHandle) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |_, _| Ok(()))
    }

    /// Parámetros modificados (y cambio estructural) desde la última llamada.
    pub fn take_changes(&mut self, handle: &ProcessHandle) -> Result<ParameterChanges, ProcessError> {
        self.ensure_loaded(handle.id())?;
        self.processes
            .get_mut(&handle.id())
            .map(Process::take_changes)
            .ok_or(ProcessError::ProcessNotFound(handle.id()))
    }

    /// Desaloja el proceso de memoria dejando su snapshot en el repositorio.
    pub fn evict(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        let Some(process) = self.processes.remove(&handle.id()) else {
            return Ok(());
        };
        if !process.status().is_terminal() {
            self.repository.save(&process.snapshot()?)?;
        }
        debug!("process:evict process_id={}", handle.id());
        Ok(())
    }

    /// Reconstruye explícitamente un proceso desalojado.
    pub fn restore(&mut self, handle: &ProcessHandle) -> Result<ProcessState, ProcessError> {
        self.operate(handle, |_, _| Ok(()))
    }

    /// Olvida el proceso: lo quita de memoria y del repositorio.
    pub fn release(&mut self, handle: &ProcessHandle) -> Result<(), ProcessError> {
        self.processes.remove(&handle.id());
        self.repository.remove(handle.id())
    }

    pub fn is_loaded(&self, handle: &ProcessHandle) -> bool {
        self.processes.contains_key(&handle.id())
    }

    pub fn events(&self, handle: &ProcessHandle) -> Vec<ProcessEvent> {
        self.event_store.list(handle.id())
    }

    /// Variante compacta de eventos.
    pub fn event_variants(&self, handle: &ProcessHandle) -> Vec<&'static str> {
        self.events(handle)
            .iter()
            .map(|e| match e.kind {
                ProcessEventKind::ProcessCreated { .. } => "I",
                ProcessEventKind::StepStarted { .. } => "S",
                ProcessEventKind::StepFinished { .. } => "F",
                ProcessEventKind::StepFailed { .. } => "X",
                ProcessEventKind::InteractionRequested { .. } => "U",
                ProcessEventKind::InteractionReceived { .. } => "V",
                ProcessEventKind::ValidationFailed { .. } => "E",
                ProcessEventKind::RolledBack { .. } => "R",
                ProcessEventKind::ProcessFinished { .. } => "C",
                ProcessEventKind::ProcessCancelled { .. } => "K",
                ProcessEventKind::ProcessRestored { .. } => "L",
                ProcessEventKind::ProcessSpawned { .. } => "B",
            })
            .collect()
    }

    /// Fingerprint de cierre si el proceso terminó.
    pub fn fingerprint(&self, handle: &ProcessHandle) -> Option<String> {
        self.events(handle).iter().rev().find_map(|e| match &e.kind {
                                             ProcessEventKind::ProcessFinished { fingerprint } => Some(fingerprint.clone()),
                                             _ => None,
                                         })
    }

    /// Saca el proceso del mapa, aplica `op` y lo devuelve tras volcar
    /// eventos, crear procesos derivados y persistir. Un proceso terminado no
    /// vuelve al mapa; sus eventos siguen en el event store.
    fn operate(&mut self,
               handle: &ProcessHandle,
               op: impl FnOnce(&mut Process, &EngineContext) -> Result<(), ProcessError>)
               -> Result<ProcessState, ProcessError> {
        let id = handle.id();
        let mut process = self.take_process(id)?;
        process.share_cancellation(handle.cancellation_flag());
        let result = op(&mut process, &self.context);
        self.spawn_children(&mut process);
        self.flush(&mut process);
        let persisted = self.persist(&process);
        let state = process.state();
        if process.status().is_terminal() {
            debug!("process:dropped process_id={} status={:?}", id, process.status());
        } else {
            self.processes.insert(id, process);
        }
        result?;
        persisted?;
        Ok(state)
    }

    fn ensure_loaded(&mut self, id: Uuid) -> Result<(), ProcessError> {
        if !self.processes.contains_key(&id) {
            let process = self.take_process(id)?;
            self.processes.insert(id, process);
        }
        Ok(())
    }

    fn take_process(&mut self, id: Uuid) -> Result<Process, ProcessError> {
        if let Some(process) = self.processes.remove(&id) {
            return Ok(process);
        }
        let snapshot = self.repository.load(id)?.ok_or(ProcessError::ProcessNotFound(id))?;
        let definition = self.registry.instantiate(&snapshot.definition)?;
        let mut process = match Process::restore(definition, snapshot, &self.context) {
            Ok(process) => process,
            Err(e) => {
                error!("process:restore_failed process_id={} error={}", id, e);
                return Err(e);
            }
        };
        debug!("process:restore process_id={} step={:?}", id, process.current_step());
        self.flush(&mut process);
        Ok(process)
    }

    fn spawn_children(&mut self, process: &mut Process) {
        for definition in process.take_spawn_requests() {
            let child = self.registry
                            .instantiate(&definition)
                            .and_then(|d| Process::new(Uuid::new_v4(), d));
            match child {
                Ok(mut child) => {
                    let child_id = child.id();
                    debug!("process:spawn parent={} child={} definition={}", process.id(), child_id, definition);
                    self.flush(&mut child);
                    self.processes.insert(child_id, child);
                    process.record_spawned(child_id, definition);
                }
                Err(e) => warn!("process:spawn_failed parent={} definition={} error={}", process.id(), definition, e),
            }
        }
    }

    fn flush(&mut self, process: &mut Process) {
        for kind in process.take_journal() {
            self.event_store.append_kind(process.id(), kind);
        }
    }

    fn persist(&mut self, process: &Process) -> Result<(), ProcessError> {
        if !self.context.config.persist_snapshots {
            return Ok(());
        }
        match process.status() {
            ProcessStatus::Suspended | ProcessStatus::Failed => self.repository.save(&process.snapshot()?),
            ProcessStatus::Finished | ProcessStatus::Cancelled => self.repository.remove(process.id()),
            ProcessStatus::Created | ProcessStatus::Running => Ok(()),
        }
    }
}

impl ProcessEngine<InMemoryEventStore, InMemoryProcessRepository> {
    /// Crea un nuevo builder con stores en memoria.
    #[inline]
    pub fn new() -> EngineBuilderInit<InMemoryEventStore, InMemoryProcessRepository> {
        EngineBuilderInit { event_store: InMemoryEventStore::default(),
                            repository: InMemoryProcessRepository::new() }
    }
}

impl Default for ProcessEngine<InMemoryEventStore, InMemoryProcessRepository> {
    fn default() -> Self {
        Self::new_with_stores(InMemoryEventStore::default(),
                              InMemoryProcessRepository::new(),
                              EngineContext::default())
    }
}

impl<E, R> std::fmt::Debug for ProcessEngine<E, R>
    where E: EventStore,
          R: ProcessRepository
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
         .field("context", &self.context)
         .field("registry", &self.registry)
         .field("processes", &self.processes.len())
         .finish_non_exhaustive()
    }
}
