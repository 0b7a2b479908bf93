//! Registro explícito de definiciones: identificador estable → factoría.
//!
//! Cada proceso recibe su propia instancia de steps, por eso se registran
//! factorías y no definiciones ya construidas. El registro también es la vía
//! para reconstruir un proceso desde su snapshot.

use std::collections::BTreeMap;

use crate::errors::ProcessError;
use crate::param::KeyRegistry;
use crate::process::ProcessDefinition;

pub type DefinitionFactory = Box<dyn Fn() -> ProcessDefinition + Send + Sync>;

#[derive(Default)]
pub struct DefinitionRegistry {
    factories: BTreeMap<String, DefinitionFactory>,
    keys: KeyRegistry,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una factoría. El nombre de la definición producida debe
    /// coincidir con `id`; sus claves se validan contra las ya registradas.
    pub fn register(&mut self, id: impl Into<String>, factory: DefinitionFactory) -> Result<(), ProcessError> {
        let id = id.into();
        if self.factories.contains_key(&id) {
            return Err(ProcessError::DuplicateDefinition(id));
        }
        let sample = factory();
        if sample.name() != id {
            return Err(ProcessError::InvalidState(format!("factory for '{id}' builds definition '{}'", sample.name())));
        }
        if sample.is_empty() {
            return Err(ProcessError::InvalidState(format!("definition '{id}' has no steps")));
        }
        for info in sample.keys() {
            self.keys.register_info(info.clone())?;
        }
        self.factories.insert(id, factory);
        Ok(())
    }

    pub fn instantiate(&self, id: &str) -> Result<ProcessDefinition, ProcessError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| ProcessError::UnknownDefinition(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
         .field("definitions", &self.factories.keys().collect::<Vec<_>>())
         .field("keys", &self.keys.len())
         .finish()
    }
}
