use serde_json::json;

use crate::hashing::hash_value;
use crate::param::{KeyInfo, ParamKey};
use crate::step::Step;

/// Definición de un proceso: steps (el primero es el de entrada) y claves
/// cuyos modificadores deben conocerse al aplicar valores sin tipo.
pub struct ProcessDefinition {
    name: String,
    steps: Vec<Box<dyn Step>>,
    keys: Vec<KeyInfo>,
}

impl ProcessDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               steps: Vec::new(),
               keys: Vec::new() }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn key<T>(mut self, key: &ParamKey<T>) -> Self {
        self.keys.push(key.info());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn keys(&self) -> &[KeyInfo] {
        &self.keys
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Hash estable del nombre y la secuencia de steps.
    pub fn definition_hash(&self) -> String {
        hash_value(&json!({ "name": self.name, "steps": self.step_names() }))
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Box<dyn Step>>, Vec<KeyInfo>) {
        (self.name, self.steps, self.keys)
    }
}

impl std::fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessDefinition")
         .field("name", &self.name)
         .field("steps", &self.step_names())
         .finish()
    }
}
