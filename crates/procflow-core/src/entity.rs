//! Contrato estrecho con la capa de entidades.
//!
//! El engine sólo ve `store` y `query`; ni SQL ni caché. La implementación en
//! memoria sirve para tests y demos y sincroniza internamente con `DashMap`,
//! ya que el store se comparte entre procesos.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::EntityError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub id: Option<Uuid>,
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(),
               id: None,
               attributes: Map::new() }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Criterio de búsqueda: tipo de entidad más igualdades sobre atributos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub kind: String,
    pub filters: Vec<(String, Value)>,
}

impl Criteria {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(),
               filters: Vec::new() }
    }

    pub fn filter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filters.push((name.to_string(), value.into()));
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        entity.kind == self.kind && self.filters.iter().all(|(k, v)| entity.attributes.get(k) == Some(v))
    }
}

pub trait EntityStore: Send + Sync {
    /// Persiste la entidad y devuelve su id (asignado si no tenía).
    fn store(&self, entity: &Entity) -> Result<Uuid, EntityError>;

    /// Secuencia perezosa y finita de entidades que cumplen `criteria`.
    fn query<'a>(&'a self, criteria: &Criteria) -> Box<dyn Iterator<Item = Entity> + 'a>;
}

#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: DashMap<Uuid, Entity>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn store(&self, entity: &Entity) -> Result<Uuid, EntityError> {
        if entity.kind.is_empty() {
            return Err(EntityError::Storage("entity kind must not be empty".into()));
        }
        let id = entity.id.unwrap_or_else(Uuid::new_v4);
        let mut stored = entity.clone();
        stored.id = Some(id);
        self.entities.insert(id, stored);
        Ok(id)
    }

    /// Copia las coincidencias antes de devolverlas: no quedan guards de
    /// DashMap vivos mientras el llamador itera (y puede llamar a `store`).
    fn query<'a>(&'a self, criteria: &Criteria) -> Box<dyn Iterator<Item = Entity> + 'a> {
        let matches: Vec<Entity> = self.entities
                                       .iter()
                                       .filter(|entry| criteria.matches(entry.value()))
                                       .map(|entry| entry.value().clone())
                                       .collect();
        Box::new(matches.into_iter())
    }
}
