//! `ParameterStore`: contenedor de parámetros de un proceso.
//!
//! El estado se compone de tres mapas indexados por el mismo `ParamId`
//! (valores, anotaciones y propiedades de presentación) agrupados en
//! `ParameterState`, que es la unidad de rollback y de persistencia.
//!
//! Invariantes:
//! - A lo sumo un valor por clave.
//! - `set` marca el parámetro como modificado siempre, sin comparar con el
//!   valor anterior. `get` nunca toca el conjunto de modificados.
//! - Asignar una clave `key_list` marca un cambio estructural.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::annotation::AnnotationKey;
use super::key::{KeyFlags, ParamId, ParamKey};
use crate::errors::ParamError;

pub type PropertyMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub values: BTreeMap<ParamId, Value>,
    pub annotations: BTreeMap<ParamId, PropertyMap>,
    pub properties: BTreeMap<ParamId, PropertyMap>,
}

impl ParameterState {
    /// Copia del estado sin las claves indicadas.
    pub fn without(&self, excluded: &BTreeSet<ParamId>) -> Self {
        let keep = |id: &ParamId| !excluded.contains(id);
        Self { values: self.values.iter().filter(|(k, _)| keep(k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
               annotations: self.annotations.iter().filter(|(k, _)| keep(k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
               properties: self.properties.iter().filter(|(k, _)| keep(k)).map(|(k, v)| (k.clone(), v.clone())).collect() }
    }
}

/// Cambios acumulados desde la última consulta, para el diff de la UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChanges {
    pub modified: Vec<ParamId>,
    pub structure_changed: bool,
}

#[derive(Debug, Default)]
pub struct ParameterStore {
    state: ParameterState,
    transient: BTreeSet<ParamId>,
    modified: BTreeSet<ParamId>,
    structure_changed: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ParamId) -> bool {
        self.state.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.values.is_empty()
    }

    /// Valor del parámetro o, si no existe, el default declarado en la clave.
    pub fn get<T: DeserializeOwned>(&self, key: &ParamKey<T>) -> Result<Option<T>, ParamError> {
        match self.state.values.get(key.id()) {
            Some(v) => serde_json::from_value(v.clone()).map(Some)
                                                        .map_err(|e| ParamError::Conversion { param: key.id().clone(),
                                                                                              message: e.to_string() }),
            None => Ok(key.default_value()),
        }
    }

    /// Valor crudo (JSON) sin aplicar defaults.
    pub fn value(&self, id: &ParamId) -> Option<&Value> {
        self.state.values.get(id)
    }

    pub fn set<T: Serialize>(&mut self, key: &ParamKey<T>, value: T) -> Result<(), ParamError> {
        if key.flags().final_value && self.contains(key.id()) {
            return Err(ParamError::FinalValue(key.id().clone()));
        }
        let json = serde_json::to_value(value).map_err(|e| ParamError::Conversion { param: key.id().clone(),
                                                                                   message: e.to_string() })?;
        self.set_value(key.id().clone(), json, key.flags());
        Ok(())
    }

    /// Asignación no tipada; la usa el engine para aplicar valores que llegan
    /// desde la capa de UI.
    pub fn set_value(&mut self, id: ParamId, value: Value, flags: KeyFlags) {
        if flags.transient {
            self.transient.insert(id.clone());
        }
        if flags.key_list {
            self.structure_changed = true;
        }
        self.modified.insert(id.clone());
        self.state.values.insert(id, value);
    }

    /// Elimina el parámetro junto con sus anotaciones y propiedades.
    pub fn remove(&mut self, id: &ParamId) -> Option<Value> {
        self.state.annotations.remove(id);
        self.state.properties.remove(id);
        self.transient.remove(id);
        let removed = self.state.values.remove(id);
        if removed.is_some() {
            self.modified.insert(id.clone());
        }
        removed
    }

    /// Adjunta una anotación. Si el parámetro no existe y su clave declara un
    /// default, se crea primero con ese valor.
    pub fn annotate<T: Serialize, A: Serialize>(&mut self,
                                                key: &ParamKey<T>,
                                                annotation: &AnnotationKey<A>,
                                                value: A)
                                                -> Result<(), ParamError> {
        if !self.contains(key.id()) {
            if let Some(default) = key.default_value() {
                self.set(key, default)?;
            }
        }
        let json = serde_json::to_value(value).map_err(|e| ParamError::Conversion { param: key.id().clone(),
                                                                                   message: e.to_string() })?;
        self.state
            .annotations
            .entry(key.id().clone())
            .or_default()
            .insert(annotation.name().to_string(), json);
        Ok(())
    }

    pub fn annotation<A: DeserializeOwned>(&self, id: &ParamId, annotation: &AnnotationKey<A>) -> Option<A> {
        self.state
            .annotations
            .get(id)
            .and_then(|m| m.get(annotation.name()))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn annotations(&self, id: &ParamId) -> Option<&PropertyMap> {
        self.state.annotations.get(id)
    }

    /// Propiedad de presentación (etiqueta, estilo, ...). No cuenta como
    /// modificación del valor.
    pub fn set_property(&mut self, id: &ParamId, name: &str, value: Value) {
        self.state.properties.entry(id.clone()).or_default().insert(name.to_string(), value);
    }

    pub fn property(&self, id: &ParamId, name: &str) -> Option<&Value> {
        self.state.properties.get(id).and_then(|m| m.get(name))
    }

    pub fn properties(&self, id: &ParamId) -> Option<&PropertyMap> {
        self.state.properties.get(id)
    }

    pub fn is_modified(&self, id: &ParamId) -> bool {
        self.modified.contains(id)
    }

    pub fn modified(&self) -> impl Iterator<Item = &ParamId> {
        self.modified.iter()
    }

    pub fn structure_changed(&self) -> bool {
        self.structure_changed
    }

    pub fn take_changes(&mut self) -> ParameterChanges {
        let modified = std::mem::take(&mut self.modified).into_iter().collect();
        let structure_changed = std::mem::replace(&mut self.structure_changed, false);
        ParameterChanges { modified, structure_changed }
    }

    pub fn clear_modified(&mut self) {
        self.modified.clear();
        self.structure_changed = false;
    }

    pub fn state(&self) -> &ParameterState {
        &self.state
    }

    pub fn transient_ids(&self) -> &BTreeSet<ParamId> {
        &self.transient
    }

    /// Estado sin las entradas transitorias.
    pub fn persistent_state(&self) -> ParameterState {
        self.state.without(&self.transient)
    }

    /// Reemplaza el estado completo (rollback o restauración) y reinicia el
    /// seguimiento de modificaciones.
    pub fn replace_state(&mut self, state: ParameterState) {
        self.transient.retain(|id| state.values.contains_key(id));
        self.state = state;
        self.clear_modified();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::annotation::{ALLOWED_VALUES, MAX_VALUE};
    use crate::param::key::ParamList;
    use serde_json::json;

    const NAME: ParamKey<String> = ParamKey::new("name");
    const COUNT: ParamKey<u32> = ParamKey::new("count").with_default(|| 3);
    const ORDER_ID: ParamKey<u64> = ParamKey::new("order_id").final_value();
    const CACHE: ParamKey<String> = ParamKey::new("cache").transient();
    const CHILDREN: ParamKey<ParamList> = ParamKey::key_list("children");

    #[test]
    fn get_falls_back_to_declared_default() {
        let store = ParameterStore::new();
        assert_eq!(store.get(&NAME).unwrap(), None);
        assert_eq!(store.get(&COUNT).unwrap(), Some(3));
        assert!(!store.contains(COUNT.id()));
    }

    #[test]
    fn consecutive_gets_are_idempotent_and_do_not_mark_modified() {
        let mut store = ParameterStore::new();
        store.set(&NAME, "ada".to_string()).unwrap();
        store.clear_modified();
        let a = store.get(&NAME).unwrap();
        let b = store.get(&NAME).unwrap();
        assert_eq!(a, b);
        assert!(!store.is_modified(NAME.id()));
    }

    #[test]
    fn set_marks_modified_even_for_equal_values() {
        let mut store = ParameterStore::new();
        store.set(&NAME, "ada".to_string()).unwrap();
        store.clear_modified();
        store.set(&NAME, "ada".to_string()).unwrap();
        assert!(store.is_modified(NAME.id()));
    }

    #[test]
    fn key_list_values_flag_structure_change() {
        let mut store = ParameterStore::new();
        store.set(&NAME, "x".to_string()).unwrap();
        assert!(!store.structure_changed());
        store.set(&CHILDREN, vec![NAME.id().clone()]).unwrap();
        let changes = store.take_changes();
        assert!(changes.structure_changed);
        assert_eq!(changes.modified.len(), 2);
        assert!(!store.structure_changed());
    }

    #[test]
    fn final_values_reject_second_write() {
        let mut store = ParameterStore::new();
        store.set(&ORDER_ID, 10).unwrap();
        assert_eq!(store.set(&ORDER_ID, 11), Err(ParamError::FinalValue(ORDER_ID.id().clone())));
        assert_eq!(store.get(&ORDER_ID).unwrap(), Some(10));
    }

    #[test]
    fn annotate_creates_parameter_with_default() {
        let mut store = ParameterStore::new();
        store.annotate(&COUNT, &MAX_VALUE, 9.0).unwrap();
        assert_eq!(store.value(COUNT.id()), Some(&json!(3)));
        assert_eq!(store.annotation(COUNT.id(), &MAX_VALUE), Some(9.0));

        store.annotate(&NAME, &ALLOWED_VALUES, vec![json!("a")]).unwrap();
        assert!(!store.contains(NAME.id()));
        assert!(store.annotations(NAME.id()).is_some());
    }

    #[test]
    fn conversion_errors_are_typed() {
        let mut store = ParameterStore::new();
        store.set_value(COUNT.id().clone(), json!("not a number"), KeyFlags::NONE);
        assert!(matches!(store.get(&COUNT), Err(ParamError::Conversion { .. })));
    }

    #[test]
    fn persistent_state_skips_transient_entries() {
        let mut store = ParameterStore::new();
        store.set(&NAME, "ada".to_string()).unwrap();
        store.set(&CACHE, "tmp".to_string()).unwrap();
        let persisted = store.persistent_state();
        assert!(persisted.values.contains_key(NAME.id()));
        assert!(!persisted.values.contains_key(CACHE.id()));
    }

    #[test]
    fn remove_drops_value_annotations_and_properties() {
        let mut store = ParameterStore::new();
        store.set(&NAME, "ada".to_string()).unwrap();
        store.set_property(NAME.id(), "label", json!("Name"));
        store.annotate(&NAME, &ALLOWED_VALUES, vec![json!("ada")]).unwrap();
        assert_eq!(store.remove(NAME.id()), Some(json!("ada")));
        assert!(store.properties(NAME.id()).is_none());
        assert!(store.annotations(NAME.id()).is_none());
    }
}
