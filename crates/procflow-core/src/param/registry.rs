//! Registro global (por engine) de claves declaradas.
//!
//! Cada definición de proceso declara sus claves al registrarse; una misma
//! clave puede aparecer en varias definiciones siempre que su tipo y sus
//! modificadores coincidan.

use std::collections::BTreeMap;

use super::key::{KeyFlags, KeyInfo, ParamId, ParamKey};
use crate::errors::ParamError;

#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: BTreeMap<ParamId, KeyInfo>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, key: &ParamKey<T>) -> Result<(), ParamError> {
        self.register_info(key.info())
    }

    pub fn register_info(&mut self, info: KeyInfo) -> Result<(), ParamError> {
        match self.keys.get(&info.id) {
            Some(existing) if *existing != info => Err(ParamError::DuplicateKey(info.id)),
            Some(_) => Ok(()),
            None => {
                self.keys.insert(info.id.clone(), info);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &ParamId) -> Option<&KeyInfo> {
        self.keys.get(id)
    }

    /// Modificadores de una clave; las no registradas no tienen ninguno.
    pub fn flags(&self, id: &ParamId) -> KeyFlags {
        self.keys.get(id).map(|k| k.flags).unwrap_or(KeyFlags::NONE)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
