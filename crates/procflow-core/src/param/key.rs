//! Claves tipadas de parámetros.
//!
//! Un `ParamKey<T>` es la única forma de direccionar un valor dentro del
//! `ParameterStore`. Se declara una vez (normalmente como `const`) y lleva:
//! - el identificador estable (`ParamId`),
//! - el tipo del valor (sólo a nivel de compilación),
//! - una función opcional de valor por defecto,
//! - modificadores estáticos (`KeyFlags`).

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Identificador no tipado de un parámetro. Se serializa como string plano.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamId(Cow<'static, str>);

impl ParamId {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ParamId {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// Valor de un parámetro cuyo contenido es a su vez una lista de claves
/// (p.ej. los parámetros de un fragment hijo).
pub type ParamList = Vec<ParamId>;

/// Modificadores estáticos de una clave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyFlags {
    /// El valor sólo puede asignarse una vez.
    pub final_value: bool,
    /// Excluido de snapshots; se recrea (con su default) al reanudar.
    pub transient: bool,
    /// El valor es un `ParamList`; asignarlo marca un cambio estructural.
    pub key_list: bool,
}

impl KeyFlags {
    pub const NONE: KeyFlags = KeyFlags { final_value: false, transient: false, key_list: false };
}

/// Descripción no tipada de una clave, usada por el `KeyRegistry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub id: ParamId,
    pub flags: KeyFlags,
    pub type_name: &'static str,
}

pub struct ParamKey<T> {
    id: ParamId,
    flags: KeyFlags,
    default: Option<fn() -> T>,
    _type: PhantomData<fn() -> T>,
}

impl<T> ParamKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { id: ParamId::from_static(name),
               flags: KeyFlags::NONE,
               default: None,
               _type: PhantomData }
    }

    /// Clave con nombre dinámico (claves temporales de fragments).
    pub fn dynamic(name: impl Into<String>, flags: KeyFlags) -> Self {
        Self { id: ParamId::new(name),
               flags,
               default: None,
               _type: PhantomData }
    }

    pub const fn with_default(mut self, default: fn() -> T) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn final_value(mut self) -> Self {
        self.flags.final_value = true;
        self
    }

    pub const fn transient(mut self) -> Self {
        self.flags.transient = true;
        self
    }

    pub fn id(&self) -> &ParamId {
        &self.id
    }

    pub fn flags(&self) -> KeyFlags {
        self.flags
    }

    pub fn default_value(&self) -> Option<T> {
        self.default.map(|f| f())
    }

    pub fn info(&self) -> KeyInfo {
        KeyInfo { id: self.id.clone(),
                  flags: self.flags,
                  type_name: std::any::type_name::<T>() }
    }
}

impl ParamKey<ParamList> {
    /// Clave cuyo valor es una lista de claves de parámetros.
    pub const fn key_list(name: &'static str) -> Self {
        Self { id: ParamId::from_static(name),
               flags: KeyFlags { final_value: false, transient: false, key_list: true },
               default: None,
               _type: PhantomData }
    }
}

impl<T> Clone for ParamKey<T> {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(),
               flags: self.flags,
               default: self.default,
               _type: PhantomData }
    }
}

impl<T> fmt::Debug for ParamKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamKey")
         .field("id", &self.id)
         .field("flags", &self.flags)
         .field("type", &std::any::type_name::<T>())
         .finish()
    }
}
