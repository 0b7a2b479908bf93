//! Anotaciones: metadatos tipados adjuntos a la relación de un parámetro.
//!
//! Una anotación vive tanto como el valor del parámetro al que se adjunta pero
//! es independiente de él. Las anotaciones integradas alimentan la validación
//! continua de los parámetros de entrada; las funciones de validación (no
//! serializables) se registran por fragment.

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

pub struct AnnotationKey<A> {
    name: &'static str,
    _type: PhantomData<fn() -> A>,
}

impl<A> AnnotationKey<A> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _type: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<A> Clone for AnnotationKey<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for AnnotationKey<A> {}

impl<A> fmt::Debug for AnnotationKey<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnotationKey({})", self.name)
    }
}

/// Conjunto cerrado de valores permitidos.
pub const ALLOWED_VALUES: AnnotationKey<Vec<Value>> = AnnotationKey::new("allowed_values");
/// Cota inferior numérica (inclusive).
pub const MIN_VALUE: AnnotationKey<f64> = AnnotationKey::new("min_value");
/// Cota superior numérica (inclusive).
pub const MAX_VALUE: AnnotationKey<f64> = AnnotationKey::new("max_value");
/// Longitud máxima en caracteres de un valor string.
pub const MAX_LENGTH: AnnotationKey<usize> = AnnotationKey::new("max_length");

/// Evalúa las anotaciones integradas sobre `value`. Devuelve el motivo del
/// primer fallo encontrado.
pub(crate) fn check_builtin(value: &Value, annotations: &std::collections::BTreeMap<String, Value>) -> Option<String> {
    if let Some(Value::Array(allowed)) = annotations.get(ALLOWED_VALUES.name()) {
        if !allowed.contains(value) {
            return Some(format!("value {value} is not one of the allowed values"));
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = annotations.get(MIN_VALUE.name()).and_then(Value::as_f64) {
            if n < min {
                return Some(format!("value {n} is below minimum {min}"));
            }
        }
        if let Some(max) = annotations.get(MAX_VALUE.name()).and_then(Value::as_f64) {
            if n > max {
                return Some(format!("value {n} is above maximum {max}"));
            }
        }
    }
    if let (Some(s), Some(max)) = (value.as_str(), annotations.get(MAX_LENGTH.name()).and_then(Value::as_u64)) {
        if s.chars().count() as u64 > max {
            return Some(format!("text longer than {max} characters"));
        }
    }
    None
}
