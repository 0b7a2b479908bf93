//! Parámetros: claves tipadas, anotaciones y el `ParameterStore`.

pub mod annotation;
pub mod key;
pub mod registry;
pub mod store;

pub use annotation::{AnnotationKey, ALLOWED_VALUES, MAX_LENGTH, MAX_VALUE, MIN_VALUE};
pub use key::{KeyFlags, KeyInfo, ParamId, ParamKey, ParamList};
pub use registry::KeyRegistry;
pub use store::{ParameterChanges, ParameterState, ParameterStore, PropertyMap};
