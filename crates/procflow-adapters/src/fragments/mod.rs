pub mod entity_form;

pub use entity_form::{EntityForm, FormField};
