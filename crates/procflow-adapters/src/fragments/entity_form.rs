//! EntityForm: fragment que edita los atributos de una entidad.
//!
//! - Cada `FormField` es un parámetro de entrada; el nombre del atributo es el
//!   id de su clave.
//! - Los campos obligatorios registran una validación final; las cotas de
//!   longitud y los valores permitidos viajan como anotaciones, de modo que la
//!   UI pueda mostrarlos y el engine los valide en cada interacción.
//! - Los textos se normalizan (trim) al recibir la interacción.

use log::debug;
use procflow_core::param::{ALLOWED_VALUES, MAX_LENGTH};
use procflow_core::{Entity, Fragment, FragmentContext, ParamId, ParamKey, ParameterStore, StepError, ValidationPhase};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FormField {
    key: ParamKey<Value>,
    label: String,
    required: bool,
    max_length: Option<usize>,
    allowed: Option<Vec<Value>>,
}

impl FormField {
    pub fn new<T>(key: &ParamKey<T>, label: impl Into<String>) -> Self {
        Self { key: ParamKey::dynamic(key.id().as_str().to_string(), key.flags()),
               label: label.into(),
               required: false,
               max_length: None,
               allowed: None }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn allowed(mut self, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn id(&self) -> &ParamId {
        self.key.id()
    }
}

#[derive(Debug, Clone)]
pub struct EntityForm {
    name: String,
    kind: String,
    fields: Vec<FormField>,
}

impl EntityForm {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: name.into(),
               kind: kind.into(),
               fields: Vec::new() }
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Construye la entidad con los valores presentes en el store. Los campos
    /// sin valor no se incluyen.
    pub fn to_entity(&self, store: &ParameterStore) -> Entity {
        self.fields.iter().fold(Entity::new(&self.kind), |entity, f| match store.value(f.id()) {
                              Some(value) => entity.with(f.id().as_str(), value.clone()),
                              None => entity,
                          })
    }

    /// Vuelca los atributos de `entity` en los parámetros del formulario.
    pub fn fill(&self, ctx: &mut FragmentContext<'_>, entity: &Entity) -> Result<(), StepError> {
        for f in &self.fields {
            if let Some(value) = entity.attribute(f.id().as_str()) {
                ctx.set(&f.key, value.clone())?;
            }
        }
        Ok(())
    }
}

impl Fragment for EntityForm {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        for f in &self.fields {
            ctx.add_input(&f.key);
            ctx.set_property(&f.key, "label", f.label.as_str());
            if let Some(max) = f.max_length {
                ctx.annotate(&f.key, &MAX_LENGTH, max)?;
            }
            if let Some(allowed) = &f.allowed {
                ctx.annotate(&f.key, &ALLOWED_VALUES, allowed.clone())?;
            }
            if f.required {
                let id = f.id().clone();
                let label = f.label.clone();
                ctx.validate(&f.key, ValidationPhase::Final, move |store| match store.value(&id) {
                       None | Some(Value::Null) => Some(format!("{label} is required")),
                       Some(Value::String(s)) if s.trim().is_empty() => Some(format!("{label} is required")),
                       Some(_) => None,
                   });
            }
        }
        Ok(())
    }

    fn handle_interaction(&mut self, key: &ParamId, ctx: &mut FragmentContext<'_>) -> Result<(), StepError> {
        let Some(field) = self.fields.iter().find(|f| f.id() == key) else {
            return Ok(());
        };
        if let Some(Value::String(text)) = ctx.get(&field.key)? {
            let trimmed = text.trim();
            if trimmed.len() != text.len() {
                debug!("form:normalize form={} field={}", self.name, key);
                ctx.set(&field.key, Value::String(trimmed.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procflow_core::KeyFlags;
    use serde_json::json;

    const CUSTOMER: ParamKey<String> = ParamKey::new("customer");
    const QUANTITY: ParamKey<u32> = ParamKey::new("quantity");

    #[test]
    fn entity_contains_only_present_fields() {
        let form = EntityForm::new("order_form", "order").field(FormField::new(&CUSTOMER, "Customer").required())
                                                         .field(FormField::new(&QUANTITY, "Quantity"));
        let mut store = ParameterStore::new();
        store.set(&CUSTOMER, "ada".to_string()).unwrap();
        let entity = form.to_entity(&store);
        assert_eq!(entity.kind, "order");
        assert_eq!(entity.attribute("customer"), Some(&json!("ada")));
        assert!(entity.attribute("quantity").is_none());
    }

    #[test]
    fn fields_keep_the_original_key_identity() {
        const NOTE: ParamKey<String> = ParamKey::new("note").transient();
        let field = FormField::new(&NOTE, "Note").max_length(10).allowed(["a", "b"]);
        assert_eq!(field.id(), NOTE.id());
        assert_eq!(field.key.flags(), KeyFlags { transient: true, ..KeyFlags::NONE });
        assert_eq!(field.allowed, Some(vec![json!("a"), json!("b")]));
    }
}
