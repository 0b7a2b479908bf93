//! Proceso de alta de pedidos usado por el binario demo y los tests de
//! escenario.
//!
//! Pasos: cliente → pedido → confirmación → encuesta → despedida. Cliente y
//! pedido se guardan cada uno en su propio scope de transacción.

use log::{debug, warn};
use procflow_adapters::steps::confirm::CONFIRMED;
use procflow_adapters::steps::questionnaire::ANSWER;
use procflow_adapters::{ConfirmStep, EntityForm, FormField, MessageLevel, MessageStep, QuestionnaireStep,
                        StoreEntityStep};
use procflow_core::{EngineContext, Interaction, ParamKey, ProcessDefinition, ProcessEngine, ProcessState};
use uuid::Uuid;

use crate::errors::AppError;

pub const ORDER_ENTRY: &str = "order_entry";

pub const CUSTOMER_NAME: ParamKey<String> = ParamKey::new("customer_name");
pub const CUSTOMER_EMAIL: ParamKey<String> = ParamKey::new("customer_email");
pub const CUSTOMER_ID: ParamKey<Uuid> = ParamKey::new("customer_id");
pub const PRODUCT: ParamKey<String> = ParamKey::new("product");
pub const QUANTITY: ParamKey<u32> = ParamKey::new("quantity");
pub const ORDER_ID: ParamKey<Uuid> = ParamKey::new("order_id");

pub const PRODUCTS: [&str; 3] = ["widget", "gadget", "gizmo"];

pub fn order_entry() -> ProcessDefinition {
    let customer = EntityForm::new("customer_form", "customer").field(FormField::new(&CUSTOMER_NAME, "Name").required()
                                                                                                            .max_length(60))
                                                               .field(FormField::new(&CUSTOMER_EMAIL, "E-mail").max_length(80));
    let order = EntityForm::new("order_form", "order").field(FormField::new(&PRODUCT, "Product").required()
                                                                                                .allowed(PRODUCTS))
                                                      .field(FormField::new(&QUANTITY, "Quantity").required());
    ProcessDefinition::new(ORDER_ENTRY).key(&CUSTOMER_ID)
                                       .key(&ORDER_ID)
                                       .step(StoreEntityStep::new("customer", customer, CUSTOMER_ID.clone()).next("order"))
                                       .step(StoreEntityStep::new("order", order, ORDER_ID.clone()).next("confirm"))
                                       .step(ConfirmStep::new("confirm", "Place this order?").next("feedback"))
                                       .step(QuestionnaireStep::new("feedback",
                                                                    ["Was the form easy to fill in?",
                                                                     "How likely are you to order again (1-5)?"])
                                             .next("thanks"))
                                       .step(MessageStep::new("thanks", "Your order has been placed").level(MessageLevel::Info))
}

/// Engine con la definición de alta de pedidos registrada.
pub fn engine(context: EngineContext) -> Result<ProcessEngine, AppError> {
    Ok(ProcessEngine::new().context(context).definition(ORDER_ENTRY, order_entry).build()?)
}

/// Interacciones del guion, en orden. La primera omite el nombre del
/// cliente a propósito para mostrar un fallo de validación recuperable.
pub fn script() -> Vec<Interaction> {
    vec![Interaction::proceed(),
         Interaction::proceed().with_value(&CUSTOMER_NAME, "Ada Lovelace")
                               .with_value(&CUSTOMER_EMAIL, "ada@example.org"),
         Interaction::proceed().with_value(&PRODUCT, "widget").with_value(&QUANTITY, 3),
         Interaction::action(&CONFIRMED).with_value(&CONFIRMED, true),
         Interaction::proceed().with_value(&ANSWER, "yes"),
         Interaction::proceed().with_value(&ANSWER, "5"),
         Interaction::proceed()]
}

#[derive(Debug, Clone, Default)]
pub struct DemoRun {
    pub process_id: Option<Uuid>,
    /// Estado tras cada llamada que tuvo éxito.
    pub states: Vec<ProcessState>,
    /// Fallos de validación recuperados: step → motivos.
    pub recovered: Vec<(String, Vec<String>)>,
    /// Variantes compactas de los eventos de auditoría.
    pub events: Vec<&'static str>,
    pub fingerprint: Option<String>,
}

/// Ejecuta el guion completo sobre un proceso nuevo. Los fallos de validación
/// se registran y el guion sigue; cualquier otro error corta la ejecución.
pub fn run_script(engine: &mut ProcessEngine, script: Vec<Interaction>) -> Result<DemoRun, AppError> {
    let handle = engine.create_process(ORDER_ENTRY)?;
    let mut run = DemoRun { process_id: Some(handle.id()),
                            ..DemoRun::default() };
    run.states.push(engine.execute(&handle)?);
    for interaction in script {
        match engine.resume(&handle, interaction) {
            Ok(state) => {
                debug!("demo:state process_id={} step={:?} status={:?}", handle.id(), state.step, state.status);
                run.states.push(state);
            }
            Err(e) if e.is_recoverable() => {
                warn!("demo:validation process_id={} error={}", handle.id(), e);
                let step = e.step().unwrap_or_default().to_string();
                let state = engine.state(&handle)?;
                run.recovered.push((step, state.validation_errors.into_values().collect()));
            }
            Err(e) => return Err(e.into()),
        }
    }
    run.events = engine.event_variants(&handle);
    match run.states.last() {
        Some(state) if state.is_finished() => {
            run.fingerprint = engine.fingerprint(&handle);
            Ok(run)
        }
        Some(state) => Err(AppError::Script(format!("script ended at step {:?} with status {:?}", state.step, state.status))),
        None => Err(AppError::Script("no state recorded".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_lists_steps_in_order() {
        let def = order_entry();
        assert_eq!(def.step_names(), vec!["customer", "order", "confirm", "feedback", "thanks"]);
        assert_eq!(def.keys().len(), 2);
    }

    #[test]
    fn engine_registers_the_order_entry_definition() {
        let engine = engine(EngineContext::default()).unwrap();
        assert!(engine.registry().contains(ORDER_ENTRY));
    }
}
