//! Tests de integración de los steps concretos sobre el engine en memoria.

use std::sync::Arc;

use procflow_adapters::steps::confirm::CONFIRMED;
use procflow_adapters::steps::questionnaire::{ANSWER, QUESTION};
use procflow_adapters::steps::store_entity::ENTITY_FORM;
use procflow_adapters::{ConfirmStep, EntityForm, FormField, MessageLevel, MessageStep, QuestionnaireStep,
                        RecordingCoordinator, StoreEntityStep};
use procflow_core::{Criteria, EngineContext, Entity, EntityStore, InMemoryEntityStore, Interaction, ParamKey,
                    ProcessDefinition, ProcessEngine, ProcessError, ProcessStatus};
use serde_json::json;
use uuid::Uuid;

const NAME: ParamKey<String> = ParamKey::new("name");
const TIER: ParamKey<String> = ParamKey::new("tier");
const CUSTOMER_ID: ParamKey<Uuid> = ParamKey::new("customer_id");

fn customer_form() -> EntityForm {
    EntityForm::new("customer_form", "customer").field(FormField::new(&NAME, "Name").required().max_length(20))
                                                .field(FormField::new(&TIER, "Tier").allowed(["gold", "silver"]))
}

fn onboarding(load: Option<Criteria>) -> ProcessDefinition {
    let store = StoreEntityStep::new("customer", customer_form(), CUSTOMER_ID.clone()).next("confirm");
    let store = match load {
        Some(criteria) => store.load(criteria),
        None => store,
    };
    ProcessDefinition::new("onboarding").key(&CUSTOMER_ID)
                                        .step(store)
                                        .step(ConfirmStep::new("confirm", "Create this customer?").next("survey"))
                                        .step(QuestionnaireStep::new("survey", ["Favourite colour?", "Preferred size?"]).next("bye"))
                                        .step(MessageStep::new("bye", "Welcome aboard").level(MessageLevel::Info))
}

struct Fixture {
    engine: ProcessEngine,
    entities: Arc<InMemoryEntityStore>,
    coordinator: Arc<RecordingCoordinator>,
}

fn fixture(coordinator: RecordingCoordinator, load: Option<Criteria>) -> Fixture {
    let entities = Arc::new(InMemoryEntityStore::new());
    let coordinator = Arc::new(coordinator);
    let context = EngineContext::default().with_entities(entities.clone())
                                          .with_transactions(coordinator.clone())
                                          .with_history(coordinator.clone());
    let engine = ProcessEngine::new().context(context)
                                     .definition("onboarding", move || onboarding(load.clone()))
                                     .build()
                                     .expect("engine");
    Fixture { engine, entities, coordinator }
}

#[test]
fn onboarding_runs_from_form_to_final_message() {
    let Fixture { mut engine, entities, coordinator } = fixture(RecordingCoordinator::new(), None);
    let h = engine.create_process("onboarding").unwrap();

    let state = engine.execute(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("customer"));
    let ids: Vec<&str> = state.params.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![ENTITY_FORM.id().as_str(), "name", "tier"]);
    assert_eq!(state.param(NAME.id()).unwrap().properties.get("label"), Some(&json!("Name")));

    let err = engine.resume(&h, Interaction::proceed()).unwrap_err();
    assert!(matches!(err, ProcessError::ValidationFailure { ref errors, .. } if errors.get(NAME.id()).map(String::as_str) == Some("Name is required")));

    let state = engine.resume(&h, Interaction::update(&NAME).with_value(&NAME, "  Ada  ")).unwrap();
    assert_eq!(state.param(NAME.id()).unwrap().value, Some(json!("Ada")));

    let err = engine.resume(&h, Interaction::update(&TIER).with_value(&TIER, "bronze")).unwrap_err();
    assert!(matches!(err, ProcessError::ValidationFailure { ref errors, .. } if errors.contains_key(TIER.id())));
    engine.resume(&h, Interaction::update(&TIER).with_value(&TIER, "gold")).unwrap();

    let state = engine.resume(&h, Interaction::proceed()).unwrap();
    assert_eq!(state.step.as_deref(), Some("confirm"));
    assert_eq!(coordinator.calls(), vec!["begin:customer", "commit:customer"]);
    let stored: Vec<Entity> = entities.query(&Criteria::kind("customer").filter("name", "Ada")).collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].attribute("tier"), Some(&json!("gold")));

    let state = engine.resume(&h, Interaction::action(&CONFIRMED).with_value(&CONFIRMED, true)).unwrap();
    assert_eq!(state.step.as_deref(), Some("survey"));
    assert_eq!(state.param(QUESTION.id()).unwrap().value, Some(json!("Favourite colour?")));

    let state = engine.resume(&h, Interaction::proceed().with_value(&ANSWER, "blue")).unwrap();
    assert_eq!(state.step.as_deref(), Some("survey"));
    assert_eq!(state.param(QUESTION.id()).unwrap().value, Some(json!("Preferred size?")));
    assert!(state.can_rollback);

    let state = engine.rollback(&h).unwrap();
    assert_eq!(state.param(QUESTION.id()).unwrap().value, Some(json!("Favourite colour?")));
    assert_eq!(state.param(ANSWER.id()).unwrap().value, Some(json!("blue")));

    engine.resume(&h, Interaction::proceed().with_value(&ANSWER, "green")).unwrap();
    let state = engine.resume(&h, Interaction::proceed().with_value(&ANSWER, "large")).unwrap();
    assert_eq!(state.step.as_deref(), Some("bye"));
    assert_eq!(state.param(&"message".into()).unwrap().properties.get("style"), Some(&json!("info")));

    let state = engine.resume(&h, Interaction::proceed()).unwrap();
    assert_eq!(state.status, ProcessStatus::Finished);
    assert!(engine.fingerprint(&h).is_some());
    assert!(engine.repository().is_empty());
}

#[test]
fn confirmation_must_be_given() {
    let Fixture { mut engine, .. } = fixture(RecordingCoordinator::new(), None);
    let h = engine.create_process("onboarding").unwrap();
    engine.execute(&h).unwrap();
    engine.resume(&h, Interaction::proceed().with_value(&NAME, "Ada")).unwrap();

    let err = engine.resume(&h, Interaction::action(&CONFIRMED).with_value(&CONFIRMED, false)).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(engine.state(&h).unwrap().step.as_deref(), Some("confirm"));
}

#[test]
fn failed_commit_rolls_back_and_keeps_the_step() {
    let Fixture { mut engine, coordinator, .. } = fixture(RecordingCoordinator::failing_commit(), None);
    let h = engine.create_process("onboarding").unwrap();
    engine.execute(&h).unwrap();

    let err = engine.resume(&h, Interaction::proceed().with_value(&NAME, "Ada")).unwrap_err();
    assert!(matches!(err, ProcessError::Coordinator { ref step, .. } if step == "customer"));
    assert_eq!(coordinator.calls(), vec!["begin:customer", "commit:customer", "rollback:customer"]);

    let state = engine.state(&h).unwrap();
    assert_eq!(state.status, ProcessStatus::Failed);
    assert_eq!(state.step.as_deref(), Some("customer"));
}

#[test]
fn existing_entity_is_loaded_and_updated_in_place() {
    let criteria = Criteria::kind("customer").filter("name", "Grace");
    let Fixture { mut engine, entities, .. } = fixture(RecordingCoordinator::new(), Some(criteria));
    let existing = entities.store(&Entity::new("customer").with("name", "Grace").with("tier", "silver"))
                           .unwrap();
    let h = engine.create_process("onboarding").unwrap();

    let state = engine.execute(&h).unwrap();
    assert_eq!(state.param(TIER.id()).unwrap().value, Some(json!("silver")));

    engine.resume(&h, Interaction::proceed().with_value(&TIER, "gold")).unwrap();
    assert_eq!(entities.len(), 1);
    let stored: Vec<Entity> = entities.query(&Criteria::kind("customer")).collect();
    assert_eq!(stored[0].id, Some(existing));
    assert_eq!(stored[0].attribute("tier"), Some(&json!("gold")));
}

#[test]
fn rollback_from_confirmation_reopens_the_form() {
    let Fixture { mut engine, .. } = fixture(RecordingCoordinator::new(), None);
    let h = engine.create_process("onboarding").unwrap();
    engine.execute(&h).unwrap();
    let state = engine.resume(&h, Interaction::proceed().with_value(&NAME, "Ada")).unwrap();
    assert!(state.can_rollback);

    let state = engine.rollback(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("customer"));
    assert_eq!(state.param(NAME.id()).unwrap().value, Some(json!("Ada")));
    assert!(state.param(&"customer_id".into()).is_none());
    assert_eq!(engine.event_variants(&h).last(), Some(&"R"));
}
