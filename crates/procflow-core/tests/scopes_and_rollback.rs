mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{call_log, engine, engine_with, entries, CallLog, RecordingCoordinator, TestStep};
use procflow_core::{EngineContext, HistoryMode, Interaction, ParamKey, Process, ProcessDefinition, ProcessError,
                    ProcessStatus, StepConfig, StepError, StepPhase, TransactionMode};
use serde_json::json;
use uuid::Uuid;

const NAME: ParamKey<String> = ParamKey::new("name");
const COUNT: ParamKey<u32> = ParamKey::new("count");
const TOTAL: ParamKey<u32> = ParamKey::new("total");
const PAGE: ParamKey<u32> = ParamKey::new("page");

fn recording_context() -> (EngineContext, Arc<RecordingCoordinator>) {
    let coordinator = Arc::new(RecordingCoordinator::new());
    let context = EngineContext::default().with_transactions(coordinator.clone())
                                          .with_history(coordinator.clone());
    (context, coordinator)
}

fn input_step(name: &str, config: StepConfig, log: &CallLog) -> TestStep {
    TestStep::new(name, config.interactive(), log).on_init(|ctx| {
                                                      ctx.add_input(&NAME);
                                                      Ok(())
                                                  })
}

#[test]
fn failing_step_inside_transaction_rolls_back_once() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a",
                                                        StepConfig::new().next("b").transaction(TransactionMode::Begin),
                                                        &log))
                                    .step(TestStep::new("b", StepConfig::new().next("c"), &log)
                                              .on_execute(|_| Err(StepError::failed("boom"))))
                                    .step(TestStep::new("c", StepConfig::new().transaction(TransactionMode::End), &log))
    });
    let h = engine.create_process("tx").unwrap();

    let err = engine.execute(&h).unwrap_err();
    assert!(matches!(err, ProcessError::StepExecution { ref step, .. } if step == "b"));
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:b"]);

    let state = engine.state(&h).unwrap();
    assert_eq!(state.status, ProcessStatus::Failed);
    assert_eq!(state.step.as_deref(), Some("b"));
}

#[test]
fn failure_inside_an_outer_scope_requires_rollback_before_retry() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let inner = log.clone();
    let runs = Arc::new(AtomicUsize::new(0));
    let mut engine = engine_with(context, "tx", move || {
        let runs = runs.clone();
        let opener = StepConfig::new().next("b").rollback().transaction(TransactionMode::Begin);
        ProcessDefinition::new("tx").step(input_step("a", opener, &inner))
                                    .step(TestStep::new("b", StepConfig::new().next("c"), &inner).on_execute(move |_| {
                                                                                                      if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                                                                                                          Err(StepError::failed("boom"))
                                                                                                      } else {
                                                                                                          Ok(())
                                                                                                      }
                                                                                                  }))
                                    .step(TestStep::new("c", StepConfig::new().transaction(TransactionMode::End), &inner))
    });
    let h = engine.create_process("tx").unwrap();
    engine.execute(&h).unwrap();

    let err = engine.resume(&h, Interaction::proceed()).unwrap_err();
    assert!(matches!(err, ProcessError::StepExecution { ref step, .. } if step == "b"));
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:b"]);

    let err = engine.execute(&h).unwrap_err();
    assert!(matches!(err, ProcessError::InvalidState(ref msg) if msg.contains("roll back")));
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:b"]);
    let state = engine.state(&h).unwrap();
    assert_eq!(state.status, ProcessStatus::Failed);
    assert_eq!(state.step.as_deref(), Some("b"));
    assert!(state.can_rollback);

    let state = engine.rollback(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("a"));
    assert_eq!(state.status, ProcessStatus::Suspended);
    assert!(entries(&log).contains(&"rollback:a".to_string()));

    assert!(engine.resume(&h, Interaction::proceed()).unwrap().is_finished());
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:b", "begin:a", "commit:c"]);
}

#[test]
fn blocked_retry_survives_eviction() {
    let (context, _) = recording_context();
    let log = call_log();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a",
                                                        StepConfig::new().next("b").transaction(TransactionMode::Begin),
                                                        &log))
                                    .step(TestStep::new("b", StepConfig::new().next("c"), &log)
                                              .on_execute(|_| Err(StepError::failed("boom"))))
                                    .step(TestStep::new("c", StepConfig::new().transaction(TransactionMode::End), &log))
    });
    let h = engine.create_process("tx").unwrap();
    engine.execute(&h).unwrap_err();
    engine.evict(&h).unwrap();

    assert!(matches!(engine.execute(&h), Err(ProcessError::InvalidState(_))));
    assert_eq!(engine.rollback(&h).unwrap_err(), ProcessError::RollbackUnsupported { step: "a".into() });
    assert_eq!(engine.state(&h).unwrap().status, ProcessStatus::Failed);
}

#[test]
fn balanced_scopes_commit_in_order() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a",
                                                        StepConfig::new().next("b").transaction(TransactionMode::Begin),
                                                        &log))
                                    .step(TestStep::new("b", StepConfig::new().next("c").history(HistoryMode::Wrap), &log))
                                    .step(TestStep::new("c", StepConfig::new().transaction(TransactionMode::End), &log))
    });
    let h = engine.create_process("tx").unwrap();
    assert!(engine.execute(&h).unwrap().is_finished());
    assert_eq!(coordinator.calls(),
               vec!["begin:a", "begin_group:b", "begin:b", "commit:b", "commit_group:b", "commit:c"]);
}

#[test]
fn closing_an_unopened_scope_is_a_nesting_error() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a", StepConfig::new().transaction(TransactionMode::End), &log))
    });
    let h = engine.create_process("tx").unwrap();
    let err = engine.execute(&h).unwrap_err();
    assert!(matches!(err, ProcessError::TransactionNesting { scope: "transaction", depth: 0, .. }));
    assert!(coordinator.calls().is_empty());
    assert_eq!(engine.state(&h).unwrap().status, ProcessStatus::Failed);
}

#[test]
fn finishing_with_an_open_scope_is_a_nesting_error() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a", StepConfig::new().transaction(TransactionMode::Begin), &log))
    });
    let h = engine.create_process("tx").unwrap();
    let err = engine.execute(&h).unwrap_err();
    assert!(matches!(err, ProcessError::TransactionNesting { depth: 1, .. }));
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:a"]);
}

#[test]
fn cancel_aborts_current_step_and_unwinds_scopes() {
    let (context, coordinator) = recording_context();
    let log = call_log();
    let inner = log.clone();
    let mut engine = engine_with(context, "tx", move || {
        ProcessDefinition::new("tx").step(TestStep::new("a",
                                                        StepConfig::new().next("b").transaction(TransactionMode::Begin),
                                                        &inner))
                                    .step(input_step("b", StepConfig::new().transaction(TransactionMode::End), &inner))
    });
    let h = engine.create_process("tx").unwrap();
    let state = engine.execute(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("b"));

    let state = engine.cancel(&h).unwrap();
    assert_eq!(state.status, ProcessStatus::Cancelled);
    assert!(entries(&log).contains(&"abort:b".to_string()));
    assert_eq!(coordinator.calls(), vec!["begin:a", "rollback:b"]);
    assert!(engine.repository().is_empty());

    assert!(!engine.is_loaded(&h));
    let err = engine.resume(&h, Interaction::proceed()).unwrap_err();
    assert_eq!(err, ProcessError::ProcessNotFound(h.id()));
    assert_eq!(engine.event_variants(&h).last(), Some(&"K"));
}

fn rollback_definition(log: &CallLog, can_rollback: bool) -> ProcessDefinition {
    let first = StepConfig::new().next("s2");
    let first = if can_rollback { first.rollback() } else { first };
    ProcessDefinition::new("wizard").step(input_step("s1", first, log).on_prepare(|ctx| ctx.set(&COUNT, 1))
                                                                        .on_execute(|ctx| {
                                                                            let count = ctx.require(&COUNT)?;
                                                                            ctx.set(&COUNT, count + 1)?;
                                                                            ctx.set(&TOTAL, 100)
                                                                        }))
                                    .step(input_step("s2", StepConfig::new(), log).on_prepare(|ctx| {
                                                                                     ctx.set(&NAME, "second".to_string())
                                                                                 }))
}

#[test]
fn rollback_restores_the_store_before_execute() {
    let log = call_log();
    let context = EngineContext::default();
    let mut process = Process::new(Uuid::new_v4(), rollback_definition(&log, true)).unwrap();

    process.execute(&context).unwrap();
    assert_eq!(process.current_step(), Some("s1"));
    let prepared = process.store().state().clone();

    process.resume(Interaction::proceed(), &context).unwrap();
    assert_eq!(process.current_step(), Some("s2"));
    assert_eq!(process.store().get(&TOTAL).unwrap(), Some(100));
    assert!(process.state().can_rollback);

    process.rollback(&context).unwrap();
    assert_eq!(process.store().state(), &prepared);
    assert_eq!(process.current_step(), Some("s1"));
    assert_eq!(process.current_phase(), Some(StepPhase::AwaitingInteraction));
    assert_eq!(process.status(), ProcessStatus::Suspended);
    assert!(process.history().is_empty());

    let log = entries(&log);
    assert!(log.contains(&"rollback:s1".to_string()));
    assert_eq!(log.iter().filter(|e| *e == "init:s1").count(), 2);
    assert!(log.contains(&"abort:s2".to_string()));

    process.resume(Interaction::proceed(), &context).unwrap();
    assert_eq!(process.current_step(), Some("s2"));
    assert_eq!(process.store().get(&COUNT).unwrap(), Some(2));
}

#[test]
fn rollback_into_a_step_without_support_is_refused() {
    let log = call_log();
    let mut engine = engine("wizard", move || rollback_definition(&log, false));
    let h = engine.create_process("wizard").unwrap();

    engine.execute(&h).unwrap();
    let err = engine.rollback(&h).unwrap_err();
    assert_eq!(err, ProcessError::RollbackUnsupported { step: "s1".into() });
    assert_eq!(engine.event_variants(&h).last(), Some(&"X"));

    let state = engine.resume(&h, Interaction::proceed()).unwrap();
    assert!(!state.can_rollback);
    let err = engine.rollback(&h).unwrap_err();
    assert_eq!(err, ProcessError::RollbackUnsupported { step: "s1".into() });
    assert_eq!(engine.event_variants(&h).iter().filter(|v| **v == "X").count(), 2);
    let state = engine.state(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("s2"));
    assert_eq!(state.status, ProcessStatus::Suspended);
}

#[test]
fn steps_without_rollback_cut_the_history() {
    let log = call_log();
    let context = EngineContext::default();
    let definition =
        ProcessDefinition::new("chain").step(TestStep::new("a", StepConfig::new().rollback().next("b"), &log)
                                                 .on_execute(|ctx| ctx.set(&COUNT, 1)))
                                       .step(TestStep::new("b", StepConfig::new().next("c"), &log)
                                                 .on_execute(|ctx| ctx.set(&TOTAL, 7)))
                                       .step(TestStep::new("c", StepConfig::new().rollback().next("d"), &log))
                                       .step(input_step("d", StepConfig::new(), &log));
    let mut process = Process::new(Uuid::new_v4(), definition).unwrap();
    process.execute(&context).unwrap();
    assert_eq!(process.current_step(), Some("d"));

    let steps: Vec<&str> = process.history().iter().map(|p| p.step.as_str()).collect();
    assert_eq!(steps, vec!["b", "c"]);
    assert!(process.history()[0].state.values.is_empty());
    assert_eq!(process.history()[1].state.values.get(TOTAL.id()), Some(&json!(7)));

    process.rollback(&context).unwrap();
    assert_eq!(process.current_step(), Some("c"));
    assert_eq!(process.current_phase(), Some(StepPhase::RolledBack));
    assert!(!process.state().can_rollback);
    assert_eq!(process.rollback(&context).unwrap_err(), ProcessError::RollbackUnsupported { step: "b".into() });
}

#[test]
fn self_looping_step_keeps_a_single_rollback_point() {
    let log = call_log();
    let context = EngineContext::default();
    let definition =
        ProcessDefinition::new("loop").step(TestStep::new("count", StepConfig::new().rollback().next("end"), &log)
                                                .on_execute(|ctx| {
                                                    let count = ctx.value_or(&COUNT, 0)? + 1;
                                                    ctx.set(&COUNT, count)?;
                                                    if count < 5 {
                                                        ctx.set_next_step("count");
                                                    }
                                                    Ok(())
                                                }))
                                      .step(input_step("end", StepConfig::new(), &log));
    let mut process = Process::new(Uuid::new_v4(), definition).unwrap();
    process.execute(&context).unwrap();
    assert_eq!(process.current_step(), Some("end"));
    assert_eq!(process.store().get(&COUNT).unwrap(), Some(5));
    assert_eq!(entries(&log).iter().filter(|e| *e == "execute:count").count(), 5);

    assert_eq!(process.history().len(), 1);
    assert_eq!(process.history()[0].state.values.get(COUNT.id()), Some(&json!(4)));
    assert_eq!(process.snapshot().unwrap().history.len(), 1);

    process.rollback(&context).unwrap();
    assert_eq!(process.current_step(), Some("count"));
    assert_eq!(process.store().get(&COUNT).unwrap(), Some(4));
    assert!(process.history().is_empty());
}

#[test]
fn rollback_to_previous_interaction_is_delegated_to_the_step() {
    let log = call_log();
    let inner = log.clone();
    let mut engine = engine("pager", move || {
        ProcessDefinition::new("pager").step(TestStep::new("sub", StepConfig::new().interactive(), &inner)
                                                 .on_init(|ctx| {
                                                     ctx.add_input(&PAGE);
                                                     Ok(())
                                                 })
                                                 .on_prepare(|ctx| ctx.set(&PAGE, 2))
                                                 .on_rollback_to_previous(|ctx| {
                                                     let page = ctx.require(&PAGE)?;
                                                     ctx.set(&PAGE, page - 1)
                                                 }))
    });
    let h = engine.create_process("pager").unwrap();
    let state = engine.execute(&h).unwrap();
    assert!(state.can_rollback);

    let state = engine.rollback(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("sub"));
    assert_eq!(state.status, ProcessStatus::Suspended);
    assert_eq!(state.param(PAGE.id()).unwrap().value, Some(json!(1)));
    assert!(entries(&log).contains(&"rollback_to_previous:sub".to_string()));
    assert_eq!(engine.event_variants(&h).last(), Some(&"R"));
}

fn progress_definition(log: &CallLog) -> ProcessDefinition {
    ProcessDefinition::new("progress").step(TestStep::new("work", StepConfig::new().next("done"), log).on_execute(|ctx| {
                                                     ctx.check_cancelled()?;
                                                     let count = ctx.value_or(&COUNT, 0)? + 1;
                                                     ctx.set(&COUNT, count)?;
                                                     if count < 3 {
                                                         ctx.auto_update(Duration::from_millis(50));
                                                     }
                                                     Ok(())
                                                 }))
                                      .step(TestStep::new("done", StepConfig::new().interactive(), log).on_init(|ctx| {
                                                                                                          ctx.add_interaction(&COUNT);
                                                                                                          Ok(())
                                                                                                      }))
}

#[test]
fn auto_update_returns_retry_hint_until_the_step_completes() {
    let log = call_log();
    let inner = log.clone();
    let mut engine = engine("progress", move || progress_definition(&inner));
    let h = engine.create_process("progress").unwrap();

    let state = engine.execute(&h).unwrap();
    assert_eq!(state.status, ProcessStatus::Suspended);
    assert_eq!(state.step.as_deref(), Some("work"));
    assert_eq!(state.retry_after_ms, Some(50));

    let state = engine.execute(&h).unwrap();
    assert_eq!(state.retry_after_ms, Some(50));

    let state = engine.execute(&h).unwrap();
    assert_eq!(state.step.as_deref(), Some("done"));
    assert_eq!(state.retry_after_ms, None);
    assert_eq!(state.param(COUNT.id()).unwrap().value, Some(json!(3)));
    assert_eq!(entries(&log).iter().filter(|e| *e == "init:work").count(), 1);
}

#[test]
fn auto_update_observes_cancellation_from_the_handle() {
    let log = call_log();
    let inner = log.clone();
    let mut engine = engine("progress", move || progress_definition(&inner));
    let h = engine.create_process("progress").unwrap();
    assert_eq!(engine.execute(&h).unwrap().retry_after_ms, Some(50));

    let remote = h.clone();
    std::thread::spawn(move || remote.request_cancel()).join().unwrap();

    let err = engine.execute(&h).unwrap_err();
    assert_eq!(err, ProcessError::Cancelled { step: "work".into() });
    assert!(!engine.is_loaded(&h));
    assert_eq!(engine.event_variants(&h).last(), Some(&"K"));
    assert!(entries(&log).contains(&"abort:work".to_string()));
}

#[test]
fn auto_update_hint_survives_eviction() {
    let log = call_log();
    let inner = log.clone();
    let mut engine = engine("progress", move || progress_definition(&inner));
    let h = engine.create_process("progress").unwrap();
    engine.execute(&h).unwrap();
    engine.evict(&h).unwrap();

    let state = engine.restore(&h).unwrap();
    assert_eq!(state.retry_after_ms, Some(50));
    let state = engine.execute(&h).unwrap();
    assert_eq!(state.param(COUNT.id()), None);
    assert_eq!(state.retry_after_ms, Some(50));
}
