use std::process::ExitCode;
use std::sync::Arc;

use procflow::demo;
use procflow::errors::AppError;
use procflow_adapters::RecordingCoordinator;
use procflow_core::config::init_dotenv;
use procflow_core::{EngineConfig, EngineContext, InMemoryEntityStore, ProcessStatus};

fn run() -> Result<(), AppError> {
    // Cargar .env antes de leer PROCFLOW_*
    init_dotenv();
    let config = EngineConfig::from_env();
    println!("Configuración: {:?}", config);

    let coordinator = Arc::new(RecordingCoordinator::new());
    let entities = Arc::new(InMemoryEntityStore::new());
    let context = EngineContext::new(config).with_transactions(coordinator.clone())
                                            .with_history(coordinator.clone())
                                            .with_entities(entities.clone());
    let mut engine = demo::engine(context)?;
    let run = demo::run_script(&mut engine, demo::script())?;
    for state in &run.states {
        let params: Vec<String> = state.params
                                       .iter()
                                       .map(|p| match &p.value {
                                           Some(v) => format!("{}={}", p.id, v),
                                           None => p.id.to_string(),
                                       })
                                       .collect();
        match state.status {
            ProcessStatus::Finished => println!("[finished]"),
            _ => println!("[{}] {}", state.step.as_deref().unwrap_or("-"), params.join(", ")),
        }
    }
    for (step, reasons) in &run.recovered {
        println!("Validación recuperada en '{}': {:?}", step, reasons);
    }
    println!("Llamadas al coordinador: {:?}", coordinator.calls());
    println!("Entidades guardadas: {}", entities.len());
    println!("Eventos: {}", run.events.join(""));
    println!("Fingerprint: {}", run.fingerprint.unwrap_or_default());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
