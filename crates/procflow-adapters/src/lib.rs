//! procflow-adapters: steps y fragments reutilizables sobre `procflow-core`.
//!
//! Este crate provee:
//! - `EntityForm`: fragment que edita los atributos de una entidad.
//! - Steps concretos: `MessageStep`, `ConfirmStep`, `StoreEntityStep`
//!   (transaccional) y `QuestionnaireStep` (subproceso propio con vuelta a la
//!   pregunta anterior).
//! - `RecordingCoordinator`: coordinador de transacción/historial que anota
//!   cada llamada, útil en tests y demos.
//!
//! Nota: el core no conoce ninguno de estos tipos; sólo ve `Step` y
//! `Fragment`.

pub mod coordinators;
pub mod fragments;
pub mod steps;

pub use coordinators::RecordingCoordinator;
pub use fragments::{EntityForm, FormField};
pub use steps::{ConfirmStep, MessageLevel, MessageStep, QuestionnaireStep, StoreEntityStep};
