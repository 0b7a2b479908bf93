//! procflow
//!
//! Crate raíz del workspace:
//! - Expone `demo`, el proceso de alta de pedidos que usa el binario.
//! - Expone `errors` con el error de aplicación.
//!
//! El motor vive en `procflow-core` y los steps concretos en
//! `procflow-adapters`; ambos se re-exportan aquí.

pub mod demo;
pub mod errors;

pub use procflow_adapters;
pub use procflow_core;
