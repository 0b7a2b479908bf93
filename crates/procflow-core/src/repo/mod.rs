pub mod types;
pub use types::{InMemoryProcessRepository, ProcessRepository};
