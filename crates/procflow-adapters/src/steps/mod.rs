//! Steps concretos listos para componer definiciones de proceso.

pub mod confirm;
pub mod message;
pub mod questionnaire;
pub mod store_entity;

pub use confirm::ConfirmStep;
pub use message::{MessageLevel, MessageStep};
pub use questionnaire::QuestionnaireStep;
pub use store_entity::StoreEntityStep;
