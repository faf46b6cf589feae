//! Domain layer - Pure business logic.

pub mod captions;
pub mod error;
pub mod frame;
pub mod jobs;
pub mod transcript;
