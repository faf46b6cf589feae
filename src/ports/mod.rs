//! Ports - Trait definitions for external collaborators.

pub mod media;
pub mod transcriber;
