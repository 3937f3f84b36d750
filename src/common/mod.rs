//! Shared types and collaborator traits used by every game

pub mod traits;
pub mod types;
