//! Authorization of requested actions.
//!
//! [`PolicyEngine::authorize`] is the authoritative, per-key gate consulted
//! at execution time; [`PolicyEngine::evaluate`] is a coarser advisory path
//! for pre-flight filtering. Both are environment-mode-aware.

mod engine;
mod environment;

pub use engine::{PolicyDecision, PolicyEngine, PolicyEngineConfig, PolicyError, PolicyRule};
pub use environment::EnvironmentMode;
