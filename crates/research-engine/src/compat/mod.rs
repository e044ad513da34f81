//! Adapters from external frameworks to the engine's ports

mod rig_language_model;

pub use rig_language_model::RigLanguageModel;
