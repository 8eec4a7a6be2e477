//! Configuration module for Specdesk.
//!
//! Manages engine settings stored as a JSON file.

mod settings;

pub use settings::{EngineSettings, DEFAULT_TOOL_COMMAND, DEFAULT_TOOL_PACKAGE};
