//! Builtin tools

pub mod script;
pub mod script_context;
