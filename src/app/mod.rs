//! Download run orchestration for the CLI.

pub(crate) mod host;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
