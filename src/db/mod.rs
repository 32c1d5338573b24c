//! Storage module for pingwatch.
//!
//! Two independent JSON stores: the target registry and the event log.

mod event_log;
mod file;
mod models;
mod registry;

pub use event_log::*;
pub use file::*;
pub use models::*;
pub use registry::*;
