//! HTTP handlers of the local storage emulator.

pub mod app_error;
pub mod health_handlers;
pub mod object_handlers;
