//! Queue driven email notification dispatcher.
//!
//! Reads commands from SQS, renders the referenced template from Postgres
//! and delivers it over SMTP. See `courier-dispatch` for the processing
//! pipeline itself; this crate wires it to its environment.

pub mod container;
pub mod controller;
pub mod event;
pub mod secrets;
pub mod settings;

pub use container::{Container, ContainerError};
pub use controller::Controller;
pub use settings::{Settings, SettingsError};
