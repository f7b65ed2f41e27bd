//! buildgate - control-plane front end for a build-execution service
//!
//! Translates solve requests for the execution engine, bridges engine
//! progress onto caller status streams, and hijacks session calls into raw
//! duplex tunnels for the session manager.

pub mod api;
pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod reference;
pub mod session;
pub mod task_group;

pub use control::{Control, Controller, ControllerOpt};
pub use error::{ControlError, ControlResult};
