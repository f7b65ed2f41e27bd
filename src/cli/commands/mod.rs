//! CLI command implementations

pub mod config;
pub mod reference;

pub use config::execute as config;
pub use reference::execute as reference;
