//! Deployment scripts and inspection tasks for the IsItMoonYet contract.

pub mod chain;
pub mod config;
pub mod deploy;
pub mod error;
pub mod explorer;
pub mod locator;
pub mod tasks;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::HarnessError;
