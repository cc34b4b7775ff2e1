//! Control plane access for Juju models.
//!
//! Everything that talks to the control plane goes through a
//! [`connection::ConnectionManager`], which owns the single reusable model handle.

pub mod actions;
pub mod cli;
pub mod client;
pub mod connection;
#[cfg(test)]
pub mod fake;
pub mod status;
pub mod waiter;

pub use client::{ActionHandle, ScpOptions, UpgradeOptions};
pub use connection::ConnectionManager;
pub use status::FleetStatus;
pub use waiter::Waiter;
