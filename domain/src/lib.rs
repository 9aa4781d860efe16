//! Neato robot discovery for the hub: robots, the Beehive gateway,
//! reconciliation with the host's devices, and the account lifecycle.
//!
//! The host drives [`integration::NeatoIntegration`]; everything it needs
//! from the host is expressed as traits (`CredentialStorage`, `Storage`,
//! [`device_registry::DeviceRegistry`]) and events.

pub use events::Id;

pub mod account;
pub mod device_registry;
pub mod error;
pub mod integration;
pub mod reconcile;
pub mod robot;
pub mod robot_directory;

pub mod gateway;

#[cfg(test)]
mod test_support;
