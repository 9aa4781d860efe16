//! OAuth provider implementations.

pub mod neato;
