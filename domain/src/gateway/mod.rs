//! Clients for the external services the integration talks to.

pub mod beehive;
