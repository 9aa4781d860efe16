//! Pre-defined provider configurations.

mod config;

pub use config::{
    neato_config, ProviderConfig, BEEHIVE_BASE_URL, NEATO_AUTHORIZE_URL, NEATO_REDIRECT_URI,
    NEATO_SCOPES,
};
