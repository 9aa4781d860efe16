use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::time::Duration;
use uuid::Uuid;

/// Beehive API base URL used when `BEEHIVE_URL` is not set.
pub const DEFAULT_BEEHIVE_URL: &str = "https://beehive.neatocloud.com";

/// Neato consent page used when `AUTHORIZE_URL` is not set.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://apps.neatorobotics.com/oauth2/authorize";

/// Redirect URI registered with the Neato OAuth client.
pub const DEFAULT_REDIRECT_URI: &str = "https://127.0.0.1:8888";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The OAuth client ID issued by Neato for this hub.
    #[arg(long, env)]
    neato_client_id: Option<String>,

    /// The OAuth client secret issued by Neato for this hub.
    #[arg(long, env, hide_env_values = true)]
    neato_client_secret: Option<String>,

    /// The base URL of the Beehive API (token endpoint and robot listing).
    /// Override in tests to point at a mock server.
    #[arg(long, env, default_value = DEFAULT_BEEHIVE_URL)]
    beehive_url: String,

    /// The Neato OAuth consent page.
    #[arg(long, env, default_value = DEFAULT_AUTHORIZE_URL)]
    authorize_url: String,

    /// The OAuth redirect URI the user is sent to after granting access.
    #[arg(long, env, default_value = DEFAULT_REDIRECT_URI)]
    redirect_uri: String,

    /// Timeout in seconds for requests to the Neato cloud. No timeout when unset.
    #[arg(long, env)]
    http_timeout_secs: Option<u64>,

    /// Host identifier of the account to pair or reload. A new one is generated when unset.
    #[arg(long, env)]
    pub account_id: Option<Uuid>,

    /// A refresh token from an earlier pairing. When set, the account is
    /// reloaded from it instead of going through pairing.
    #[arg(long, env, hide_env_values = true)]
    refresh_token: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn neato_client_id(&self) -> Option<&str> {
        non_blank(&self.neato_client_id)
    }

    pub fn neato_client_secret(&self) -> Option<&str> {
        non_blank(&self.neato_client_secret)
    }

    pub fn beehive_url(&self) -> &str {
        &self.beehive_url
    }

    pub fn set_beehive_url(mut self, beehive_url: String) -> Self {
        self.beehive_url = beehive_url;
        self
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_blank(&self.refresh_token)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
