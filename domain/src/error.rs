//! Error types for the `domain` layer.
use neato_auth::error::{
    CredentialErrorKind, Error as NeatoAuthError, ErrorKind as NeatoAuthErrorKind, HttpErrorKind,
    OAuthErrorKind, TokenErrorKind,
};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field is used to hold the original error that caused
/// the domain error. The intent is to translate errors between layers while maintaining
/// layer boundaries: `domain` depends on `neato-auth`, the host binary depends on `domain`,
/// and the host maps `error_kind`s onto its own pairing/setup result codes.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Errors caused by how the integration is set up or used by the host.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    /// Missing client credentials, empty refresh token.
    Configuration,
    /// Pairing requested for an already registered account without reconfigure.
    DuplicateSetup,
    /// The account id is not registered with the integration.
    UnknownAccount,
    /// The host's token store or device registry failed.
    Storage,
    Other(String),
}

/// Errors caused by the Neato cloud or the path to it.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    /// Credentials rejected, expired token, or tokens missing from a response.
    Authentication,
    /// The cloud could not be reached at all (DNS, refused connection).
    HostUnreachable,
    /// Any other transport failure or unexpected HTTP status.
    Network,
    /// Malformed or unexpected response payload.
    Protocol,
}

impl Error {
    pub fn new(error_kind: DomainErrorKind, message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.error_kind == DomainErrorKind::External(ExternalErrorKind::Authentication)
    }

    pub fn is_host_unreachable(&self) -> bool {
        self.error_kind == DomainErrorKind::External(ExternalErrorKind::HostUnreachable)
    }

    /// Short message suitable for showing to the end user during pairing/setup.
    pub fn user_message(&self) -> &'static str {
        match &self.error_kind {
            DomainErrorKind::External(ExternalErrorKind::Authentication) => {
                "Authentication failed. Please try again."
            }
            DomainErrorKind::External(ExternalErrorKind::HostUnreachable)
            | DomainErrorKind::External(ExternalErrorKind::Network) => {
                "The Neato cloud could not be reached. Please try again later."
            }
            DomainErrorKind::External(ExternalErrorKind::Protocol) => {
                "The Neato cloud sent an unexpected response."
            }
            DomainErrorKind::Internal(InternalErrorKind::Configuration) => {
                "The Neato integration is not configured correctly."
            }
            DomainErrorKind::Internal(InternalErrorKind::DuplicateSetup) => {
                "Trying to initialize an existing account."
            }
            DomainErrorKind::Internal(InternalErrorKind::UnknownAccount) => {
                "Cannot confirm a pairing session for an unknown account."
            }
            DomainErrorKind::Internal(_) => "An internal error occurred.",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Errors that result from issues building the reqwest::Client instance. This
        // type of error will occur prior to any network calls being made.
        let error_kind = if err.is_builder() {
            DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to build reqwest client".to_string(),
            ))
        } else if err.is_connect() {
            DomainErrorKind::External(ExternalErrorKind::HostUnreachable)
        } else if err.is_decode() {
            DomainErrorKind::External(ExternalErrorKind::Protocol)
        // Errors that result from issues with the network call itself.
        } else {
            DomainErrorKind::External(ExternalErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

// This is where we translate errors from the `neato-auth` layer to the `domain` layer.
impl From<NeatoAuthError> for Error {
    fn from(err: NeatoAuthError) -> Self {
        let error_kind = match &err.error_kind {
            NeatoAuthErrorKind::OAuth(OAuthErrorKind::TokenExchangeFailed { .. })
                if err.is_rejected_grant() =>
            {
                DomainErrorKind::External(ExternalErrorKind::Authentication)
            }
            NeatoAuthErrorKind::OAuth(OAuthErrorKind::TokenExchangeFailed { .. }) => {
                DomainErrorKind::External(ExternalErrorKind::Network)
            }
            NeatoAuthErrorKind::OAuth(OAuthErrorKind::MissingToken) => {
                DomainErrorKind::External(ExternalErrorKind::Authentication)
            }
            NeatoAuthErrorKind::OAuth(OAuthErrorKind::InvalidResponse) => {
                DomainErrorKind::External(ExternalErrorKind::Protocol)
            }
            NeatoAuthErrorKind::Http(HttpErrorKind::HostUnreachable) => {
                DomainErrorKind::External(ExternalErrorKind::HostUnreachable)
            }
            NeatoAuthErrorKind::Http(HttpErrorKind::BuilderFailed) => DomainErrorKind::Internal(
                InternalErrorKind::Other("Failed to build reqwest client".to_string()),
            ),
            NeatoAuthErrorKind::Http(_) => DomainErrorKind::External(ExternalErrorKind::Network),
            NeatoAuthErrorKind::Token(TokenErrorKind::Storage)
            | NeatoAuthErrorKind::Credential(CredentialErrorKind::StorageFailed) => {
                DomainErrorKind::Internal(InternalErrorKind::Storage)
            }
            NeatoAuthErrorKind::Token(_) | NeatoAuthErrorKind::Credential(_) => {
                DomainErrorKind::Internal(InternalErrorKind::Configuration)
            }
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
