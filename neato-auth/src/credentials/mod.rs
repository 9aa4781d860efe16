//! OAuth client credential storage.

mod storage;

pub use storage::{
    require_credentials, ClientCredentials, CredentialStorage, MemoryCredentialStorage,
};
