#![forbid(unsafe_code)]

//! Async client for the prok professional-networking API.
//!
//! [`RequestClient`] applies the retry, timeout and session-expiry policy to
//! every call; [`ProkApi`] exposes the typed endpoints; [`CollectionLoader`]
//! drives paged, filtered listings on top of any [`PageSource`].

pub mod api;
pub mod config;
pub mod loader;
pub mod request;
pub mod session;
pub mod transport;

pub use api::{Listing, PostDraft, ProkApi, Upload};
pub use config::{ClientConfig, ConfigError};
pub use loader::{CollectionLoader, LoaderHandle, PageSource};
pub use request::RequestClient;
pub use session::{
    CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore, Session,
    SessionStatus, StoredCredential,
};
pub use transport::{
    ApiRequest, FormPart, HttpTransport, Method, RawResponse, RequestBody, Transport,
    TransportError,
};

use prok_core::ApiError;
use thiserror::Error;

/// Errors of operations that touch local state as well as the API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Api(ApiError::SessionExpired))
    }
}
