//! Remote control-plane surface consumed by the sidecar.
//!
//! The core only needs four operations; they are behind a trait so
//! bootstrap and dispatch logic can be exercised against in-process fakes.

mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::ReloadCategory;
use crate::identity::ServiceAccountCredential;

pub use http::HttpGateway;

/// Identifier the remote assigns to a created account.
pub type RemoteId = u64;

/// Errors from remote control-plane operations.
///
/// All of these are fatal during bootstrap (except `AlreadyExists`, which
/// bootstrap resolves via [`ReloadGateway::lookup_account`]); during steady
/// state a reload failure is logged and swallowed.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to build http client: {0}")]
    Init(reqwest::Error),

    #[error("{operation} request failed: {source}")]
    Http {
        operation: &'static str,
        source: reqwest::Error,
    },

    #[error("{operation} returned {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("account '{login}' already exists at the remote")]
    AlreadyExists { login: String },
}

/// The remote operations the sidecar drives.
///
/// All three provisioning calls are treated as slow, fallible, and
/// non-retried at this layer; retry and timeout policy belong to the
/// implementation.
#[async_trait]
pub trait ReloadGateway: Send + Sync {
    /// Create the service account. `AlreadyExists` is reported as its own
    /// error variant so bootstrap can treat it as non-fatal.
    async fn create_account(
        &self,
        candidate: &ServiceAccountCredential,
    ) -> Result<RemoteId, GatewayError>;

    /// Resolve the remote id of an existing account by login.
    async fn lookup_account(&self, login: &str) -> Result<RemoteId, GatewayError>;

    /// Reset an existing account's password.
    ///
    /// Needed when the local credential file was lost but the remote
    /// account survived: the remote keeps its old password, which the new
    /// candidate cannot know.
    async fn set_password(&self, id: RemoteId, password: &str) -> Result<(), GatewayError>;

    /// Grant the account the privilege reload calls require.
    async fn elevate(&self, id: RemoteId) -> Result<(), GatewayError>;

    /// Ask the remote to reload one category's provisioning.
    async fn reload_category(&self, category: ReloadCategory) -> Result<String, GatewayError>;
}
