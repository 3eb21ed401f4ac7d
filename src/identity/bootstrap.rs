//! Idempotent service-account bootstrap.
//!
//! Runs once at startup, before any watching begins. The cached file is the
//! fast path: when it exists no remote call is made at all, so restarts
//! never create duplicate credentials.

use rand::RngExt;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::IdentityConfig;
use crate::gateway::{GatewayError, ReloadGateway};

use super::{IdentityError, IdentityStore, ServiceAccountCredential};

const PASSWORD_LEN: usize = 24;

/// Fatal startup errors. The process must not start watching without a
/// valid, elevated identity, so every variant here ends the process.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("account provisioning failed: {0}")]
    Failed(String),
}

pub struct IdentityBootstrapper<'a> {
    store: &'a IdentityStore,
    gateway: &'a dyn ReloadGateway,
    config: &'a IdentityConfig,
}

impl<'a> IdentityBootstrapper<'a> {
    pub fn new(
        store: &'a IdentityStore,
        gateway: &'a dyn ReloadGateway,
        config: &'a IdentityConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Ensure exactly one service account exists remotely and locally.
    ///
    /// Sequence: cached-file fast path, then create, persist, elevate.
    /// Persisting before elevation is deliberate: elevation failure is fatal
    /// and the whole process restarts, at which point the fast path returns
    /// the cached credential.
    pub async fn ensure(&self) -> Result<ServiceAccountCredential, BootstrapError> {
        if let Some(credential) = self.store.load()? {
            crate::log_event!("identity", "using cached credential", "{}", credential.login);
            return Ok(credential);
        }

        let candidate = self.candidate();
        crate::log_event!("identity", "bootstrapping", "{}", candidate.login);

        let remote_id = match self.gateway.create_account(&candidate).await {
            Ok(id) => id,
            Err(GatewayError::AlreadyExists { login }) => {
                // A lost local file with a surviving remote account. The id
                // is deterministic, so look the account up and carry on.
                // The remote kept its old password, which the candidate
                // cannot know; reset it before persisting, or every later
                // reload call would fail to authenticate.
                crate::log_event!("identity", "account already exists, reusing", "{login}");
                let id = self
                    .gateway
                    .lookup_account(&login)
                    .await
                    .map_err(|e| BootstrapError::Failed(e.to_string()))?;
                self.gateway
                    .set_password(id, &candidate.password)
                    .await
                    .map_err(|e| BootstrapError::Failed(format!("password reset: {e}")))?;
                id
            }
            Err(e) => return Err(BootstrapError::Failed(e.to_string())),
        };

        self.store.save(&candidate)?;

        self.gateway
            .elevate(remote_id)
            .await
            .map_err(|e| BootstrapError::Failed(format!("elevation: {e}")))?;

        crate::log_event!("identity", "bootstrapped", "remote id {remote_id}");
        Ok(candidate)
    }

    /// Build the candidate credential from the host's stable identity.
    ///
    /// The login embeds a digest of the hostname, so re-running bootstrap on
    /// the same host always targets the same logical account even after the
    /// cached file is lost. Only the password is fresh per bootstrap.
    fn candidate(&self) -> ServiceAccountCredential {
        let host =
            sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());

        let digest = Sha256::digest(host.as_bytes());
        let tag: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();

        let id = format!("{}-{tag}", self.config.name);
        let password: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();

        ServiceAccountCredential {
            email: format!("{id}@{host}"),
            login: id.clone(),
            id,
            password,
        }
    }
}
