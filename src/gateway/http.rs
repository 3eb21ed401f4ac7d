//! HTTP implementation of [`ReloadGateway`] against a Grafana-style admin API.
//!
//! Account creation and elevation authenticate as the configured admin
//! user; reload calls authenticate as the bootstrapped service account once
//! `set_credential` has been called.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::classify::ReloadCategory;
use crate::config::GatewayConfig;
use crate::identity::ServiceAccountCredential;

use super::{GatewayError, ReloadGateway, RemoteId};

#[derive(Deserialize)]
struct CreateAccountResponse {
    id: RemoteId,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    id: RemoteId,
}

#[derive(Deserialize)]
struct ReloadResponse {
    #[serde(default)]
    message: String,
}

pub struct HttpGateway {
    client: Client,
    base_url: String,
    admin_login: String,
    admin_password: String,
    /// Set after bootstrap; reload calls use it for basic auth.
    credential: Option<ServiceAccountCredential>,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(GatewayError::Init)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_login: config.admin_login.clone(),
            admin_password: config.admin_password.clone(),
            credential: None,
        })
    }

    /// Install the bootstrapped credential for subsequent reload calls.
    pub fn set_credential(&mut self, credential: ServiceAccountCredential) {
        self.credential = Some(credential);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn as_admin(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.admin_login, Some(&self.admin_password))
    }

    /// Reload calls prefer the service account; before bootstrap completes
    /// they fall back to the admin user.
    fn as_service_account(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(cred) => request.basic_auth(&cred.login, Some(&cred.password)),
            None => self.as_admin(request),
        }
    }

    async fn check(operation: &'static str, response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_else(|_| String::new());
        Err(GatewayError::Status {
            operation,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ReloadGateway for HttpGateway {
    async fn create_account(
        &self,
        candidate: &ServiceAccountCredential,
    ) -> Result<RemoteId, GatewayError> {
        const OP: &str = "create account";

        let body = json!({
            "name": candidate.id,
            "email": candidate.email,
            "login": candidate.login,
            "password": candidate.password,
        });

        let response = self
            .as_admin(self.client.post(self.url("api/admin/users")))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        // Grafana reports a duplicate login as 412 Precondition Failed.
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Err(GatewayError::AlreadyExists {
                login: candidate.login.clone(),
            });
        }

        let created: CreateAccountResponse = Self::check(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        tracing::debug!("[gateway] account created: {}", created.message);
        Ok(created.id)
    }

    async fn lookup_account(&self, login: &str) -> Result<RemoteId, GatewayError> {
        const OP: &str = "lookup account";

        let response = self
            .as_admin(self.client.get(self.url("api/users/lookup")))
            .query(&[("loginOrEmail", login)])
            .send()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        let user: LookupResponse = Self::check(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        Ok(user.id)
    }

    async fn set_password(&self, id: RemoteId, password: &str) -> Result<(), GatewayError> {
        const OP: &str = "set password";

        let path = format!("api/admin/users/{id}/password");
        let response = self
            .as_admin(self.client.put(self.url(&path)))
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        Self::check(OP, response).await?;
        Ok(())
    }

    async fn elevate(&self, id: RemoteId) -> Result<(), GatewayError> {
        const OP: &str = "elevate account";

        let path = format!("api/admin/permissions/{id}");
        let response = self
            .as_admin(self.client.put(self.url(&path)))
            .json(&json!({ "isGrafanaAdmin": true }))
            .send()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        Self::check(OP, response).await?;
        Ok(())
    }

    async fn reload_category(&self, category: ReloadCategory) -> Result<String, GatewayError> {
        const OP: &str = "reload";

        let response = self
            .as_service_account(self.client.post(self.url(category.endpoint_path())))
            .send()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        let reloaded: ReloadResponse = Self::check(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Http { operation: OP, source: e })?;

        Ok(reloaded.message)
    }
}
