//! Authorized HTTP client for the profile service.
//!
//! Attaches the current bearer credential, and on a 401 forces one credential rotation and resends the
//! same request exactly once. Business status codes (404, 409, ...) are handed back untouched.

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{SessionError, SessionResult};
use crate::identity::{IdentityProviderAdapter, TransientIdentity};

/// A profile service response, fully read.
#[derive(Debug, Clone)]
pub struct ProfileResponse {
    status: StatusCode,
    body: String,
    attempts: u8,
}

impl ProfileResponse {
    pub fn status(&self) -> StatusCode { self.status }
    pub fn text(&self) -> &str { &self.body }
    /// 1, or 2 when the credential was rotated and the request resent.
    pub fn attempts(&self) -> u8 { self.attempts }

    pub fn json<T: DeserializeOwned>(&self) -> SessionResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub struct ProfileGateway {
    base: Url,
    client: reqwest::Client,
    identity: Arc<IdentityProviderAdapter>,
    profile_path: String,
    select_role_path: String,
}

impl ProfileGateway {
    pub fn new(config: &EngineConfig, identity: Arc<IdentityProviderAdapter>) -> SessionResult<Self> {
        config.validate()?;
        let mut base = config.base_url()?;
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SessionError::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base,
            client,
            identity,
            profile_path: config.profile_path.clone(),
            select_role_path: config.select_role_path.clone(),
        })
    }

    pub fn profile_path(&self) -> &str { &self.profile_path }
    pub fn select_role_path(&self) -> &str { &self.select_role_path }

    fn url_for(&self, path: &str) -> SessionResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SessionError::config(format!("invalid request path '{}': {}", path, e)))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: &Method,
        url: &Url,
        credential: Option<&str>,
        body: Option<&B>,
    ) -> SessionResult<(StatusCode, String)> {
        let mut req = self.client.request(method.clone(), url.clone());
        if let Some(tok) = credential {
            req = req.bearer_auth(tok);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        Ok((status, text))
    }

    /// Issue `method path`, authenticated as `identity` when present.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        identity: Option<&TransientIdentity>,
        body: Option<&B>,
    ) -> SessionResult<ProfileResponse> {
        let url = self.url_for(path)?;
        let Some(ident) = identity else {
            let (status, body) = self.send(&method, &url, None, body).await?;
            debug!(target: "classroom::gateway", %method, path, status = status.as_u16(), "unauthenticated request");
            return Ok(ProfileResponse { status, body, attempts: 1 });
        };

        let credential = self.identity.credential(ident, false).await?;
        let (status, text) = self.send(&method, &url, Some(&credential), body).await?;
        debug!(target: "classroom::gateway", %method, path, subject = %ident.subject_id, status = status.as_u16(), "request");
        if status != StatusCode::UNAUTHORIZED {
            return Ok(ProfileResponse { status, body: text, attempts: 1 });
        }

        debug!(target: "classroom::gateway", %method, path, subject = %ident.subject_id, "401, rotating credential and retrying once");
        let credential = self.identity.credential(ident, true).await?;
        let (status, text) = self.send(&method, &url, Some(&credential), body).await?;
        if status == StatusCode::UNAUTHORIZED {
            warn!(target: "classroom::gateway", %method, path, subject = %ident.subject_id, "credential rejected after rotation");
            return Err(SessionError::credential_invalid(format!(
                "{} {} rejected the refreshed credential",
                method, path
            )));
        }
        Ok(ProfileResponse { status, body: text, attempts: 2 })
    }

    pub async fn get(&self, path: &str, identity: Option<&TransientIdentity>) -> SessionResult<ProfileResponse> {
        self.request::<()>(Method::GET, path, identity, None).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        identity: Option<&TransientIdentity>,
        body: &B,
    ) -> SessionResult<ProfileResponse> {
        self.request(Method::POST, path, identity, Some(body)).await
    }
}
