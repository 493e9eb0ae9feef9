/*!
 * Compound Service Client
 * Synonym and interaction lookups behind a refreshable bearer token
 */

use super::http::{build_client, error_for_status, join_url};
use super::token::{BearerToken, TokenCache};
use super::traits::CompoundLookup;
use super::types::*;
use crate::config::CompoundServiceConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

/// HTTP client for the compound vocabulary service
pub struct CompoundClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    tokens: TokenCache,
}

impl CompoundClient {
    pub fn new(config: &CompoundServiceConfig) -> LookupResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            tokens: TokenCache::new(config.token_expiry_threshold),
        })
    }

    /// Use the refresh token while it lasts, fall back to a full login
    async fn obtain(&self, stale: Option<BearerToken>) -> LookupResult<BearerToken> {
        let refresh = stale
            .as_ref()
            .and_then(|t| t.refresh_token(self.tokens.threshold()));
        if let Some(refresh) = refresh {
            match self
                .grant("auth/refresh", json!({ "refresh_token": refresh }))
                .await
            {
                Ok(token) => return Ok(token),
                Err(e) => warn!(error = %e, "Token refresh failed, logging in again"),
            }
        }

        self.grant(
            "auth/login",
            json!({ "username": self.username, "password": self.password }),
        )
        .await
    }

    async fn grant(&self, path: &str, body: serde_json::Value) -> LookupResult<BearerToken> {
        let response = self
            .http
            .post(join_url(&self.base_url, path))
            .json(&body)
            .send()
            .await?;
        let grant: TokenGrant = error_for_status(response).await?.json().await?;
        debug!(path, expires_in = grant.expires_in, "Compound service token granted");
        Ok(BearerToken::from_grant(grant))
    }

    /// Authenticated GET; a 401 drops the cached token and retries once
    async fn get<T: DeserializeOwned>(&self, path: &str, names: &[String]) -> LookupResult<T> {
        let url = join_url(&self.base_url, path);
        let joined = names.join(",");
        let mut retried = false;

        loop {
            let token = self.tokens.bearer(|stale| self.obtain(stale)).await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("names", joined.as_str())])
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!(path, "Compound service rejected the token, retrying once");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }

            return Ok(error_for_status(response).await?.json().await?);
        }
    }
}

#[async_trait]
impl CompoundLookup for CompoundClient {
    async fn synonyms(&self, names: &[String]) -> LookupResult<Vec<SynonymMatch>> {
        self.get("synonyms", names).await
    }

    async fn interactions(&self, names: &[String]) -> LookupResult<Vec<Interaction>> {
        self.get("interactions", names).await
    }
}
