/*!
 * Virtual Individual Client
 * `findOne` against the document store's HTTP data API
 */

use super::http::{build_client, error_for_status, join_url};
use super::token::{BearerToken, TokenCache};
use super::traits::IndividualLookup;
use super::types::*;
use crate::config::IndividualStoreConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct FindOneResponse {
    #[serde(default)]
    document: Value,
}

/// HTTP client for the virtual-individual catalogue
pub struct IndividualClient {
    http: reqwest::Client,
    config: IndividualStoreConfig,
    tokens: TokenCache,
}

impl IndividualClient {
    pub fn new(config: &IndividualStoreConfig) -> LookupResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config: config.clone(),
            tokens: TokenCache::new(config.token_expiry_threshold),
        })
    }

    /// API-key login; the data API issues short-lived access tokens only
    async fn login(&self) -> LookupResult<BearerToken> {
        let response = self
            .http
            .post(&self.config.auth_url)
            .json(&json!({ "key": self.config.api_key }))
            .send()
            .await?;
        let grant: TokenGrant = error_for_status(response).await?.json().await?;
        debug!(expires_in = grant.expires_in, "Document store token granted");
        Ok(BearerToken::from_grant(grant))
    }
}

#[async_trait]
impl IndividualLookup for IndividualClient {
    async fn find(&self, query: &IndividualQuery) -> LookupResult<Option<Value>> {
        let body = json!({
            "dataSource": self.config.data_source,
            "database": self.config.database,
            "collection": self.config.collection,
            "filter": query,
        });
        let url = join_url(&self.config.base_url, "action/findOne");
        let mut retried = false;

        loop {
            let token = self.tokens.bearer(|_| self.login()).await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!("Document store rejected the token, retrying once");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }

            let found: FindOneResponse = error_for_status(response).await?.json().await?;
            return Ok(Some(found.document).filter(|doc| !is_empty_document(doc)));
        }
    }
}
