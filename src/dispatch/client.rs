/*!
 * Delivery Client
 * Multipart artifact upload behind a cached bearer token
 */

use super::traits::ArtifactSink;
use super::types::*;
use crate::config::{DeliveryConfig, DeliveryVariant};
use crate::lookup::http::{build_client, join_url};
use crate::lookup::{BearerToken, TokenCache};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// HTTP client for the downstream delivery endpoint
pub struct DeliveryClient {
    http: reqwest::Client,
    config: DeliveryConfig,
    tokens: TokenCache,
}

impl DeliveryClient {
    pub fn new(config: &DeliveryConfig) -> DeliveryResult<Self> {
        Ok(Self {
            http: build_client(config.timeout)?,
            config: config.clone(),
            tokens: TokenCache::new(config.token_expiry_threshold),
        })
    }

    pub fn file_name(&self, order_id: &str) -> String {
        format!("{}{}.pdf", self.config.filename_prefix, order_id)
    }

    async fn login(&self) -> DeliveryResult<BearerToken> {
        let body = match self.config.variant {
            DeliveryVariant::Jsend => json!({
                "email": self.config.username,
                "password": self.config.password,
            }),
            DeliveryVariant::Vendor => json!({
                "username": self.config.username,
                "password": self.config.password,
                "grant_type": "password",
            }),
        };
        let response = self
            .http
            .post(&self.config.login_url)
            .json(&body)
            .send()
            .await?;

        let (token, expires_in) = match self.config.variant {
            DeliveryVariant::Jsend => {
                let envelope: JsendEnvelope<JsendToken> = read_json(response).await?;
                match envelope.data {
                    Some(data) if envelope.status == "success" => (data.token, data.expires_in),
                    _ => {
                        return Err(DeliveryError::Unauthorized(
                            envelope.message.unwrap_or(envelope.status),
                        ))
                    }
                }
            }
            DeliveryVariant::Vendor => {
                let envelope: VendorEnvelope<VendorToken> = read_json(response).await?;
                let reason = envelope.error_text();
                match envelope.result {
                    Some(result) if envelope.success => (result.access_token, result.expires_in),
                    _ => return Err(DeliveryError::Unauthorized(reason)),
                }
            }
        };

        debug!(expires_in, "Delivery token granted");
        Ok(BearerToken::new(token, Duration::from_secs(expires_in)))
    }

    /// Whether the upload response confirms delivery
    async fn confirm(&self, response: Response) -> DeliveryResult<()> {
        match self.config.variant {
            DeliveryVariant::Jsend => {
                let envelope: JsendEnvelope<serde_json::Value> = read_json(response).await?;
                if envelope.status == "success" {
                    Ok(())
                } else {
                    Err(DeliveryError::Rejected(
                        envelope.message.unwrap_or(envelope.status),
                    ))
                }
            }
            DeliveryVariant::Vendor => {
                let envelope: VendorEnvelope<serde_json::Value> = read_json(response).await?;
                if envelope.success {
                    Ok(())
                } else {
                    Err(DeliveryError::Rejected(envelope.error_text()))
                }
            }
        }
    }
}

#[async_trait]
impl ArtifactSink for DeliveryClient {
    #[instrument(skip(self, artifact), fields(bytes = artifact.len()))]
    async fn upload(&self, order_id: &str, artifact: Vec<u8>) -> DeliveryResult<()> {
        let token = self.tokens.bearer(|_| self.login()).await?;

        let file = Part::bytes(artifact)
            .file_name(self.file_name(order_id))
            .mime_str("application/pdf")?;
        let form = Form::new()
            .text("order_id", order_id.to_string())
            .part("file", file);

        let response = self
            .http
            .post(join_url(&self.config.endpoint, order_id))
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Delivery endpoint rejected the token");
            self.tokens.invalidate().await;
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Unauthorized(body));
        }

        self.confirm(response).await?;
        info!("Artifact delivered");
        Ok(())
    }
}

/// Decode a JSON body, mapping non-2xx statuses first
async fn read_json<T: DeserializeOwned>(response: Response) -> DeliveryResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| DeliveryError::Decode(e.to_string()))
}
