// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Push-token registration with the merchant backend.
//!
//! `PUT {base}/merchants/{merchantId}/push-token` with
//! `{"pushToken": "...", "platform": "..."}`. Anything but 200 is a
//! registration failure: logged, never fatal. Transport errors are retried
//! a few times; HTTP rejections are not.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CatalogSyncConfig;
use crate::resilience::{retry_if, RetryConfig};

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Push registration is not configured (no backend URL)")]
    NotConfigured,
    #[error("Invalid backend URL '{0}'")]
    InvalidUrl(String),
    #[error("Push registration transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Push registration rejected with HTTP {status}")]
    Rejected { status: u16 },
}

impl PushError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushTokenRequest<'a> {
    push_token: &'a str,
    platform: &'a str,
}

/// Client for registering this device's push token.
#[derive(Debug, Clone)]
pub struct PushTokenRegistrar {
    client: reqwest::Client,
    base_url: Url,
    platform: String,
    retry: RetryConfig,
}

impl PushTokenRegistrar {
    pub fn new(base_url: &str, platform: impl Into<String>, timeout: Duration) -> Result<Self, PushError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|_| PushError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(PushError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            platform: platform.into(),
            retry: RetryConfig::registration(),
        })
    }

    pub fn from_config(config: &CatalogSyncConfig) -> Result<Self, PushError> {
        let base = config.push_base_url.as_deref().ok_or(PushError::NotConfigured)?;
        Self::new(base, config.push_platform.clone(), config.push_timeout())
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint for `merchant_id`, with the id percent-encoded as one segment.
    pub fn endpoint(&self, merchant_id: &str) -> Result<Url, PushError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PushError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["merchants", merchant_id, "push-token"]);
        Ok(url)
    }

    /// Register `push_token` for `merchant_id`.
    #[tracing::instrument(skip(self, push_token), fields(platform = %self.platform))]
    pub async fn register(&self, merchant_id: &str, push_token: &str) -> Result<(), PushError> {
        let url = self.endpoint(merchant_id)?;
        let body = PushTokenRequest {
            push_token,
            platform: &self.platform,
        };

        let result = retry_if(
            "push_token_registration",
            &self.retry,
            || async {
                let response = self.client.put(url.clone()).json(&body).send().await?;
                match response.status() {
                    StatusCode::OK => Ok(()),
                    status => Err(PushError::Rejected {
                        status: status.as_u16(),
                    }),
                }
            },
            PushError::is_retryable,
        )
        .await;

        match &result {
            Ok(()) => {
                info!("Push token registered");
                crate::metrics::record_push_registration("success");
            }
            Err(e) => {
                warn!(error = %e, "Push token registration failed");
                crate::metrics::record_push_registration("error");
            }
        }
        result
    }

    /// Fire-and-forget variant: failures are logged and swallowed.
    pub async fn register_best_effort(&self, merchant_id: &str, push_token: &str) -> bool {
        self.register(merchant_id, push_token).await.is_ok()
    }
}
