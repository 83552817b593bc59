// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WAHA (WhatsApp HTTP API) gateway.
//!
//! Implements [`ChatGateway`] over WAHA's `sendText` and session-status
//! endpoints. Authentication is an `X-Api-Key` header applied to every
//! request.

use std::time::Duration;

use async_trait::async_trait;
use caramelo_core::CarameloError;
use caramelo_core::traits::ChatGateway;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    session: &'a str,
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionStatusResponse {
    status: String,
}

/// WAHA gateway client.
#[derive(Debug, Clone)]
pub struct WahaGateway {
    client: reqwest::Client,
    base_url: String,
    session: String,
}

impl WahaGateway {
    /// Creates a new WAHA client for the given instance and session.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        session: &str,
    ) -> Result<Self, CarameloError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                "X-Api-Key",
                HeaderValue::from_str(key).map_err(|e| {
                    CarameloError::Config(format!("invalid WAHA API key header value: {e}"))
                })?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CarameloError::Gateway {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: session.to_string(),
        })
    }
}

#[async_trait]
impl ChatGateway for WahaGateway {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), CarameloError> {
        let url = format!("{}/api/sendText", self.base_url);
        let body = SendTextRequest {
            session: &self.session,
            chat_id,
            text,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CarameloError::Gateway {
                message: format!("sendText request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarameloError::Gateway {
                message: format!("sendText returned {status}: {body}"),
                source: None,
            });
        }

        debug!(chat_id, "message sent through WAHA");
        Ok(())
    }

    async fn session_status(&self) -> Result<String, CarameloError> {
        let url = format!("{}/api/sessions/{}", self.base_url, self.session);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CarameloError::Gateway {
                message: format!("session status request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarameloError::Gateway {
                message: format!("session status returned {status}: {body}"),
                source: None,
            });
        }

        let parsed: SessionStatusResponse =
            response.json().await.map_err(|e| CarameloError::Gateway {
                message: format!("failed to parse session status response: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(parsed.status)
    }
}
